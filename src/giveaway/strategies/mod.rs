pub mod base;
pub mod seeded;

pub use crate::giveaway::strategies::base::{DrawOptions, DrawSelection, DrawStrategy};
pub use crate::giveaway::strategies::seeded::SeededDrawStrategy;
