pub mod base;
pub mod post;
pub mod verdict;

pub use crate::giveaway::formatters::base::VerdictFormatter;
pub use crate::giveaway::formatters::post::ChannelPostFormatter;
pub use crate::giveaway::formatters::verdict::DefaultVerdictFormatter;
