pub mod controller;
pub mod coordinator;
pub mod eligibility;
pub mod formatters;
pub mod ledger;
pub mod manager;
pub mod membership;
pub mod models;
pub mod strategies;

// Re-exports for the handlers and main.rs
pub use crate::giveaway::controller::{GiveawayController, ResultsAnnouncer};
pub use crate::giveaway::coordinator::CheckCoordinator;
pub use crate::giveaway::eligibility::EligibilityEvaluator;
pub use crate::giveaway::ledger::EntryLedger;
pub use crate::giveaway::manager::GiveawayManager;
pub use crate::giveaway::membership::{MembershipApi, MembershipOracle};
pub use crate::giveaway::models::{ChatRef, MembershipState, Verdict};
