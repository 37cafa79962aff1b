pub mod callbacks;
pub mod context;
pub mod handlers;
pub mod parser;

// Re-exports for the later usage in main.rs
pub use crate::commands::context::{
    BotContext, SharedContext, TelegramAnnouncer, TelegramMembershipApi,
};
pub use crate::commands::handlers::{schema, Command};
