pub mod audit;
pub mod entries;
pub mod giveaways;
pub mod models;
pub mod schema;
pub mod util;

pub use crate::db::audit::AuditLog;
pub use crate::db::entries::EntryStore;
pub use crate::db::giveaways::GiveawayStore;
pub use crate::db::util::establish_pool;
