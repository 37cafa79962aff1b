pub mod base;
pub mod memory;
pub mod redis;

pub use crate::cache::base::KeyValueStore;
pub use crate::cache::memory::MemoryStore;
pub use crate::cache::redis::RedisStore;
