use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

// The key-value capability the engine is built against. Keys are
// namespaced strings assembled by the callers; values are small
// serialized blobs. Implementations must expire entries on their own
// once the TTL passes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    // Returns the value stored under the key, unless it has expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    // Stores the value under the key for the given lifetime.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    // Stores the value only when the key is currently absent, as one
    // atomic step. Returns true when the write happened. This is the
    // primitive behind the per-(giveaway, user) check lock.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    // Removes the key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}
