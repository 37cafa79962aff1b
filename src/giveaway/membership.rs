use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::cache::KeyValueStore;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::giveaway::models::{ChatRef, MembershipState, RawMemberStatus};

// The one question the engine ever asks the messenger: what is this
// user's status in that chat. Implemented over the Bot API in production
// and by scripted stubs in tests.
#[async_trait]
pub trait MembershipApi: Send + Sync {
    async fn member_status(&self, chat: &ChatRef, user_id: i64) -> Result<RawMemberStatus>;
}

// Answers membership questions through a cache with asymmetric lifetimes:
// confirmed memberships are kept for a long time, refusals and failures
// only briefly. A user who subscribes right after a failed check should
// pass the next one, while confirmed subscribers cost no extra API calls.
pub struct MembershipOracle {
    api: Arc<dyn MembershipApi>,
    store: Arc<dyn KeyValueStore>,
    ok_ttl: Duration,
    miss_ttl: Duration,
}

impl MembershipOracle {
    pub fn new(api: Arc<dyn MembershipApi>, store: Arc<dyn KeyValueStore>, config: &EngineConfig) -> Self {
        MembershipOracle {
            api,
            store,
            ok_ttl: config.member_ok_ttl,
            miss_ttl: config.member_miss_ttl,
        }
    }

    // Resolves the user's state in the chat. This never fails: an API error
    // or an unreachable cache degrades the answer to Unknown instead of
    // aborting the whole check run.
    pub async fn resolve(&self, chat: &ChatRef, user_id: i64) -> MembershipState {
        let key = cache_key(chat, user_id);

        match self.store.get(&key).await {
            Ok(Some(value)) => {
                if let Some(state) = MembershipState::parse(&value) {
                    return state;
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(chat = %chat, user_id, error = %err, "membership cache read failed");
            }
        }

        let state = match self.api.member_status(chat, user_id).await {
            Ok(status) => status.membership_state(),
            Err(err) => {
                warn!(chat = %chat, user_id, error = %err, "membership lookup failed");
                MembershipState::Unknown
            }
        };

        let ttl = match state {
            MembershipState::Member => self.ok_ttl,
            MembershipState::NotMember | MembershipState::Unknown => self.miss_ttl,
        };
        if let Err(err) = self.store.set(&key, state.as_str(), ttl).await {
            warn!(chat = %chat, user_id, error = %err, "membership cache write failed");
        }

        state
    }
}

fn cache_key(chat: &ChatRef, user_id: i64) -> String {
    format!("member:{}:{}", chat.storage_key(), user_id)
}
