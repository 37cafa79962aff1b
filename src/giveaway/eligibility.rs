use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures::future;

use crate::config::EngineConfig;
use crate::giveaway::membership::MembershipOracle;
use crate::giveaway::models::{ChatRef, ChatResult, MembershipState, Verdict};

// Turns the required chat list into a verdict. Short lists are resolved
// concurrently; long ones fall back to a sequential scan that stops at
// the first blocking chat, so a giveaway with many sponsors does not
// burn API calls on a user who already failed the second chat.
pub struct EligibilityEvaluator {
    oracle: MembershipOracle,
    parallel_limit: usize,
}

impl EligibilityEvaluator {
    pub fn new(oracle: MembershipOracle, config: &EngineConfig) -> Self {
        EligibilityEvaluator {
            oracle,
            parallel_limit: config.parallel_check_limit,
        }
    }

    pub async fn evaluate(
        &self,
        giveaway_id: i64,
        user_id: i64,
        required: &[ChatRef],
        checked_at: DateTime<Utc>,
    ) -> Verdict {
        let chats = dedup_chats(required);
        let results = if chats.len() <= self.parallel_limit {
            self.resolve_all(&chats, user_id).await
        } else {
            self.resolve_until_blocked(&chats, user_id).await
        };
        Verdict::from_results(giveaway_id, user_id, results, checked_at)
    }

    async fn resolve_all(&self, chats: &[ChatRef], user_id: i64) -> Vec<ChatResult> {
        let lookups = chats.iter().map(|chat| self.oracle.resolve(chat, user_id));
        let states = future::join_all(lookups).await;
        chats
            .iter()
            .cloned()
            .zip(states)
            .map(|(chat, state)| ChatResult { chat, state })
            .collect()
    }

    // The sequential path. The scan stops at the first chat that did not
    // answer with a membership, unresolved chats included: whatever comes
    // later cannot change the first blocker, so the remaining oracle
    // calls are skipped.
    async fn resolve_until_blocked(&self, chats: &[ChatRef], user_id: i64) -> Vec<ChatResult> {
        let mut results = Vec::with_capacity(chats.len());
        for chat in chats {
            let state = self.oracle.resolve(chat, user_id).await;
            let blocked = state != MembershipState::Member;
            results.push(ChatResult {
                chat: chat.clone(),
                state,
            });
            if blocked {
                break;
            }
        }
        results
    }
}

// Keeps the first occurrence of every chat, in the submitted order.
fn dedup_chats(required: &[ChatRef]) -> Vec<ChatRef> {
    let mut seen = HashSet::new();
    required
        .iter()
        .filter(|chat| seen.insert((*chat).clone()))
        .cloned()
        .collect()
}
