use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::KeyValueStore;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::giveaway::eligibility::EligibilityEvaluator;
use crate::giveaway::ledger::EntryLedger;
use crate::giveaway::models::{ChatRef, Verdict};

// Serializes checks per (giveaway, user). A participant rapid-tapping the
// check button gets exactly one evaluator run per lock window; everybody
// who arrives while it runs is served the last cached verdict or a busy
// placeholder, never a second storm of API calls.
pub struct CheckCoordinator {
    evaluator: EligibilityEvaluator,
    ledger: Arc<EntryLedger>,
    store: Arc<dyn KeyValueStore>,
    lock_ttl: Duration,
    verdict_ok_ttl: Duration,
    verdict_miss_ttl: Duration,
}

impl CheckCoordinator {
    pub fn new(
        evaluator: EligibilityEvaluator,
        ledger: Arc<EntryLedger>,
        store: Arc<dyn KeyValueStore>,
        config: &EngineConfig,
    ) -> Self {
        CheckCoordinator {
            evaluator,
            ledger,
            store,
            lock_ttl: config.check_lock_ttl,
            verdict_ok_ttl: config.verdict_ok_ttl,
            verdict_miss_ttl: config.verdict_miss_ttl,
        }
    }

    // Runs one eligibility check for the user, or reports on the one that
    // is already running. Completed verdicts are written to the ledger
    // before anybody can observe them from the cache.
    pub async fn check(
        &self,
        giveaway_id: i64,
        user_id: i64,
        required: &[ChatRef],
        username: Option<&str>,
    ) -> Result<Verdict> {
        let lock_key = lock_key(giveaway_id, user_id);
        let correlation = Uuid::new_v4().to_string();

        let acquired = self
            .store
            .set_if_absent(&lock_key, &correlation, self.lock_ttl)
            .await?;
        if !acquired {
            if let Some(cached) = self.cached_verdict(giveaway_id, user_id).await {
                debug!(giveaway_id, user_id, "check in flight; serving cached verdict");
                return Ok(cached);
            }
            debug!(giveaway_id, user_id, "check in flight; serving busy placeholder");
            return Ok(Verdict::busy(giveaway_id, user_id));
        }

        debug!(giveaway_id, user_id, correlation = %correlation, "check started");
        let outcome = self
            .run_locked(giveaway_id, user_id, required, username)
            .await;

        // The lock goes away on every exit path, failed persists included.
        if let Err(err) = self.store.delete(&lock_key).await {
            warn!(giveaway_id, user_id, error = %err, "check lock release failed");
        }

        outcome
    }

    async fn run_locked(
        &self,
        giveaway_id: i64,
        user_id: i64,
        required: &[ChatRef],
        username: Option<&str>,
    ) -> Result<Verdict> {
        // Covers the double tap that slipped in right after a finished
        // check released the lock.
        if let Some(cached) = self.cached_verdict(giveaway_id, user_id).await {
            return Ok(cached);
        }

        let verdict = self
            .evaluator
            .evaluate(giveaway_id, user_id, required, Utc::now())
            .await;
        self.ledger.record_verdict(&verdict, username).await?;
        self.cache_verdict(&verdict).await;
        Ok(verdict)
    }

    async fn cached_verdict(&self, giveaway_id: i64, user_id: i64) -> Option<Verdict> {
        match self.store.get(&verdict_key(giveaway_id, user_id)).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(giveaway_id, user_id, error = %err, "verdict cache read failed");
                None
            }
        }
    }

    // Mirrors the oracle's asymmetry: a positive verdict may be served from
    // cache for a while, a negative one goes stale quickly so a user who
    // just subscribed is not stuck looking ineligible.
    async fn cache_verdict(&self, verdict: &Verdict) {
        let ttl = match verdict.eligible {
            true => self.verdict_ok_ttl,
            false => self.verdict_miss_ttl,
        };
        let key = verdict_key(verdict.giveaway_id, verdict.user_id);
        match serde_json::to_string(verdict) {
            Ok(raw) => {
                if let Err(err) = self.store.set(&key, &raw, ttl).await {
                    warn!(error = %err, "verdict cache write failed");
                }
            }
            Err(err) => warn!(error = %err, "verdict serialization failed"),
        }
    }
}

fn lock_key(giveaway_id: i64, user_id: i64) -> String {
    format!("check_lock:{}:{}", giveaway_id, user_id)
}

fn verdict_key(giveaway_id: i64, user_id: i64) -> String {
    format!("verdict:{}:{}", giveaway_id, user_id)
}
