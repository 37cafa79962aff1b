use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::json;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::db::models::{AuditAction, GiveawayRow, GiveawayStatus, WinnerRow};
use crate::db::{AuditLog, GiveawayStore};
use crate::error::{DrawError, Error, PublishError, Result};
use crate::giveaway::ledger::EntryLedger;
use crate::giveaway::models::{DrawReport, PublishOutcome};
use crate::giveaway::strategies::{DrawOptions, DrawStrategy};

// Posts the results message for a drawn giveaway and returns the id of
// the new message. The production implementation talks to the messenger;
// tests substitute counting and failing stubs.
#[async_trait]
pub trait ResultsAnnouncer: Send + Sync {
    async fn announce(&self, giveaway: &GiveawayRow, winners: &[WinnerRow]) -> Result<i64>;
}

// In-process fast-path deduplication for publishing. The durable
// reservation in the database remains the source of truth; this gate only
// spares it the traffic of an obvious double press.
struct PublishGate {
    inflight: DashMap<i64, Instant>,
    ttl: Duration,
}

impl PublishGate {
    fn new(ttl: Duration) -> Self {
        PublishGate {
            inflight: DashMap::new(),
            ttl,
        }
    }

    fn try_acquire(&self, giveaway_id: i64) -> bool {
        let now = Instant::now();
        match self.inflight.entry(giveaway_id) {
            Entry::Occupied(mut occupied) => {
                // A crashed publish must not wedge the giveaway forever.
                if now.duration_since(*occupied.get()) < self.ttl {
                    return false;
                }
                occupied.insert(now);
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
        }
    }

    fn release(&self, giveaway_id: i64) {
        self.inflight.remove(&giveaway_id);
    }
}

// Drives the giveaway status machine. Every transition is a conditional
// single-row update, so concurrent owners, retried callbacks and a second
// bot instance all collapse into exactly one winner per step.
pub struct GiveawayController {
    giveaways: GiveawayStore,
    ledger: Arc<EntryLedger>,
    audit: AuditLog,
    strategy: Box<dyn DrawStrategy>,
    announcer: Arc<dyn ResultsAnnouncer>,
    publish_gate: PublishGate,
}

impl GiveawayController {
    pub fn new(
        giveaways: GiveawayStore,
        ledger: Arc<EntryLedger>,
        audit: AuditLog,
        strategy: Box<dyn DrawStrategy>,
        announcer: Arc<dyn ResultsAnnouncer>,
        config: &EngineConfig,
    ) -> Self {
        GiveawayController {
            giveaways,
            ledger,
            audit,
            strategy,
            announcer,
            publish_gate: PublishGate::new(config.publish_lock_ttl),
        }
    }

    // Attaches the published post and turns the draft into a live giveaway.
    pub async fn activate(
        &self,
        giveaway_id: i64,
        chat_id: i64,
        message_id: i64,
        actor: i64,
    ) -> Result<bool> {
        let activated = self.giveaways.activate(giveaway_id, chat_id, message_id).await?;
        if activated {
            self.audit
                .append(
                    giveaway_id,
                    Some(actor),
                    AuditAction::Activated,
                    json!({ "chat_id": chat_id, "message_id": message_id }),
                )
                .await?;
            info!(giveaway_id, chat_id, "giveaway activated");
        }
        Ok(activated)
    }

    // Ends the giveaway by hand. Returns false when it was not active.
    pub async fn end(&self, giveaway_id: i64, actor: Option<i64>) -> Result<bool> {
        let ended = self
            .giveaways
            .transition(giveaway_id, GiveawayStatus::Active, GiveawayStatus::Ended)
            .await?;
        if ended {
            self.audit
                .append(giveaway_id, actor, AuditAction::Ended, json!({"reason": "manual"}))
                .await?;
            info!(giveaway_id, "giveaway ended");
        }
        Ok(ended)
    }

    // Ends every active giveaway whose deadline has passed. Returns the ids
    // that were moved, for the sweeper's log line.
    pub async fn end_overdue(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let mut ended = Vec::new();
        for giveaway in self.giveaways.list_active_with_deadline().await? {
            if !giveaway.is_overdue(now) {
                continue;
            }
            let moved = self
                .giveaways
                .transition(giveaway.id, GiveawayStatus::Active, GiveawayStatus::Ended)
                .await?;
            if moved {
                self.audit
                    .append(giveaway.id, None, AuditAction::Ended, json!({"reason": "deadline"}))
                    .await?;
                info!(giveaway_id = giveaway.id, "giveaway ended by deadline");
                ended.push(giveaway.id);
            }
        }
        Ok(ended)
    }

    // Cancels a giveaway that has not drawn winners yet.
    pub async fn cancel(&self, giveaway_id: i64, actor: i64) -> Result<bool> {
        for from in [
            GiveawayStatus::Draft,
            GiveawayStatus::Active,
            GiveawayStatus::Ended,
        ] {
            let cancelled = self
                .giveaways
                .transition(giveaway_id, from, GiveawayStatus::Cancelled)
                .await?;
            if cancelled {
                self.audit
                    .append(
                        giveaway_id,
                        Some(actor),
                        AuditAction::Cancelled,
                        json!({ "from": from.as_str() }),
                    )
                    .await?;
                info!(giveaway_id, from = from.as_str(), "giveaway cancelled");
                return Ok(true);
            }
        }
        Ok(false)
    }

    // Draws the winners for an ended giveaway. The status gate and the
    // winner rows are committed together, so a concurrent second draw
    // either loses the gate or never started.
    pub async fn draw(&self, giveaway_id: i64, actor: Option<i64>) -> Result<DrawReport> {
        let giveaway = self.giveaways.get(giveaway_id).await?;
        match giveaway.status {
            GiveawayStatus::Ended => {}
            GiveawayStatus::WinnersDrawn | GiveawayStatus::ResultsPublished => {
                return Err(Error::from(DrawError::AlreadyDrawn));
            }
            other => {
                return Err(Error::from(DrawError::InvalidStatus(other.as_str().to_string())));
            }
        }

        let eligible = self.ledger.eligible_entries(giveaway_id).await?;
        let drawn_at = Utc::now();
        let options = DrawOptions::new(&giveaway, &eligible, drawn_at);
        let selection = self.strategy.draw(&options)?;

        let committed = self
            .giveaways
            .commit_draw(giveaway_id, selection.seed, drawn_at, &selection.winners)
            .await?;
        if !committed {
            return Err(Error::from(DrawError::AlreadyDrawn));
        }

        let winners = self.giveaways.winners(giveaway_id).await?;
        self.audit
            .append(
                giveaway_id,
                actor,
                AuditAction::WinnersDrawn,
                json!({
                    "seed": selection.seed,
                    "eligible_count": eligible.len(),
                    "winners": winners.iter().map(|winner| winner.user_id).collect::<Vec<_>>(),
                }),
            )
            .await?;
        info!(giveaway_id, seed = selection.seed, winners = winners.len(), "winners drawn");

        Ok(DrawReport {
            giveaway_id,
            seed: selection.seed,
            eligible_count: eligible.len() as u32,
            winners,
            drawn_at,
        })
    }

    // Publishes the results. At most one publish ever succeeds per
    // giveaway, no matter how many buttons, retries or bot instances race.
    pub async fn publish(&self, giveaway_id: i64, actor: Option<i64>) -> Result<PublishOutcome> {
        if !self.publish_gate.try_acquire(giveaway_id) {
            return Ok(PublishOutcome::AlreadyPublishing);
        }
        let outcome = self.publish_locked(giveaway_id, actor).await;
        self.publish_gate.release(giveaway_id);
        outcome
    }

    async fn publish_locked(&self, giveaway_id: i64, actor: Option<i64>) -> Result<PublishOutcome> {
        let giveaway = self.giveaways.get(giveaway_id).await?;
        match giveaway.status {
            GiveawayStatus::WinnersDrawn => {}
            GiveawayStatus::ResultsPublished => {
                return Ok(PublishOutcome::AlreadyPublished {
                    message_id: giveaway.results_message_id.unwrap_or(0),
                });
            }
            other => {
                return Err(Error::from(PublishError::InvalidStatus(
                    other.as_str().to_string(),
                )));
            }
        }
        if giveaway.published_chat_id.is_none() {
            return Err(Error::from(PublishError::MissingChannel));
        }

        // The durable reservation is the real arbiter: it stays correct
        // even when another bot instance never saw our in-process gate.
        if !self.giveaways.reserve_publish(giveaway_id).await? {
            let current = self.giveaways.get(giveaway_id).await?;
            return Ok(match current.results_message_id {
                Some(0) | None => PublishOutcome::AlreadyPublishing,
                Some(message_id) => PublishOutcome::AlreadyPublished { message_id },
            });
        }

        match self.announce_and_finalize(&giveaway, actor).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // The sentinel must not outlive the failed attempt, or no
                // retry could ever reserve again.
                if let Err(release_err) = self.giveaways.release_publish(giveaway_id).await {
                    warn!(giveaway_id, error = %release_err, "publish reservation rollback failed");
                }
                if let Err(audit_err) = self
                    .audit
                    .append(
                        giveaway_id,
                        actor,
                        AuditAction::PublishRolledBack,
                        json!({ "error": err.to_string() }),
                    )
                    .await
                {
                    warn!(giveaway_id, error = %audit_err, "publish rollback audit failed");
                }
                Err(err)
            }
        }
    }

    async fn announce_and_finalize(
        &self,
        giveaway: &GiveawayRow,
        actor: Option<i64>,
    ) -> Result<PublishOutcome> {
        let winners = self.giveaways.winners(giveaway.id).await?;
        let message_id = self.announcer.announce(giveaway, &winners).await?;

        if !self.giveaways.finalize_publish(giveaway.id, message_id).await? {
            warn!(giveaway_id = giveaway.id, "publish finalize lost its reservation");
            return Ok(PublishOutcome::AlreadyPublishing);
        }

        // The publish itself is done; a failed audit write must not trigger
        // the rollback path above.
        if let Err(err) = self
            .audit
            .append(
                giveaway.id,
                actor,
                AuditAction::ResultsPublished,
                json!({ "message_id": message_id }),
            )
            .await
        {
            warn!(giveaway_id = giveaway.id, error = %err, "results publish audit failed");
        }
        info!(giveaway_id = giveaway.id, message_id, "results published");

        Ok(PublishOutcome::Published { message_id })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};

    use crate::config::EngineConfig;
    use crate::db::models::{AuditAction, GiveawayRow, GiveawayStatus, WinnerRow};
    use crate::db::util::test_pool;
    use crate::db::{AuditLog, EntryStore, GiveawayStore};
    use crate::error::{DrawError, Error, PublishError};
    use crate::giveaway::controller::{GiveawayController, ResultsAnnouncer};
    use crate::giveaway::ledger::EntryLedger;
    use crate::giveaway::models::PublishOutcome;
    use crate::giveaway::strategies::SeededDrawStrategy;

    const RESULTS_MESSAGE_ID: i64 = 777;

    struct StubAnnouncer {
        calls: AtomicUsize,
        failing: Mutex<bool>,
        delay: Duration,
    }

    impl StubAnnouncer {
        fn new() -> Arc<Self> {
            Arc::new(StubAnnouncer {
                calls: AtomicUsize::new(0),
                failing: Mutex::new(false),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(StubAnnouncer {
                calls: AtomicUsize::new(0),
                failing: Mutex::new(false),
                delay,
            })
        }

        fn set_failing(&self, failing: bool) {
            *self.failing.lock().unwrap() = failing;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResultsAnnouncer for StubAnnouncer {
        async fn announce(&self, _giveaway: &GiveawayRow, _winners: &[WinnerRow]) -> crate::error::Result<i64> {
            if *self.failing.lock().unwrap() {
                return Err(Error::Telegram("scripted send failure".to_string()));
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RESULTS_MESSAGE_ID)
        }
    }

    struct Fixture {
        controller: GiveawayController,
        giveaways: GiveawayStore,
        entries: EntryStore,
        audit: AuditLog,
        announcer: Arc<StubAnnouncer>,
    }

    async fn fixture_with(announcer: Arc<StubAnnouncer>) -> Fixture {
        let pool = test_pool().await;
        let giveaways = GiveawayStore::new(pool.clone());
        let entries = EntryStore::new(pool.clone());
        let audit = AuditLog::new(pool.clone());
        let ledger = Arc::new(EntryLedger::new(entries.clone(), AuditLog::new(pool)));
        let controller = GiveawayController::new(
            giveaways.clone(),
            ledger,
            audit.clone(),
            Box::new(SeededDrawStrategy::new()),
            announcer.clone(),
            &EngineConfig::default(),
        );
        Fixture {
            controller,
            giveaways,
            entries,
            audit,
            announcer,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(StubAnnouncer::new()).await
    }

    // Creates an ended giveaway with checked entries, ready for drawing.
    async fn ended_giveaway(fixture: &Fixture, eligible: &[i64], winners_count: u32) -> i64 {
        let giveaway = fixture.giveaways.create(1, "prize", winners_count).await.unwrap();
        fixture.giveaways.activate(giveaway.id, -100500, 1).await.unwrap();
        fixture.controller.end(giveaway.id, Some(1)).await.unwrap();
        for user_id in eligible {
            fixture
                .entries
                .record_check(
                    giveaway.id,
                    *user_id,
                    Some(&format!("user_{}", user_id)),
                    true,
                    Utc::now(),
                )
                .await
                .unwrap();
        }
        giveaway.id
    }

    async fn actions(fixture: &Fixture, giveaway_id: i64) -> Vec<AuditAction> {
        fixture
            .audit
            .feed(giveaway_id, 50)
            .await
            .unwrap()
            .iter()
            .map(|row| row.action)
            .collect()
    }

    #[tokio::test]
    async fn test_end_is_conditional() {
        let fixture = fixture().await;
        let giveaway = fixture.giveaways.create(1, "prize", 1).await.unwrap();
        fixture.giveaways.activate(giveaway.id, -1, 1).await.unwrap();

        assert_eq!(fixture.controller.end(giveaway.id, Some(1)).await.unwrap(), true);
        assert_eq!(fixture.controller.end(giveaway.id, Some(1)).await.unwrap(), false);

        let feed = fixture.audit.feed(giveaway.id, 10).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].action, AuditAction::Ended);
    }

    #[tokio::test]
    async fn test_end_overdue_moves_only_overdue_giveaways() {
        let fixture = fixture().await;

        let overdue = fixture.giveaways.create(1, "prize", 1).await.unwrap();
        fixture.giveaways.activate(overdue.id, -1, 1).await.unwrap();
        fixture
            .giveaways
            .set_deadline(overdue.id, Some(Utc::now() - ChronoDuration::minutes(1)))
            .await
            .unwrap();

        let pending = fixture.giveaways.create(1, "prize", 1).await.unwrap();
        fixture.giveaways.activate(pending.id, -1, 2).await.unwrap();
        fixture
            .giveaways
            .set_deadline(pending.id, Some(Utc::now() + ChronoDuration::hours(1)))
            .await
            .unwrap();

        let ended = fixture.controller.end_overdue(Utc::now()).await.unwrap();

        assert_eq!(ended, vec![overdue.id]);
        assert_eq!(
            fixture.giveaways.get(overdue.id).await.unwrap().status,
            GiveawayStatus::Ended
        );
        assert_eq!(
            fixture.giveaways.get(pending.id).await.unwrap().status,
            GiveawayStatus::Active
        );
    }

    #[tokio::test]
    async fn test_draw_requires_an_ended_giveaway() {
        let fixture = fixture().await;
        let giveaway = fixture.giveaways.create(1, "prize", 1).await.unwrap();
        fixture.giveaways.activate(giveaway.id, -1, 1).await.unwrap();

        let result = fixture.controller.draw(giveaway.id, Some(1)).await;

        assert_eq!(
            result.unwrap_err(),
            Error::from(DrawError::InvalidStatus("active".to_string()))
        );
    }

    #[tokio::test]
    async fn test_draw_commits_ranked_winners() {
        let fixture = fixture().await;
        let giveaway_id = ended_giveaway(&fixture, &[10, 20, 30], 2).await;
        // One entry was checked and failed; it must stay out of the pool.
        fixture
            .entries
            .record_check(giveaway_id, 40, None, false, Utc::now())
            .await
            .unwrap();

        let report = fixture.controller.draw(giveaway_id, Some(1)).await.unwrap();

        assert_eq!(report.eligible_count, 3);
        assert_eq!(report.winners.len(), 2);
        assert_eq!(report.winners[0].rank, 1);
        assert_eq!(report.winners[1].rank, 2);
        for winner in &report.winners {
            assert_eq!([10, 20, 30].contains(&winner.user_id), true);
        }

        let stored = fixture.giveaways.get(giveaway_id).await.unwrap();
        assert_eq!(stored.status, GiveawayStatus::WinnersDrawn);
        assert_eq!(stored.seed(), Some(report.seed));
        assert_eq!(
            fixture.giveaways.winners(giveaway_id).await.unwrap(),
            report.winners
        );
        assert_eq!(
            actions(&fixture, giveaway_id).await.contains(&AuditAction::WinnersDrawn),
            true
        );
    }

    #[tokio::test]
    async fn test_second_draw_is_refused() {
        let fixture = fixture().await;
        let giveaway_id = ended_giveaway(&fixture, &[10, 20], 1).await;

        fixture.controller.draw(giveaway_id, Some(1)).await.unwrap();
        let second = fixture.controller.draw(giveaway_id, Some(1)).await;

        assert_eq!(second.unwrap_err(), Error::from(DrawError::AlreadyDrawn));
    }

    #[tokio::test]
    async fn test_partial_draw_is_refused_and_changes_nothing() {
        let fixture = fixture().await;
        let giveaway_id = ended_giveaway(&fixture, &[10], 3).await;

        let result = fixture.controller.draw(giveaway_id, Some(1)).await;

        assert_eq!(
            result.unwrap_err(),
            Error::from(DrawError::NotEnoughEligible {
                eligible: 1,
                required: 3,
            })
        );
        assert_eq!(
            fixture.giveaways.get(giveaway_id).await.unwrap().status,
            GiveawayStatus::Ended
        );
        assert_eq!(fixture.giveaways.winners(giveaway_id).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_publish_posts_once_and_finalizes() {
        let fixture = fixture().await;
        let giveaway_id = ended_giveaway(&fixture, &[10, 20], 1).await;
        fixture.controller.draw(giveaway_id, Some(1)).await.unwrap();

        let outcome = fixture.controller.publish(giveaway_id, Some(1)).await.unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Published {
                message_id: RESULTS_MESSAGE_ID,
            }
        );

        let stored = fixture.giveaways.get(giveaway_id).await.unwrap();
        assert_eq!(stored.status, GiveawayStatus::ResultsPublished);
        assert_eq!(stored.results_message_id, Some(RESULTS_MESSAGE_ID));

        // A retried callback after success is told about the existing post.
        let again = fixture.controller.publish(giveaway_id, Some(1)).await.unwrap();
        assert_eq!(
            again,
            PublishOutcome::AlreadyPublished {
                message_id: RESULTS_MESSAGE_ID,
            }
        );
        assert_eq!(fixture.announcer.calls(), 1);
    }

    #[tokio::test]
    async fn test_publish_requires_drawn_winners() {
        let fixture = fixture().await;
        let giveaway_id = ended_giveaway(&fixture, &[10], 1).await;

        let result = fixture.controller.publish(giveaway_id, Some(1)).await;

        assert_eq!(
            result.unwrap_err(),
            Error::from(PublishError::InvalidStatus("ended".to_string()))
        );
    }

    #[tokio::test]
    async fn test_failed_publish_rolls_back_and_can_retry() {
        let fixture = fixture().await;
        let giveaway_id = ended_giveaway(&fixture, &[10, 20], 1).await;
        fixture.controller.draw(giveaway_id, Some(1)).await.unwrap();

        fixture.announcer.set_failing(true);
        let failed = fixture.controller.publish(giveaway_id, Some(1)).await;
        assert_eq!(failed.is_err(), true);

        // The reservation was rolled back, nothing was finalized.
        let stored = fixture.giveaways.get(giveaway_id).await.unwrap();
        assert_eq!(stored.status, GiveawayStatus::WinnersDrawn);
        assert_eq!(stored.results_message_id, None);
        assert_eq!(
            actions(&fixture, giveaway_id).await.contains(&AuditAction::PublishRolledBack),
            true
        );

        // Once the messenger recovers, a retry goes through.
        fixture.announcer.set_failing(false);
        let outcome = fixture.controller.publish(giveaway_id, Some(1)).await.unwrap();
        assert_eq!(
            outcome,
            PublishOutcome::Published {
                message_id: RESULTS_MESSAGE_ID,
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_publishes_send_one_message() {
        let fixture = fixture_with(StubAnnouncer::slow(Duration::from_millis(50))).await;
        let giveaway_id = ended_giveaway(&fixture, &[10, 20], 1).await;
        fixture.controller.draw(giveaway_id, Some(1)).await.unwrap();

        let (first, second) = tokio::join!(
            fixture.controller.publish(giveaway_id, Some(1)),
            fixture.controller.publish(giveaway_id, Some(2)),
        );
        let outcomes = vec![first.unwrap(), second.unwrap()];

        assert_eq!(
            outcomes.contains(&PublishOutcome::Published {
                message_id: RESULTS_MESSAGE_ID,
            }),
            true
        );
        assert_eq!(outcomes.contains(&PublishOutcome::AlreadyPublishing), true);
        assert_eq!(fixture.announcer.calls(), 1);
    }

    #[tokio::test]
    async fn test_durable_reservation_stops_a_second_instance() {
        let fixture = fixture().await;
        let giveaway_id = ended_giveaway(&fixture, &[10, 20], 1).await;
        fixture.controller.draw(giveaway_id, Some(1)).await.unwrap();

        // Another bot instance holds the reservation; our in-process gate
        // knows nothing about it.
        assert_eq!(fixture.giveaways.reserve_publish(giveaway_id).await.unwrap(), true);

        let outcome = fixture.controller.publish(giveaway_id, Some(1)).await.unwrap();

        assert_eq!(outcome, PublishOutcome::AlreadyPublishing);
        assert_eq!(fixture.announcer.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_is_terminal() {
        let fixture = fixture().await;
        let giveaway = fixture.giveaways.create(1, "prize", 1).await.unwrap();

        assert_eq!(fixture.controller.cancel(giveaway.id, 1).await.unwrap(), true);
        assert_eq!(fixture.controller.cancel(giveaway.id, 1).await.unwrap(), false);

        let result = fixture.controller.draw(giveaway.id, Some(1)).await;
        assert_eq!(
            result.unwrap_err(),
            Error::from(DrawError::InvalidStatus("cancelled".to_string()))
        );
    }

    #[tokio::test]
    async fn test_cancel_does_not_touch_drawn_giveaways() {
        let fixture = fixture().await;
        let giveaway_id = ended_giveaway(&fixture, &[10, 20], 1).await;
        fixture.controller.draw(giveaway_id, Some(1)).await.unwrap();

        assert_eq!(fixture.controller.cancel(giveaway_id, 1).await.unwrap(), false);
        assert_eq!(
            fixture.giveaways.get(giveaway_id).await.unwrap().status,
            GiveawayStatus::WinnersDrawn
        );
    }
}
