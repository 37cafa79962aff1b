use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::db::GiveawayStore;
use crate::db::models::{AuditRow, EntryRow, GiveawayRow, GiveawayStatus, WinnerRow};
use crate::error::{Error, Result};
use crate::giveaway::controller::GiveawayController;
use crate::giveaway::coordinator::CheckCoordinator;
use crate::giveaway::ledger::EntryLedger;
use crate::giveaway::models::{ChatRef, DrawReport, PublishOutcome, Verdict};

// The facade the bot handlers talk to. Owner actions are gated on the
// giveaway's owner id; participant actions are gated on the giveaway
// being live. Everything below it is the engine's business.
#[non_exhaustive]
pub struct GiveawayManager {
    giveaways: GiveawayStore,
    ledger: Arc<EntryLedger>,
    coordinator: CheckCoordinator,
    controller: GiveawayController,
}

impl GiveawayManager {
    pub fn new(
        giveaways: GiveawayStore,
        ledger: Arc<EntryLedger>,
        coordinator: CheckCoordinator,
        controller: GiveawayController,
    ) -> Self {
        GiveawayManager {
            giveaways,
            ledger,
            coordinator,
            controller,
        }
    }

    pub async fn create_giveaway(
        &self,
        owner_id: i64,
        prize: &str,
        winners_count: u32,
    ) -> Result<GiveawayRow> {
        let prize = prize.trim();
        if prize.is_empty() {
            let message = format!("The prize description can not be empty.");
            return Err(Error::Giveaway(message));
        }
        if winners_count < 1 {
            let message = format!("The number of winners must be at least one.");
            return Err(Error::Giveaway(message));
        }
        self.giveaways.create(owner_id, prize, winners_count).await
    }

    pub async fn get_giveaways(&self, owner_id: i64) -> Result<Vec<GiveawayRow>> {
        self.giveaways.list_owned(owner_id).await
    }

    // Returns the giveaway when the user owns it, the teacher gate for
    // every mutating owner action below.
    pub async fn giveaway_for_owner(&self, user_id: i64, giveaway_id: i64) -> Result<GiveawayRow> {
        let giveaway = self.giveaways.get(giveaway_id).await?;
        self.check_giveaway_owner(user_id, &giveaway)?;
        Ok(giveaway)
    }

    pub async fn set_sponsors(
        &self,
        user_id: i64,
        giveaway_id: i64,
        raw_chats: &[&str],
    ) -> Result<Vec<ChatRef>> {
        let giveaway = self.giveaway_for_owner(user_id, giveaway_id).await?;
        if giveaway.status != GiveawayStatus::Draft {
            let message = format!("Sponsor chats can only be changed while the giveaway is a draft.");
            return Err(Error::Giveaway(message));
        }

        let mut chats = Vec::with_capacity(raw_chats.len());
        for raw in raw_chats {
            chats.push(ChatRef::parse(raw)?);
        }
        let stored: Vec<String> = chats.iter().map(|chat| chat.storage_key()).collect();
        self.giveaways.set_sponsor_chats(giveaway_id, &stored).await?;
        Ok(chats)
    }

    pub async fn sponsor_chats(&self, giveaway_id: i64) -> Result<Vec<ChatRef>> {
        let stored = self.giveaways.sponsor_chats(giveaway_id).await?;
        Ok(parse_stored_chats(giveaway_id, &stored))
    }

    pub async fn set_deadline(
        &self,
        user_id: i64,
        giveaway_id: i64,
        ends_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let giveaway = self.giveaway_for_owner(user_id, giveaway_id).await?;
        match giveaway.status {
            GiveawayStatus::Draft | GiveawayStatus::Active => {}
            _ => {
                let message = format!("The deadline can only be changed before the giveaway ends.");
                return Err(Error::Giveaway(message));
            }
        }
        self.giveaways.set_deadline(giveaway_id, ends_at).await
    }

    // Records where the announcement landed and marks the giveaway live.
    pub async fn activate_giveaway(
        &self,
        user_id: i64,
        giveaway_id: i64,
        chat_id: i64,
        message_id: i64,
    ) -> Result<bool> {
        self.giveaway_for_owner(user_id, giveaway_id).await?;
        self.controller
            .activate(giveaway_id, chat_id, message_id, user_id)
            .await
    }

    pub async fn end_giveaway(&self, user_id: i64, giveaway_id: i64) -> Result<bool> {
        self.giveaway_for_owner(user_id, giveaway_id).await?;
        self.controller.end(giveaway_id, Some(user_id)).await
    }

    // The sweeper half of ending: no owner involved.
    pub async fn end_overdue_giveaways(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        self.controller.end_overdue(now).await
    }

    pub async fn cancel_giveaway(&self, user_id: i64, giveaway_id: i64) -> Result<bool> {
        self.giveaway_for_owner(user_id, giveaway_id).await?;
        self.controller.cancel(giveaway_id, user_id).await
    }

    // Physically removes a giveaway that never ran or was cancelled,
    // together with its entries and audit trail.
    pub async fn delete_giveaway(&self, user_id: i64, giveaway_id: i64) -> Result<()> {
        let giveaway = self.giveaways.get(giveaway_id).await?;
        if user_id != giveaway.owner_id {
            let message = format!("For deleting this giveaway you need to be its owner.");
            return Err(Error::Giveaway(message));
        }
        match giveaway.status {
            GiveawayStatus::Draft | GiveawayStatus::Cancelled => {}
            _ => {
                let message = format!("Only drafts and cancelled giveaways can be deleted.");
                return Err(Error::Giveaway(message));
            }
        }
        self.giveaways.delete_cascade(giveaway_id).await
    }

    pub async fn draw_winners(&self, user_id: i64, giveaway_id: i64) -> Result<DrawReport> {
        self.giveaway_for_owner(user_id, giveaway_id).await?;
        self.controller.draw(giveaway_id, Some(user_id)).await
    }

    pub async fn publish_results(
        &self,
        user_id: i64,
        giveaway_id: i64,
    ) -> Result<PublishOutcome> {
        self.giveaway_for_owner(user_id, giveaway_id).await?;
        self.controller.publish(giveaway_id, Some(user_id)).await
    }

    pub async fn winners(&self, giveaway_id: i64) -> Result<Vec<WinnerRow>> {
        self.giveaways.winners(giveaway_id).await
    }

    pub async fn entry_counts(&self, giveaway_id: i64) -> Result<(u32, u32)> {
        let total = self.ledger.entry_count(giveaway_id).await?;
        let eligible = self.ledger.eligible_count(giveaway_id).await?;
        Ok((total, eligible))
    }

    // Participant side: enter a live giveaway. Repeat joins are no-ops.
    pub async fn join_giveaway(
        &self,
        giveaway_id: i64,
        user_id: i64,
        username: Option<&str>,
    ) -> Result<bool> {
        self.live_giveaway(giveaway_id).await?;
        self.ledger.join(giveaway_id, user_id, username).await
    }

    // Participant side: run (or reuse) an eligibility check.
    pub async fn check_eligibility(
        &self,
        giveaway_id: i64,
        user_id: i64,
        username: Option<&str>,
    ) -> Result<Verdict> {
        let giveaway = self.live_giveaway(giveaway_id).await?;
        let required = self.required_chats(&giveaway).await?;
        self.coordinator
            .check(giveaway_id, user_id, &required, username)
            .await
    }

    // Curator diagnostic: the owner asks why a user is not eligible. Runs
    // through the same coordinator, so the answer is the current truth and
    // lands in the ledger like any other check.
    pub async fn diagnose_user(
        &self,
        owner_id: i64,
        giveaway_id: i64,
        target_user_id: i64,
    ) -> Result<Verdict> {
        let giveaway = self.giveaway_for_owner(owner_id, giveaway_id).await?;
        let required = self.required_chats(&giveaway).await?;
        self.coordinator
            .check(giveaway_id, target_user_id, &required, None)
            .await
    }

    pub async fn entry_status(&self, giveaway_id: i64, user_id: i64) -> Result<Option<EntryRow>> {
        self.ledger.status(giveaway_id, user_id).await
    }

    pub async fn audit_feed(
        &self,
        user_id: i64,
        giveaway_id: i64,
        limit: u32,
    ) -> Result<Vec<AuditRow>> {
        self.giveaway_for_owner(user_id, giveaway_id).await?;
        self.ledger.audit_feed(giveaway_id, limit).await
    }

    // The chats a participant has to be in: the channel the giveaway runs
    // in first, then the sponsors in their configured order.
    async fn required_chats(&self, giveaway: &GiveawayRow) -> Result<Vec<ChatRef>> {
        let mut chats = Vec::new();
        if let Some(chat_id) = giveaway.published_chat_id {
            chats.push(ChatRef::Id(chat_id));
        }
        let stored = self.giveaways.sponsor_chats(giveaway.id).await?;
        chats.extend(parse_stored_chats(giveaway.id, &stored));
        Ok(chats)
    }

    async fn live_giveaway(&self, giveaway_id: i64) -> Result<GiveawayRow> {
        let giveaway = self.giveaways.get(giveaway_id).await?;
        if giveaway.status != GiveawayStatus::Active {
            let message = format!("This giveaway is not accepting entries.");
            return Err(Error::Giveaway(message));
        }
        Ok(giveaway)
    }

    fn check_giveaway_owner(&self, user_id: i64, giveaway: &GiveawayRow) -> Result<()> {
        if user_id != giveaway.owner_id {
            let message = format!("For managing this giveaway you need to be its owner.");
            return Err(Error::Giveaway(message));
        }
        Ok(())
    }
}

// Stored sponsor values were validated on the way in; a row that no longer
// parses is corrupt and is skipped rather than taking the check down.
fn parse_stored_chats(giveaway_id: i64, stored: &[String]) -> Vec<ChatRef> {
    let mut chats = Vec::with_capacity(stored.len());
    for raw in stored {
        match ChatRef::parse(raw) {
            Ok(chat) => chats.push(chat),
            Err(err) => {
                warn!(giveaway_id, raw, error = %err, "skipping unparsable sponsor chat");
            }
        }
    }
    chats
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::cache::MemoryStore;
    use crate::config::EngineConfig;
    use crate::db::models::{GiveawayRow, GiveawayStatus, WinnerRow};
    use crate::db::util::test_pool;
    use crate::db::{AuditLog, EntryStore, GiveawayStore};
    use crate::error::{Error, Result};
    use crate::giveaway::controller::{GiveawayController, ResultsAnnouncer};
    use crate::giveaway::coordinator::CheckCoordinator;
    use crate::giveaway::eligibility::EligibilityEvaluator;
    use crate::giveaway::ledger::EntryLedger;
    use crate::giveaway::manager::GiveawayManager;
    use crate::giveaway::membership::{MembershipApi, MembershipOracle};
    use crate::giveaway::models::{ChatRef, MembershipState, PublishOutcome, RawMemberStatus};
    use crate::giveaway::strategies::SeededDrawStrategy;

    const OWNER: i64 = 1;
    const STRANGER: i64 = 2;
    const CHANNEL: i64 = -100500;

    // A scripted membership world the tests can mutate mid-flight.
    struct WorldApi {
        statuses: Mutex<HashMap<String, RawMemberStatus>>,
        failing: Mutex<Vec<String>>,
    }

    impl WorldApi {
        fn new() -> Arc<Self> {
            Arc::new(WorldApi {
                statuses: Mutex::new(HashMap::new()),
                failing: Mutex::new(Vec::new()),
            })
        }

        fn set_status(&self, chat: &str, status: RawMemberStatus) {
            self.statuses
                .lock()
                .unwrap()
                .insert(chat.to_string(), status);
        }

        fn set_failing(&self, chats: &[&str]) {
            *self.failing.lock().unwrap() =
                chats.iter().map(|chat| chat.to_string()).collect();
        }
    }

    #[async_trait]
    impl MembershipApi for WorldApi {
        async fn member_status(&self, chat: &ChatRef, _user_id: i64) -> Result<RawMemberStatus> {
            let key = chat.storage_key();
            if self.failing.lock().unwrap().contains(&key) {
                return Err(Error::Telegram("no access to the chat".to_string()));
            }
            Ok(*self
                .statuses
                .lock()
                .unwrap()
                .get(&key)
                .unwrap_or(&RawMemberStatus::Member))
        }
    }

    struct SilentAnnouncer;

    #[async_trait]
    impl ResultsAnnouncer for SilentAnnouncer {
        async fn announce(&self, _giveaway: &GiveawayRow, _winners: &[WinnerRow]) -> Result<i64> {
            Ok(4242)
        }
    }

    async fn manager_with(api: Arc<WorldApi>) -> GiveawayManager {
        // Short miss lifetimes so tests can watch a verdict change.
        let config = EngineConfig {
            member_miss_ttl: Duration::from_millis(30),
            verdict_miss_ttl: Duration::from_millis(30),
            ..EngineConfig::default()
        };
        let pool = test_pool().await;
        let giveaways = GiveawayStore::new(pool.clone());
        let ledger = Arc::new(EntryLedger::new(
            EntryStore::new(pool.clone()),
            AuditLog::new(pool.clone()),
        ));
        let store = Arc::new(MemoryStore::new());
        let oracle = MembershipOracle::new(api, store.clone(), &config);
        let evaluator = EligibilityEvaluator::new(oracle, &config);
        let coordinator = CheckCoordinator::new(evaluator, ledger.clone(), store, &config);
        let controller = GiveawayController::new(
            giveaways.clone(),
            ledger.clone(),
            AuditLog::new(pool),
            Box::new(SeededDrawStrategy::new()),
            Arc::new(SilentAnnouncer),
            &config,
        );
        GiveawayManager::new(giveaways, ledger, coordinator, controller)
    }

    async fn manager() -> GiveawayManager {
        manager_with(WorldApi::new()).await
    }

    // Creates a live giveaway owned by OWNER with the given sponsors.
    async fn live_giveaway(manager: &GiveawayManager, sponsors: &[&str]) -> i64 {
        let giveaway = manager.create_giveaway(OWNER, "prize", 1).await.unwrap();
        if !sponsors.is_empty() {
            manager.set_sponsors(OWNER, giveaway.id, sponsors).await.unwrap();
        }
        manager
            .activate_giveaway(OWNER, giveaway.id, CHANNEL, 1)
            .await
            .unwrap();
        giveaway.id
    }

    #[tokio::test]
    async fn test_create_giveaway_validates_input() {
        let manager = manager().await;

        let empty = manager.create_giveaway(OWNER, "   ", 1).await;
        assert_eq!(
            empty.unwrap_err(),
            Error::Giveaway("The prize description can not be empty.".to_string())
        );

        let zero = manager.create_giveaway(OWNER, "prize", 0).await;
        assert_eq!(
            zero.unwrap_err(),
            Error::Giveaway("The number of winners must be at least one.".to_string())
        );
    }

    #[tokio::test]
    async fn test_owner_actions_are_gated() {
        let manager = manager().await;
        let giveaway = manager.create_giveaway(OWNER, "prize", 1).await.unwrap();

        let result = manager.end_giveaway(STRANGER, giveaway.id).await;
        assert_eq!(
            result.unwrap_err(),
            Error::Giveaway("For managing this giveaway you need to be its owner.".to_string())
        );

        let result = manager.delete_giveaway(STRANGER, giveaway.id).await;
        assert_eq!(
            result.unwrap_err(),
            Error::Giveaway("For deleting this giveaway you need to be its owner.".to_string())
        );
    }

    #[tokio::test]
    async fn test_sponsors_are_canonicalized_and_frozen_after_draft() {
        let manager = manager().await;
        let giveaway = manager.create_giveaway(OWNER, "prize", 1).await.unwrap();

        manager
            .set_sponsors(OWNER, giveaway.id, &["@BigSponsor", "-100600"])
            .await
            .unwrap();
        let chats = manager.sponsor_chats(giveaway.id).await.unwrap();
        assert_eq!(
            chats,
            vec![
                ChatRef::Handle("bigsponsor".to_string()),
                ChatRef::Id(-100600),
            ]
        );

        manager
            .activate_giveaway(OWNER, giveaway.id, CHANNEL, 1)
            .await
            .unwrap();
        let result = manager.set_sponsors(OWNER, giveaway.id, &["@late"]).await;
        assert_eq!(
            result.unwrap_err(),
            Error::Giveaway(
                "Sponsor chats can only be changed while the giveaway is a draft.".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_join_requires_a_live_giveaway() {
        let manager = manager().await;
        let giveaway = manager.create_giveaway(OWNER, "prize", 1).await.unwrap();

        let result = manager.join_giveaway(giveaway.id, 100, None).await;
        assert_eq!(
            result.unwrap_err(),
            Error::Giveaway("This giveaway is not accepting entries.".to_string())
        );

        manager
            .activate_giveaway(OWNER, giveaway.id, CHANNEL, 1)
            .await
            .unwrap();
        assert_eq!(manager.join_giveaway(giveaway.id, 100, None).await.unwrap(), true);
        assert_eq!(manager.join_giveaway(giveaway.id, 100, None).await.unwrap(), false);
    }

    #[tokio::test]
    async fn test_check_covers_channel_and_sponsors() {
        let api = WorldApi::new();
        let manager = manager_with(api.clone()).await;
        let giveaway_id = live_giveaway(&manager, &["@sponsor"]).await;
        manager.join_giveaway(giveaway_id, 100, Some("somebody")).await.unwrap();

        api.set_status("@sponsor", RawMemberStatus::Left);
        let verdict = manager
            .check_eligibility(giveaway_id, 100, Some("somebody"))
            .await
            .unwrap();

        assert_eq!(verdict.eligible, false);
        assert_eq!(
            verdict.first_blocker,
            Some(ChatRef::Handle("sponsor".to_string()))
        );
        // The channel itself was part of the checked list.
        assert_eq!(verdict.results[0].chat, ChatRef::Id(CHANNEL));
        assert_eq!(verdict.results[0].state, MembershipState::Member);

        let entry = manager.entry_status(giveaway_id, 100).await.unwrap().unwrap();
        assert_eq!(entry.eligible, Some(false));
    }

    #[tokio::test]
    async fn test_blocked_then_fixed_scenario() {
        let api = WorldApi::new();
        let manager = manager_with(api.clone()).await;
        let giveaway_id = live_giveaway(&manager, &["@alpha", "@bravo"]).await;
        manager.join_giveaway(giveaway_id, 100, None).await.unwrap();

        // The bot has no access to the second sponsor chat yet.
        api.set_failing(&["@bravo"]);
        let verdict = manager.check_eligibility(giveaway_id, 100, None).await.unwrap();
        assert_eq!(verdict.eligible, false);
        assert_eq!(verdict.unknown, true);
        assert_eq!(verdict.first_blocker, Some(ChatRef::Handle("bravo".to_string())));

        // Access restored; the short miss lifetimes run out and the next
        // check comes back clean.
        api.set_failing(&[]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let verdict = manager.check_eligibility(giveaway_id, 100, None).await.unwrap();
        assert_eq!(verdict.eligible, true);
        assert_eq!(verdict.unknown, false);
        assert_eq!(verdict.first_blocker, None);
    }

    #[tokio::test]
    async fn test_full_lifecycle_draw_and_publish() {
        let manager = manager().await;
        let giveaway_id = live_giveaway(&manager, &[]).await;

        for user_id in [100, 200, 300] {
            manager.join_giveaway(giveaway_id, user_id, None).await.unwrap();
            manager.check_eligibility(giveaway_id, user_id, None).await.unwrap();
        }
        manager.end_giveaway(OWNER, giveaway_id).await.unwrap();

        let report = manager.draw_winners(OWNER, giveaway_id).await.unwrap();
        assert_eq!(report.eligible_count, 3);
        assert_eq!(report.winners.len(), 1);

        let outcome = manager.publish_results(OWNER, giveaway_id).await.unwrap();
        assert_eq!(outcome, PublishOutcome::Published { message_id: 4242 });

        let feed = manager.audit_feed(OWNER, giveaway_id, 50).await.unwrap();
        assert_eq!(feed.len() >= 5, true);
    }

    #[tokio::test]
    async fn test_diagnose_requires_ownership_and_records_the_check() {
        let api = WorldApi::new();
        let manager = manager_with(api.clone()).await;
        let giveaway_id = live_giveaway(&manager, &["@sponsor"]).await;
        manager.join_giveaway(giveaway_id, 100, None).await.unwrap();

        let result = manager.diagnose_user(STRANGER, giveaway_id, 100).await;
        assert_eq!(result.is_err(), true);

        api.set_status("@sponsor", RawMemberStatus::Kicked);
        let verdict = manager.diagnose_user(OWNER, giveaway_id, 100).await.unwrap();
        assert_eq!(verdict.eligible, false);

        let entry = manager.entry_status(giveaway_id, 100).await.unwrap().unwrap();
        assert_eq!(entry.eligible, Some(false));
    }

    #[tokio::test]
    async fn test_delete_is_limited_to_inert_giveaways() {
        let manager = manager().await;
        let giveaway_id = live_giveaway(&manager, &[]).await;

        let result = manager.delete_giveaway(OWNER, giveaway_id).await;
        assert_eq!(
            result.unwrap_err(),
            Error::Giveaway("Only drafts and cancelled giveaways can be deleted.".to_string())
        );

        manager.cancel_giveaway(OWNER, giveaway_id).await.unwrap();
        manager.delete_giveaway(OWNER, giveaway_id).await.unwrap();
        assert_eq!(manager.get_giveaways(OWNER).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_status_helpers() {
        let manager = manager().await;
        let giveaway_id = live_giveaway(&manager, &[]).await;
        manager.join_giveaway(giveaway_id, 100, None).await.unwrap();
        manager.join_giveaway(giveaway_id, 200, None).await.unwrap();
        manager.check_eligibility(giveaway_id, 100, None).await.unwrap();

        let (total, eligible) = manager.entry_counts(giveaway_id).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(eligible, 1);

        let giveaway = manager.giveaway_for_owner(OWNER, giveaway_id).await.unwrap();
        assert_eq!(giveaway.status, GiveawayStatus::Active);
    }
}
