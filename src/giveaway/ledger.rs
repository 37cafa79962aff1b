use serde_json::json;

use crate::db::models::{AuditAction, AuditRow, EntryRow};
use crate::db::{AuditLog, EntryStore};
use crate::error::Result;
use crate::giveaway::models::Verdict;

// Durable counterpart of the coordinator's ephemeral cache: one entry row
// per (giveaway, user) plus an append-only trail of what happened to it.
pub struct EntryLedger {
    entries: EntryStore,
    audit: AuditLog,
}

impl EntryLedger {
    pub fn new(entries: EntryStore, audit: AuditLog) -> Self {
        EntryLedger { entries, audit }
    }

    // Adds the user to the giveaway. Only a first-time join leaves an audit
    // record; repeated presses of the join button change nothing.
    pub async fn join(
        &self,
        giveaway_id: i64,
        user_id: i64,
        username: Option<&str>,
    ) -> Result<bool> {
        let joined = self.entries.join(giveaway_id, user_id, username).await?;
        if joined {
            self.audit
                .append(
                    giveaway_id,
                    Some(user_id),
                    AuditAction::Joined,
                    json!({ "username": username }),
                )
                .await?;
        }
        Ok(joined)
    }

    // Persists a completed check: the entry flag is overwritten with the
    // latest verdict and the per-chat picture goes into the audit trail.
    pub async fn record_verdict(&self, verdict: &Verdict, username: Option<&str>) -> Result<()> {
        // Busy placeholders are not check results.
        if verdict.busy {
            return Ok(());
        }

        self.entries
            .record_check(
                verdict.giveaway_id,
                verdict.user_id,
                username,
                verdict.eligible,
                verdict.checked_at,
            )
            .await?;

        let results: Vec<_> = verdict
            .results
            .iter()
            .map(|result| {
                json!({
                    "chat": result.chat.storage_key(),
                    "state": result.state.as_str(),
                })
            })
            .collect();
        let payload = json!({
            "eligible": verdict.eligible,
            "unknown": verdict.unknown,
            "results": results,
            "first_blocker": verdict.first_blocker.as_ref().map(|chat| chat.storage_key()),
        });
        self.audit
            .append(
                verdict.giveaway_id,
                Some(verdict.user_id),
                AuditAction::Checked,
                payload,
            )
            .await
    }

    pub async fn status(&self, giveaway_id: i64, user_id: i64) -> Result<Option<EntryRow>> {
        self.entries.get(giveaway_id, user_id).await
    }

    pub async fn eligible_entries(&self, giveaway_id: i64) -> Result<Vec<EntryRow>> {
        self.entries.eligible_entries(giveaway_id).await
    }

    pub async fn entry_count(&self, giveaway_id: i64) -> Result<u32> {
        self.entries.count(giveaway_id).await
    }

    pub async fn eligible_count(&self, giveaway_id: i64) -> Result<u32> {
        self.entries.count_eligible(giveaway_id).await
    }

    pub async fn audit_feed(&self, giveaway_id: i64, limit: u32) -> Result<Vec<AuditRow>> {
        self.audit.feed(giveaway_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use crate::db::models::AuditAction;
    use crate::db::util::test_pool;
    use crate::db::{AuditLog, EntryStore};
    use crate::giveaway::ledger::EntryLedger;
    use crate::giveaway::models::{ChatRef, ChatResult, MembershipState, Verdict};

    async fn ledger() -> EntryLedger {
        let pool = test_pool().await;
        EntryLedger::new(EntryStore::new(pool.clone()), AuditLog::new(pool))
    }

    fn single_chat_verdict(state: MembershipState) -> Verdict {
        Verdict::from_results(
            1,
            100,
            vec![ChatResult {
                chat: ChatRef::Handle("sponsor".to_string()),
                state,
            }],
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_join_is_audited_once() {
        let ledger = ledger().await;

        assert_eq!(ledger.join(1, 100, Some("somebody")).await.unwrap(), true);
        assert_eq!(ledger.join(1, 100, Some("somebody")).await.unwrap(), false);

        let feed = ledger.audit_feed(1, 10).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].action, AuditAction::Joined);
        assert_eq!(feed[0].actor_id, Some(100));
        assert_eq!(feed[0].payload_json(), json!({"username": "somebody"}));
    }

    #[tokio::test]
    async fn test_record_verdict_updates_entry_and_audit() {
        let ledger = ledger().await;
        ledger.join(1, 100, Some("somebody")).await.unwrap();

        let verdict = Verdict::from_results(
            1,
            100,
            vec![
                ChatResult {
                    chat: ChatRef::Handle("sponsor".to_string()),
                    state: MembershipState::Member,
                },
                ChatResult {
                    chat: ChatRef::Id(-200),
                    state: MembershipState::NotMember,
                },
            ],
            Utc::now(),
        );
        ledger.record_verdict(&verdict, Some("somebody")).await.unwrap();

        let entry = ledger.status(1, 100).await.unwrap().unwrap();
        assert_eq!(entry.eligible, Some(false));
        assert_eq!(entry.last_checked_at.is_some(), true);

        let feed = ledger.audit_feed(1, 10).await.unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[1].action, AuditAction::Checked);
        let payload = feed[1].payload_json();
        assert_eq!(payload["eligible"], json!(false));
        assert_eq!(payload["first_blocker"], json!("-200"));
        assert_eq!(payload["results"][0]["state"], json!("member"));
    }

    #[tokio::test]
    async fn test_unknown_verdict_overwrites_a_previous_yes() {
        let ledger = ledger().await;

        ledger
            .record_verdict(&single_chat_verdict(MembershipState::Member), None)
            .await
            .unwrap();
        assert_eq!(
            ledger.status(1, 100).await.unwrap().unwrap().eligible,
            Some(true)
        );

        // The latest check could not resolve the chat, so the flag drops.
        ledger
            .record_verdict(&single_chat_verdict(MembershipState::Unknown), None)
            .await
            .unwrap();

        let entry = ledger.status(1, 100).await.unwrap().unwrap();
        assert_eq!(entry.eligible, Some(false));
    }

    #[tokio::test]
    async fn test_busy_placeholder_is_never_persisted() {
        let ledger = ledger().await;
        ledger.join(1, 100, None).await.unwrap();

        ledger
            .record_verdict(&Verdict::busy(1, 100), None)
            .await
            .unwrap();

        let entry = ledger.status(1, 100).await.unwrap().unwrap();
        assert_eq!(entry.eligible, None);
        assert_eq!(entry.last_checked_at, None);

        let feed = ledger.audit_feed(1, 10).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].action, AuditAction::Joined);
    }

    #[tokio::test]
    async fn test_counts_follow_the_ledger() {
        let ledger = ledger().await;
        ledger.join(1, 100, None).await.unwrap();
        ledger.join(1, 200, None).await.unwrap();

        ledger
            .record_verdict(&single_chat_verdict(MembershipState::Member), None)
            .await
            .unwrap();

        assert_eq!(ledger.entry_count(1).await.unwrap(), 2);
        assert_eq!(ledger.eligible_count(1).await.unwrap(), 1);
        assert_eq!(ledger.eligible_entries(1).await.unwrap().len(), 1);
    }
}
