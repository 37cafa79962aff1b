use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
pub enum GiveawayStatus {
    Draft,
    Active,
    Ended,
    WinnersDrawn,
    ResultsPublished,
    Cancelled,
}

impl GiveawayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GiveawayStatus::Draft => "draft",
            GiveawayStatus::Active => "active",
            GiveawayStatus::Ended => "ended",
            GiveawayStatus::WinnersDrawn => "winners_drawn",
            GiveawayStatus::ResultsPublished => "results_published",
            GiveawayStatus::Cancelled => "cancelled",
        }
    }

    // Checks that no further transition can leave this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GiveawayStatus::ResultsPublished | GiveawayStatus::Cancelled
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
pub enum AuditAction {
    Joined,
    Checked,
    Activated,
    Ended,
    WinnersDrawn,
    ResultsPublished,
    PublishRolledBack,
    Cancelled,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Joined => "joined",
            AuditAction::Checked => "checked",
            AuditAction::Activated => "activated",
            AuditAction::Ended => "ended",
            AuditAction::WinnersDrawn => "winners_drawn",
            AuditAction::ResultsPublished => "results_published",
            AuditAction::PublishRolledBack => "publish_rolled_back",
            AuditAction::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct GiveawayRow {
    pub id: i64,
    pub owner_id: i64,
    pub prize: String,
    pub winners_count: u32,
    pub status: GiveawayStatus,
    pub published_chat_id: Option<i64>,
    pub published_message_id: Option<i64>,
    // NULL until a publish starts, 0 while one is in flight.
    pub results_message_id: Option<i64>,
    pub draw_seed: Option<i64>,
    pub ends_at: Option<DateTime<Utc>>,
    pub drawn_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl GiveawayRow {
    // Returns the seed the winners were drawn with, if a draw happened.
    pub fn seed(&self) -> Option<u64> {
        self.draw_seed.map(|value| value as u64)
    }

    // Checks that the deadline has passed relative to the given instant.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.ends_at {
            Some(ends_at) => ends_at <= now,
            None => false,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct EntryRow {
    pub giveaway_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    // NULL until the first completed check.
    pub eligible: Option<bool>,
    pub joined_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Eq, PartialEq, sqlx::FromRow)]
pub struct WinnerRow {
    pub giveaway_id: i64,
    pub rank: u32,
    pub user_id: i64,
    pub username: Option<String>,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct AuditRow {
    pub id: i64,
    pub giveaway_id: i64,
    pub actor_id: Option<i64>,
    pub action: AuditAction,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

impl AuditRow {
    // Returns the recorded payload as JSON, or Null if the row predates a format change.
    pub fn payload_json(&self) -> Value {
        serde_json::from_str(&self.payload).unwrap_or(Value::Null)
    }
}
