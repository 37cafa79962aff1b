use std::fmt;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::models::WinnerRow;
use crate::error::{Error, Result};

lazy_static! {
    static ref CHAT_HANDLE_REGEX: Regex = Regex::new(r"^@?([A-Za-z][A-Za-z0-9_]{4,31})$").unwrap();
}

// A chat the participant is required to be in: either a numeric chat
// identifier or the public @handle of a channel or group.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ChatRef {
    Id(i64),
    Handle(String),
}

impl ChatRef {
    pub fn parse(value: &str) -> Result<ChatRef> {
        let trimmed = value.trim();
        if let Ok(chat_id) = trimmed.parse::<i64>() {
            return Ok(ChatRef::Id(chat_id));
        }

        match CHAT_HANDLE_REGEX.captures(trimmed) {
            Some(captures) => Ok(ChatRef::Handle(captures[1].to_lowercase())),
            None => {
                let message = format!(
                    "The chat `{}` is neither a numeric identifier nor a public @handle.",
                    trimmed
                );
                Err(Error::Giveaway(message))
            }
        }
    }

    // Returns the canonical text form used for storage and cache keys.
    pub fn storage_key(&self) -> String {
        match self {
            ChatRef::Id(chat_id) => chat_id.to_string(),
            ChatRef::Handle(handle) => format!("@{}", handle),
        }
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

// What the engine knows about one user in one chat. Failures to ask the
// messenger collapse into Unknown rather than into an error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MembershipState {
    Member,
    NotMember,
    Unknown,
}

impl MembershipState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipState::Member => "member",
            MembershipState::NotMember => "not_member",
            MembershipState::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<MembershipState> {
        match value {
            "member" => Some(MembershipState::Member),
            "not_member" => Some(MembershipState::NotMember),
            "unknown" => Some(MembershipState::Unknown),
            _ => None,
        }
    }
}

// The raw member status reported by the messenger, before it collapses
// into a MembershipState. Restricted users are still inside the chat.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RawMemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl RawMemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RawMemberStatus::Creator => "creator",
            RawMemberStatus::Administrator => "administrator",
            RawMemberStatus::Member => "member",
            RawMemberStatus::Restricted => "restricted",
            RawMemberStatus::Left => "left",
            RawMemberStatus::Kicked => "kicked",
        }
    }

    pub fn membership_state(&self) -> MembershipState {
        match self {
            RawMemberStatus::Creator
            | RawMemberStatus::Administrator
            | RawMemberStatus::Member
            | RawMemberStatus::Restricted => MembershipState::Member,
            RawMemberStatus::Left | RawMemberStatus::Kicked => MembershipState::NotMember,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    pub chat: ChatRef,
    pub state: MembershipState,
}

// The outcome of one check run for one user, in the order the required
// chats were evaluated.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub giveaway_id: i64,
    pub user_id: i64,
    pub eligible: bool,
    pub unknown: bool,
    pub busy: bool,
    pub results: Vec<ChatResult>,
    pub first_blocker: Option<ChatRef>,
    pub checked_at: DateTime<Utc>,
}

impl Verdict {
    pub fn from_results(
        giveaway_id: i64,
        user_id: i64,
        results: Vec<ChatResult>,
        checked_at: DateTime<Utc>,
    ) -> Self {
        let blocker = results
            .iter()
            .find(|result| result.state != MembershipState::Member);
        // The verdict is retryable only when the first blocking chat could
        // not be resolved; a definite refusal ahead of an unresolved chat
        // makes the answer final.
        let eligible = blocker.is_none();
        let unknown = blocker.map(|result| result.state) == Some(MembershipState::Unknown);
        let first_blocker = blocker.map(|result| result.chat.clone());

        Verdict {
            giveaway_id,
            user_id,
            eligible,
            unknown,
            busy: false,
            results,
            first_blocker,
            checked_at,
        }
    }

    // A placeholder verdict for the user whose previous check is still
    // running. Marked unknown, since nothing was actually verified.
    // Never cached and never written to the ledger.
    pub fn busy(giveaway_id: i64, user_id: i64) -> Self {
        Verdict {
            giveaway_id,
            user_id,
            eligible: false,
            unknown: true,
            busy: true,
            results: Vec::new(),
            first_blocker: None,
            checked_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DrawReport {
    pub giveaway_id: i64,
    pub seed: u64,
    pub eligible_count: u32,
    pub winners: Vec<WinnerRow>,
    pub drawn_at: DateTime<Utc>,
}

// How an attempt to publish the results ended. Losing the race to another
// worker is an ordinary outcome here, not an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PublishOutcome {
    Published { message_id: i64 },
    AlreadyPublishing,
    AlreadyPublished { message_id: i64 },
}
