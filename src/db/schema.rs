use sqlx::SqlitePool;

use crate::error::Result;

pub const CREATE_GIVEAWAYS: &str = "
CREATE TABLE IF NOT EXISTS giveaways (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    prize TEXT NOT NULL,
    winners_count INTEGER NOT NULL,
    status TEXT NOT NULL,
    published_chat_id INTEGER,
    published_message_id INTEGER,
    results_message_id INTEGER,
    draw_seed INTEGER,
    ends_at TEXT,
    drawn_at TEXT,
    created_at TEXT NOT NULL
)";

pub const CREATE_SPONSOR_CHATS: &str = "
CREATE TABLE IF NOT EXISTS sponsor_chats (
    giveaway_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    chat_ref TEXT NOT NULL,
    PRIMARY KEY (giveaway_id, position)
)";

pub const CREATE_ENTRIES: &str = "
CREATE TABLE IF NOT EXISTS entries (
    giveaway_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    username TEXT,
    eligible INTEGER,
    joined_at TEXT NOT NULL,
    last_checked_at TEXT,
    PRIMARY KEY (giveaway_id, user_id)
)";

pub const CREATE_WINNERS: &str = "
CREATE TABLE IF NOT EXISTS winners (
    giveaway_id INTEGER NOT NULL,
    rank INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    username TEXT,
    PRIMARY KEY (giveaway_id, rank),
    UNIQUE (giveaway_id, user_id)
)";

pub const CREATE_AUDIT_LOG: &str = "
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    giveaway_id INTEGER NOT NULL,
    actor_id INTEGER,
    action TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

pub const CREATE_ENTRIES_ELIGIBLE_INDEX: &str = "
CREATE INDEX IF NOT EXISTS idx_entries_eligible
ON entries (giveaway_id, eligible)";

pub const CREATE_AUDIT_LOG_INDEX: &str = "
CREATE INDEX IF NOT EXISTS idx_audit_log_giveaway
ON audit_log (giveaway_id, id)";

const STATEMENTS: [&str; 7] = [
    CREATE_GIVEAWAYS,
    CREATE_SPONSOR_CHATS,
    CREATE_ENTRIES,
    CREATE_WINNERS,
    CREATE_AUDIT_LOG,
    CREATE_ENTRIES_ELIGIBLE_INDEX,
    CREATE_AUDIT_LOG_INDEX,
];

// Creates any missing tables and indexes. Safe to call on every start.
pub async fn bootstrap(pool: &SqlitePool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
