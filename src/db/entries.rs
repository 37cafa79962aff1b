use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::EntryRow;
use crate::error::Result;

// Keeps one row per (giveaway, user) pair. Joining is an insert that loses
// quietly against an existing row, checking is an upsert that overwrites the
// previous verdict fields.
#[derive(Clone, Debug)]
pub struct EntryStore {
    pool: SqlitePool,
}

impl EntryStore {
    pub fn new(pool: SqlitePool) -> Self {
        EntryStore { pool }
    }

    // Adds the user to the giveaway. Returns false when the entry already
    // existed, which makes repeated joins harmless.
    pub async fn join(
        &self,
        giveaway_id: i64,
        user_id: i64,
        username: Option<&str>,
    ) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT INTO entries (giveaway_id, user_id, username, joined_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (giveaway_id, user_id) DO NOTHING",
        )
        .bind(giveaway_id)
        .bind(user_id)
        .bind(username)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted == 1)
    }

    // Stores the outcome of a completed check, creating the entry on the fly
    // for users who pressed the check button without joining first.
    pub async fn record_check(
        &self,
        giveaway_id: i64,
        user_id: i64,
        username: Option<&str>,
        eligible: bool,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO entries (giveaway_id, user_id, username, eligible, joined_at, last_checked_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (giveaway_id, user_id) DO UPDATE SET \
             eligible = excluded.eligible, \
             last_checked_at = excluded.last_checked_at, \
             username = COALESCE(excluded.username, username)",
        )
        .bind(giveaway_id)
        .bind(user_id)
        .bind(username)
        .bind(eligible)
        .bind(checked_at)
        .bind(checked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, giveaway_id: i64, user_id: i64) -> Result<Option<EntryRow>> {
        let row = sqlx::query_as::<_, EntryRow>(
            "SELECT * FROM entries WHERE giveaway_id = ? AND user_id = ?",
        )
        .bind(giveaway_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // Returns the draw pool in a stable order, so the same seed always walks
    // the same sequence of entries.
    pub async fn eligible_entries(&self, giveaway_id: i64) -> Result<Vec<EntryRow>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            "SELECT * FROM entries WHERE giveaway_id = ? AND eligible = ? ORDER BY user_id",
        )
        .bind(giveaway_id)
        .bind(true)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count(&self, giveaway_id: i64) -> Result<u32> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM entries WHERE giveaway_id = ?")
                .bind(giveaway_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }

    pub async fn count_eligible(&self, giveaway_id: i64) -> Result<u32> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM entries WHERE giveaway_id = ? AND eligible = ?")
                .bind(giveaway_id)
                .bind(true)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }
}
