use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::{EntryRow, GiveawayRow, GiveawayStatus, WinnerRow};
use crate::error::{Error, Result};

// Persistent home of giveaways, their sponsor chats and drawn winners.
// Status transitions are single conditional UPDATEs so that two racing
// workers can never both succeed on the same step.
#[derive(Clone, Debug)]
pub struct GiveawayStore {
    pool: SqlitePool,
}

impl GiveawayStore {
    pub fn new(pool: SqlitePool) -> Self {
        GiveawayStore { pool }
    }

    pub async fn create(&self, owner_id: i64, prize: &str, winners_count: u32) -> Result<GiveawayRow> {
        let result = sqlx::query(
            "INSERT INTO giveaways (owner_id, prize, winners_count, status, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(owner_id)
        .bind(prize)
        .bind(winners_count)
        .bind(GiveawayStatus::Draft)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get(result.last_insert_rowid()).await
    }

    pub async fn get(&self, giveaway_id: i64) -> Result<GiveawayRow> {
        let row = sqlx::query_as::<_, GiveawayRow>("SELECT * FROM giveaways WHERE id = ?")
            .bind(giveaway_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(giveaway) => Ok(giveaway),
            None => {
                let message = format!("The requested giveaway was not found.");
                Err(Error::Giveaway(message))
            }
        }
    }

    pub async fn list_owned(&self, owner_id: i64) -> Result<Vec<GiveawayRow>> {
        let rows = sqlx::query_as::<_, GiveawayRow>(
            "SELECT * FROM giveaways WHERE owner_id = ? ORDER BY id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // Returns every active giveaway that has a deadline attached. The caller
    // decides which of them are overdue, so the clock stays out of SQL.
    pub async fn list_active_with_deadline(&self) -> Result<Vec<GiveawayRow>> {
        let rows = sqlx::query_as::<_, GiveawayRow>(
            "SELECT * FROM giveaways WHERE status = ? AND ends_at IS NOT NULL ORDER BY id",
        )
        .bind(GiveawayStatus::Active)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // Replaces the sponsor chat list, keeping the submitted order.
    pub async fn set_sponsor_chats(&self, giveaway_id: i64, chats: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM sponsor_chats WHERE giveaway_id = ?")
            .bind(giveaway_id)
            .execute(&mut *tx)
            .await?;
        for (position, chat) in chats.iter().enumerate() {
            sqlx::query(
                "INSERT INTO sponsor_chats (giveaway_id, position, chat_ref) VALUES (?, ?, ?)",
            )
            .bind(giveaway_id)
            .bind(position as u32)
            .bind(chat)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn sponsor_chats(&self, giveaway_id: i64) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT chat_ref FROM sponsor_chats WHERE giveaway_id = ? ORDER BY position",
        )
        .bind(giveaway_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(chat,)| chat).collect())
    }

    pub async fn set_deadline(&self, giveaway_id: i64, ends_at: Option<DateTime<Utc>>) -> Result<()> {
        sqlx::query("UPDATE giveaways SET ends_at = ? WHERE id = ?")
            .bind(ends_at)
            .bind(giveaway_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // Moves the giveaway from one status to another. Returns false when the
    // row was not in the expected status, which means somebody else won.
    pub async fn transition(
        &self,
        giveaway_id: i64,
        from: GiveawayStatus,
        to: GiveawayStatus,
    ) -> Result<bool> {
        let updated = sqlx::query("UPDATE giveaways SET status = ? WHERE id = ? AND status = ?")
            .bind(to)
            .bind(giveaway_id)
            .bind(from)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated == 1)
    }

    // Attaches the published post and flips the draft into an active giveaway
    // in one statement.
    pub async fn activate(&self, giveaway_id: i64, chat_id: i64, message_id: i64) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE giveaways SET status = ?, published_chat_id = ?, published_message_id = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(GiveawayStatus::Active)
        .bind(chat_id)
        .bind(message_id)
        .bind(giveaway_id)
        .bind(GiveawayStatus::Draft)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    // Records the draw results. The status gate and the winner rows land in
    // the same transaction: either the draw fully happened or it did not.
    pub async fn commit_draw(
        &self,
        giveaway_id: i64,
        seed: u64,
        drawn_at: DateTime<Utc>,
        winners: &[EntryRow],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE giveaways SET status = ?, draw_seed = ?, drawn_at = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(GiveawayStatus::WinnersDrawn)
        .bind(seed as i64)
        .bind(drawn_at)
        .bind(giveaway_id)
        .bind(GiveawayStatus::Ended)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for (index, winner) in winners.iter().enumerate() {
            sqlx::query(
                "INSERT INTO winners (giveaway_id, rank, user_id, username) VALUES (?, ?, ?, ?)",
            )
            .bind(giveaway_id)
            .bind((index + 1) as u32)
            .bind(winner.user_id)
            .bind(&winner.username)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    pub async fn winners(&self, giveaway_id: i64) -> Result<Vec<WinnerRow>> {
        let rows = sqlx::query_as::<_, WinnerRow>(
            "SELECT * FROM winners WHERE giveaway_id = ? ORDER BY rank",
        )
        .bind(giveaway_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // Claims the exclusive right to publish by writing the zero sentinel into
    // the results message field. Only one caller can ever see true here.
    pub async fn reserve_publish(&self, giveaway_id: i64) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE giveaways SET results_message_id = 0 \
             WHERE id = ? AND results_message_id IS NULL",
        )
        .bind(giveaway_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    // Rolls a failed publish back to the unpublished state so that a later
    // attempt can reserve again.
    pub async fn release_publish(&self, giveaway_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE giveaways SET results_message_id = NULL \
             WHERE id = ? AND results_message_id = 0",
        )
        .bind(giveaway_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // Swaps the sentinel for the real results message and closes the giveaway.
    pub async fn finalize_publish(&self, giveaway_id: i64, message_id: i64) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE giveaways SET results_message_id = ?, status = ? \
             WHERE id = ? AND results_message_id = 0",
        )
        .bind(message_id)
        .bind(GiveawayStatus::ResultsPublished)
        .bind(giveaway_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    // Removes the giveaway together with everything that references it.
    pub async fn delete_cascade(&self, giveaway_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in [
            "DELETE FROM winners WHERE giveaway_id = ?",
            "DELETE FROM entries WHERE giveaway_id = ?",
            "DELETE FROM sponsor_chats WHERE giveaway_id = ?",
            "DELETE FROM audit_log WHERE giveaway_id = ?",
            "DELETE FROM giveaways WHERE id = ?",
        ] {
            sqlx::query(statement)
                .bind(giveaway_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
