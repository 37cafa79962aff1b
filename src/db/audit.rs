use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::db::models::{AuditAction, AuditRow};
use crate::error::Result;

// Append-only trail of everything that happened to a giveaway. Rows are
// written by the engine itself and surfaced to the owner on request.
#[derive(Clone, Debug)]
pub struct AuditLog {
    pool: SqlitePool,
}

impl AuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        AuditLog { pool }
    }

    pub async fn append(
        &self,
        giveaway_id: i64,
        actor_id: Option<i64>,
        action: AuditAction,
        payload: Value,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (giveaway_id, actor_id, action, payload, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(giveaway_id)
        .bind(actor_id)
        .bind(action)
        .bind(payload.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // Returns the latest records for the giveaway in chronological order.
    pub async fn feed(&self, giveaway_id: i64, limit: u32) -> Result<Vec<AuditRow>> {
        let mut rows = sqlx::query_as::<_, AuditRow>(
            "SELECT * FROM audit_log WHERE giveaway_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(giveaway_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.reverse();
        Ok(rows)
    }
}
