//! Durable Postgres-backed work queue.
//!
//! Decouples the import coordinator from the worker pool and survives
//! process restarts. Delivery is at-least-once: a claimed item that is never
//! completed (worker crash) returns to the queue after the visibility
//! timeout, and failed items are redelivered until their attempts are
//! exhausted. Item processing must therefore be idempotent.

use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, PgPool};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "queue_item_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// A claimed work item: one listing to apply to the document store.
#[derive(Debug, Clone)]
pub struct ClaimedItem {
    pub id: i32,
    pub import_id: Uuid,
    pub job_id: String,
    /// Delivery attempts including the current one.
    pub attempts: i32,
    pub payload: Value,
}

pub struct ImportQueue {
    pool: PgPool,
}

impl ImportQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue one work item, returning the queue row id.
    pub async fn enqueue(
        &self,
        import_id: Uuid,
        job_id: &str,
        payload: &Value,
    ) -> Result<i32, sqlx::Error> {
        let (id,): (i32,) = sqlx::query_as(
            r#"INSERT INTO import_queue (import_id, job_id, payload)
               VALUES ($1, $2, $3)
               RETURNING id"#,
        )
        .bind(import_id)
        .bind(job_id)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Claim the next queued item atomically (SELECT FOR UPDATE SKIP LOCKED).
    ///
    /// Items are delivered oldest-first, but workers racing on the queue make
    /// no ordering promise to consumers.
    pub async fn claim_next(&self) -> Result<Option<ClaimedItem>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let item: Option<(i32, Uuid, String, i32, Value)> = sqlx::query_as(
            r#"SELECT id, import_id, job_id, attempts, payload FROM import_queue
               WHERE status = 'queued'
               ORDER BY created_at ASC, id ASC
               LIMIT 1
               FOR UPDATE SKIP LOCKED"#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        if let Some((id, import_id, job_id, attempts, payload)) = item {
            sqlx::query(
                r#"UPDATE import_queue
                   SET status = 'running',
                       attempts = attempts + 1,
                       started_at = COALESCE(started_at, NOW()),
                       last_heartbeat = NOW()
                   WHERE id = $1"#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            Ok(Some(ClaimedItem {
                id,
                import_id,
                job_id,
                attempts: attempts + 1,
                payload,
            }))
        } else {
            Ok(None)
        }
    }

    /// Mark an item successfully processed.
    pub async fn complete(&self, item_id: i32) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE import_queue
               SET status = 'succeeded', completed_at = NOW(), last_heartbeat = NOW()
               WHERE id = $1"#,
        )
        .bind(item_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Hand a failed item back for redelivery, or park it as failed once its
    /// attempts are exhausted. Returns the status the item ended up in.
    pub async fn fail(
        &self,
        item_id: i32,
        error: &str,
        max_attempts: i32,
    ) -> Result<QueueItemStatus, sqlx::Error> {
        let (status,): (QueueItemStatus,) = sqlx::query_as(
            r#"UPDATE import_queue
               SET status = CASE WHEN attempts >= $2
                                 THEN 'failed'::queue_item_status
                                 ELSE 'queued'::queue_item_status
                            END,
                   error_message = $3,
                   completed_at = CASE WHEN attempts >= $2 THEN NOW() ELSE NULL END,
                   last_heartbeat = NOW()
               WHERE id = $1
               RETURNING status"#,
        )
        .bind(item_id)
        .bind(max_attempts)
        .bind(error)
        .fetch_one(&self.pool)
        .await?;

        Ok(status)
    }

    /// Return items stuck in `running` past the visibility timeout to the
    /// queue. Covers workers that crashed mid-item; the re-claimed item is a
    /// redelivery, so counters are protected by the per-pair marks.
    pub async fn requeue_stale(&self, visibility_timeout: Duration) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE import_queue
               SET status = 'queued', last_heartbeat = NOW()
               WHERE status = 'running'
                 AND last_heartbeat < NOW() - ($1 * INTERVAL '1 second')"#,
        )
        .bind(visibility_timeout.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Number of items not yet in a terminal state.
    pub async fn backlog(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM import_queue WHERE status IN ('queued', 'running')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// All items still queued or running, oldest first (status endpoint).
    pub async fn active_items(&self) -> Result<Vec<QueueItemInfo>, sqlx::Error> {
        sqlx::query_as(
            r#"SELECT id, import_id, job_id, status, attempts, error_message,
                      created_at, started_at, completed_at
               FROM import_queue
               WHERE status IN ('queued', 'running')
               ORDER BY created_at ASC, id ASC"#,
        )
        .fetch_all(&self.pool)
        .await
    }
}

/// Queue row as exposed by the queue-status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemInfo {
    pub id: i32,
    pub import_id: Uuid,
    pub job_id: String,
    pub status: QueueItemStatus,
    pub attempts: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
