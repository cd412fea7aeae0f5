//! Worker pool draining the import queue.
//!
//! Each worker owns one concurrency slot: it claims one item at a time,
//! applies it to the document store idempotently, and feeds the outcome back
//! into the run and log aggregates. Redelivered items re-apply the record
//! write but never re-count, thanks to the per-`(import_id, job_id)` marks.

use crate::ingest::config::FeedConfig;
use crate::ingest::queue::{ClaimedItem, ImportQueue, QueueItemStatus};
use crate::ingest::sanitize::sanitize_keys;
use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, PgPool};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failure applying one queued item to the document store.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("malformed queue payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("document store write failed: {0}")]
    Store(#[from] sqlx::Error),
}

/// How a successfully processed item changed the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Created,
    Updated,
}

/// Typed view of the descriptive fields inside a queue-item payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingPayload {
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
    source: Option<String>,
    link: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

pub struct WorkerPool;

impl WorkerPool {
    /// Spawn `worker_count` independent claim/process loops.
    pub fn spawn(pool: PgPool, config: Arc<FeedConfig>) {
        for slot in 0..config.worker_count {
            let worker = ImportWorker::new(pool.clone(), config.clone(), slot);
            tokio::spawn(async move { worker.run().await });
        }
    }
}

pub struct ImportWorker {
    pool: PgPool,
    queue: ImportQueue,
    config: Arc<FeedConfig>,
    slot: usize,
}

impl ImportWorker {
    pub fn new(pool: PgPool, config: Arc<FeedConfig>, slot: usize) -> Self {
        let queue = ImportQueue::new(pool.clone());
        Self {
            pool,
            queue,
            config,
            slot,
        }
    }

    /// Run the claim/process loop forever.
    pub async fn run(self) -> ! {
        log::info!("import worker {} started", self.slot);

        loop {
            let item = match self.queue.claim_next().await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    tokio::time::sleep(self.config.poll_interval).await;
                    continue;
                }
                Err(e) => {
                    log::error!("worker {}: failed to claim item: {}", self.slot, e);
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    continue;
                }
            };

            self.handle(item).await;
        }
    }

    /// Process one claimed item and settle it with the queue.
    pub async fn handle(&self, item: ClaimedItem) {
        let item_id = item.id;

        match self.process_item(&item).await {
            Ok(outcome) => {
                log::debug!(
                    "worker {}: item {} ({}) {:?}",
                    self.slot,
                    item_id,
                    item.job_id,
                    outcome
                );

                if let Err(e) = self.queue.complete(item_id).await {
                    log::error!(
                        "worker {}: failed to mark item {} complete: {}",
                        self.slot,
                        item_id,
                        e
                    );
                }
            }
            Err(err) => {
                log::error!("worker {}: item {} failed: {}", self.slot, item_id, err);

                if let Err(e) = self.record_failure(&item, &err).await {
                    log::error!(
                        "worker {}: failed to record failure for item {}: {}",
                        self.slot,
                        item_id,
                        e
                    );
                }

                match self
                    .queue
                    .fail(item_id, &err.to_string(), self.config.max_attempts)
                    .await
                {
                    Ok(QueueItemStatus::Queued) => {
                        log::info!("worker {}: item {} requeued for retry", self.slot, item_id)
                    }
                    Ok(_) => log::warn!(
                        "worker {}: item {} failed permanently after {} attempts",
                        self.slot,
                        item_id,
                        item.attempts
                    ),
                    Err(e) => log::error!(
                        "worker {}: failed to settle queue item {}: {}",
                        self.slot,
                        item_id,
                        e
                    ),
                }
            }
        }
    }

    /// Apply one queued listing to the document store.
    ///
    /// Safe to re-run to completion: the record upsert is keyed on `job_id`,
    /// and the aggregate increments only fire the first time this
    /// `(import_id, job_id)` pair is observed. Record write, mark, and
    /// increments share one transaction so a crash between them cannot split
    /// the accounting.
    pub async fn process_item(&self, item: &ClaimedItem) -> Result<ItemOutcome, ProcessingError> {
        let sanitized = sanitize_keys(item.payload.clone());
        let fields: ListingPayload = serde_json::from_value(sanitized.clone())?;

        let mut tx = self.pool.begin().await?;

        let inserted: Option<(i32,)> = sqlx::query_as(
            r#"INSERT INTO job_records
                   (job_id, import_id, title, description, category, source, link,
                    published_at, payload)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               ON CONFLICT (job_id) DO NOTHING
               RETURNING id"#,
        )
        .bind(&item.job_id)
        .bind(item.import_id)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.category)
        .bind(&fields.source)
        .bind(&fields.link)
        .bind(fields.published_at)
        .bind(&sanitized)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = if inserted.is_some() {
            ItemOutcome::Created
        } else {
            sqlx::query(
                r#"UPDATE job_records
                   SET import_id = $2, title = $3, description = $4, category = $5,
                       source = $6, link = $7, published_at = $8, payload = $9,
                       updated_at = NOW()
                   WHERE job_id = $1"#,
            )
            .bind(&item.job_id)
            .bind(item.import_id)
            .bind(&fields.title)
            .bind(&fields.description)
            .bind(&fields.category)
            .bind(&fields.source)
            .bind(&fields.link)
            .bind(fields.published_at)
            .bind(&sanitized)
            .execute(&mut *tx)
            .await?;

            ItemOutcome::Updated
        };

        let mark = sqlx::query(
            r#"INSERT INTO import_item_marks (import_id, job_id, outcome)
               VALUES ($1, $2, 'processed')
               ON CONFLICT (import_id, job_id) DO NOTHING"#,
        )
        .bind(item.import_id)
        .bind(&item.job_id)
        .execute(&mut *tx)
        .await?;

        if mark.rows_affected() == 1 {
            sqlx::query(
                "UPDATE import_runs SET processed_jobs = processed_jobs + 1 WHERE import_id = $1",
            )
            .bind(item.import_id)
            .execute(&mut *tx)
            .await?;

            let log_update = match outcome {
                ItemOutcome::Created => {
                    r#"UPDATE import_logs
                       SET total_imported = total_imported + 1, new_jobs = new_jobs + 1
                       WHERE import_id = $1"#
                }
                ItemOutcome::Updated => {
                    r#"UPDATE import_logs
                       SET total_imported = total_imported + 1, updated_jobs = updated_jobs + 1
                       WHERE import_id = $1"#
                }
            };

            sqlx::query(log_update)
                .bind(item.import_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.reconcile_run(item.import_id).await?;

        Ok(outcome)
    }

    /// Advance the run to `completed` once every item is accounted for.
    ///
    /// A single conditional update: concurrent workers cannot race a stale
    /// read, and a sticky `failed` status is never overwritten. Re-checking
    /// after the threshold is met is a no-op.
    async fn reconcile_run(&self, import_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE import_runs
               SET status = 'completed'
               WHERE import_id = $1
                 AND status = 'processing'
                 AND processed_jobs + failed_jobs = total_jobs"#,
        )
        .bind(import_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record one item failure into the run and log aggregates.
    ///
    /// Forces the sticky `failed` status and appends the reason, but only the
    /// first time this `(import_id, job_id)` pair is observed; a pair that
    /// already counted (in either direction) leaves the aggregates alone.
    pub async fn record_failure(
        &self,
        item: &ClaimedItem,
        error: &ProcessingError,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let mark = sqlx::query(
            r#"INSERT INTO import_item_marks (import_id, job_id, outcome)
               VALUES ($1, $2, 'failed')
               ON CONFLICT (import_id, job_id) DO NOTHING"#,
        )
        .bind(item.import_id)
        .bind(&item.job_id)
        .execute(&mut *tx)
        .await?;

        if mark.rows_affected() == 0 {
            tx.commit().await?;
            return Ok(());
        }

        sqlx::query(
            r#"UPDATE import_runs
               SET failed_jobs = failed_jobs + 1, status = 'failed'
               WHERE import_id = $1"#,
        )
        .bind(item.import_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"UPDATE import_logs
               SET failed_jobs = failed_jobs + 1,
                   failed_reasons = failed_reasons
                       || jsonb_build_object('jobId', $2::text, 'reason', $3::text)
               WHERE import_id = $1"#,
        )
        .bind(item.import_id)
        .bind(&item.job_id)
        .bind(error.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
