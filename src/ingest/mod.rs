//! Asynchronous feed-import pipeline.
//!
//! The pipeline turns external job-listing feeds into deduplicated
//! [`crate::models::JobRecord`] rows while tracking per-run outcomes:
//!
//! 1. **Scheduler** (`scheduler`): once per configured period, sequentially
//!    triggers an import for every configured feed source. A failing source
//!    is logged and the sweep continues.
//! 2. **Coordinator** (`coordinator`): fetches one feed, opens an
//!    [`crate::models::ImportRun`] and its audit log, then enqueues one work
//!    item per listing. The run always exists before the first item does.
//! 3. **Queue** (`queue`): a durable Postgres-backed work queue with
//!    at-least-once delivery. Claims use `FOR UPDATE SKIP LOCKED`; failed
//!    items are redelivered until their attempts are exhausted, and items
//!    orphaned by a crash are requeued after a visibility timeout.
//! 4. **Workers** (`worker`): a fixed-size pool of claim/process loops. Each
//!    item is sanitized, upserted into `job_records` by its external id, and
//!    accounted into the run/log aggregates exactly once per
//!    `(import_id, job_id)` pair, no matter how often it is redelivered.
//!
//! Feed retrieval (`fetcher`) and payload key sanitization (`sanitize`) are
//! small leaf modules used by the coordinator and workers respectively, and
//! `config` carries the immutable source list and tuning knobs resolved once
//! at startup.

pub mod config;
pub mod coordinator;
pub mod fetcher;
pub mod queue;
pub mod sanitize;
pub mod scheduler;
pub mod worker;

use rocket_db_pools::sqlx::{self, PgPool, migrate::Migrator};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations.
///
/// Idempotent: already-applied migrations are skipped, and checksum drift
/// aborts startup before the API serves traffic.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    log::info!("checking database migration state");
    MIGRATOR.run(pool).await?;
    log::info!("database migrations up to date");
    Ok(())
}
