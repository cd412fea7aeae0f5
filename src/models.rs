use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::FromRow;
use rocket_db_pools::sqlx::types::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ===== Import Runs =====

/// Lifecycle state of an import run.
///
/// A run starts in `Processing`, moves to `Completed` once every discovered
/// listing is accounted for, and drops to `Failed` as soon as a single item
/// fails. `Failed` is sticky: later successes keep incrementing counters but
/// never restore the status.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, sqlx::Type, PartialEq, Eq,
)]
#[sqlx(type_name = "import_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Processing,
    Completed,
    Failed,
}

/// One feed-fetch attempt: how many listings were discovered and how far the
/// workers have progressed through them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportRun {
    pub id: i32,
    pub import_id: Uuid,
    pub total_jobs: i32,
    pub processed_jobs: i32,
    pub failed_jobs: i32,
    pub status: ImportStatus,
    pub created_at: Option<DateTime<Utc>>,
}

// ===== Import Logs =====

/// One entry in an import log's ordered failure list.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailedReason {
    pub job_id: String,
    pub reason: String,
}

/// Human-auditable sibling of [`ImportRun`], one per feed-fetch attempt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportLog {
    pub id: i32,
    pub import_id: Uuid,
    /// Source URL the feed was fetched from.
    pub file_name: String,
    /// Feed category tag the source was configured with.
    pub input_type: String,
    pub total_fetched: i32,
    pub total_imported: i32,
    pub new_jobs: i32,
    pub updated_jobs: i32,
    pub failed_jobs: i32,
    #[schemars(with = "Vec<FailedReason>")]
    pub failed_reasons: Json<Vec<FailedReason>>,
    pub created_at: Option<DateTime<Utc>>,
}

// ===== Job Records =====

/// A single deduplicated job listing.
///
/// `job_id` is the external identifier and global idempotency key; every
/// sighting of the same id, from any run, overwrites the descriptive fields
/// in place. `import_id` only reflects the most recent run that touched the
/// record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: i32,
    pub job_id: String,
    pub import_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Sanitized raw feed payload, preserving fields beyond the typed columns.
    pub payload: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
