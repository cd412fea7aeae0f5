//! Import pipeline endpoints: manual trigger, run inspection, and audit logs.

use crate::error::ApiError;
use crate::ingest::config::{FeedConfig, FeedSource};
use crate::ingest::coordinator::{ImportCoordinator, ImportStarted};
use crate::ingest::fetcher::FeedFetcher;
use crate::ingest::queue::{ImportQueue, QueueItemInfo};
use crate::models::{ImportLog, ImportRun, JobRecord};
use crate::routes::params::PaginationParams;
use rocket::State;
use rocket::serde::json::Json;
use rocket_db_pools::sqlx;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Optional request body for the manual import trigger.
///
/// When both fields are present an ad-hoc source is imported; otherwise the
/// first configured feed source is used.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerImportRequest {
    pub source_url: Option<String>,
    pub input_type: Option<String>,
}

/// One page of job records belonging to a run.
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobsPage {
    pub page: i64,
    pub limit: i64,
    pub total_jobs: i64,
    pub total_pages: i64,
    pub jobs: Vec<JobRecord>,
}

/// One page of import logs.
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogsPage {
    pub page: i64,
    pub limit: i64,
    pub total_logs: i64,
    pub total_pages: i64,
    pub logs: Vec<ImportLog>,
}

/// Snapshot of the work queue.
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusResponse {
    /// Items not yet in a terminal state.
    pub backlog: i64,
    pub items: Vec<QueueItemInfo>,
}

/// Trigger one import run.
///
/// Fetches the feed, opens a run, and enqueues its listings; listing
/// processing itself happens asynchronously in the worker pool. An empty
/// feed responds with a no-op message and a null `importId`.
#[openapi(tag = "Imports")]
#[post("/imports/trigger", data = "<request>")]
pub async fn trigger_import(
    request: Option<Json<TriggerImportRequest>>,
    pool: &State<sqlx::PgPool>,
    config: &State<FeedConfig>,
    fetcher: &State<FeedFetcher>,
) -> Result<Json<ImportStarted>, ApiError> {
    let source = match request.and_then(|body| {
        let body = body.into_inner();
        match (body.source_url, body.input_type) {
            (Some(url), Some(input_type)) => Some(FeedSource { url, input_type }),
            _ => None,
        }
    }) {
        Some(source) => source,
        None => config
            .sources
            .first()
            .cloned()
            .ok_or_else(|| ApiError::BadRequest("No feed sources configured".to_string()))?,
    };

    let coordinator = ImportCoordinator::new(pool.inner().clone(), fetcher.inner().clone());
    let started = coordinator
        .start_import(&source)
        .await
        .map_err(|e| ApiError::InternalError(format!("Job import failed: {e}")))?;

    Ok(Json(started))
}

/// List all import runs, newest first.
#[openapi(tag = "Imports")]
#[get("/imports")]
pub async fn list_imports(pool: &State<sqlx::PgPool>) -> Result<Json<Vec<ImportRun>>, ApiError> {
    let runs: Vec<ImportRun> = sqlx::query_as(
        r#"SELECT id, import_id, total_jobs, processed_jobs, failed_jobs, status, created_at
           FROM import_runs
           ORDER BY created_at DESC, id DESC"#,
    )
    .fetch_all(pool.inner())
    .await?;

    Ok(Json(runs))
}

/// Fetch a single import run by its id.
#[openapi(tag = "Imports")]
#[get("/imports/<import_id>")]
pub async fn get_import(
    import_id: String,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<ImportRun>, ApiError> {
    let import_id = parse_import_id(&import_id)?;

    let run: ImportRun = sqlx::query_as(
        r#"SELECT id, import_id, total_jobs, processed_jobs, failed_jobs, status, created_at
           FROM import_runs
           WHERE import_id = $1"#,
    )
    .bind(import_id)
    .fetch_one(pool.inner())
    .await
    .map_err(|_| ApiError::NotFound(format!("Import '{import_id}' not found")))?;

    Ok(Json(run))
}

/// List the job records last touched by a run, newest first, paginated.
#[openapi(tag = "Imports")]
#[get("/imports/<import_id>/jobs?<params..>")]
pub async fn list_import_jobs(
    import_id: String,
    params: PaginationParams,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<JobsPage>, ApiError> {
    let import_id = parse_import_id(&import_id)?;

    let run: Option<(i32,)> = sqlx::query_as("SELECT id FROM import_runs WHERE import_id = $1")
        .bind(import_id)
        .fetch_optional(pool.inner())
        .await?;

    if run.is_none() {
        return Err(ApiError::NotFound(format!("Import '{import_id}' not found")));
    }

    let (jobs, total) = tokio::try_join!(
        async {
            sqlx::query_as::<_, JobRecord>(
                r#"SELECT id, job_id, import_id, title, description, category, source, link,
                          published_at, payload, created_at, updated_at
                   FROM job_records
                   WHERE import_id = $1
                   ORDER BY created_at DESC, id DESC
                   LIMIT $2 OFFSET $3"#,
            )
            .bind(import_id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(pool.inner())
            .await
        },
        async {
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM job_records WHERE import_id = $1")
                .bind(import_id)
                .fetch_one(pool.inner())
                .await
        }
    )?;

    Ok(Json(JobsPage {
        page: params.page(),
        limit: params.limit(),
        total_jobs: total.0,
        total_pages: params.total_pages(total.0),
        jobs,
    }))
}

/// List import logs, newest first, paginated.
#[openapi(tag = "Imports")]
#[get("/imports/logs?<params..>")]
pub async fn list_import_logs(
    params: PaginationParams,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<LogsPage>, ApiError> {
    let (logs, total) = tokio::try_join!(
        async {
            sqlx::query_as::<_, ImportLog>(
                r#"SELECT id, import_id, file_name, input_type, total_fetched, total_imported,
                          new_jobs, updated_jobs, failed_jobs, failed_reasons, created_at
                   FROM import_logs
                   ORDER BY created_at DESC, id DESC
                   LIMIT $1 OFFSET $2"#,
            )
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(pool.inner())
            .await
        },
        async {
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM import_logs")
                .fetch_one(pool.inner())
                .await
        }
    )?;

    Ok(Json(LogsPage {
        page: params.page(),
        limit: params.limit(),
        total_logs: total.0,
        total_pages: params.total_pages(total.0),
        logs,
    }))
}

/// Inspect the work queue: backlog size and the items still in flight.
#[openapi(tag = "Imports")]
#[get("/imports/queue/status")]
pub async fn get_queue_status(
    pool: &State<sqlx::PgPool>,
) -> Result<Json<QueueStatusResponse>, ApiError> {
    let queue = ImportQueue::new(pool.inner().clone());

    let backlog = queue
        .backlog()
        .await
        .map_err(|e| ApiError::InternalError(format!("Failed to read queue backlog: {e}")))?;
    let items = queue
        .active_items()
        .await
        .map_err(|e| ApiError::InternalError(format!("Failed to read queue items: {e}")))?;

    Ok(Json(QueueStatusResponse { backlog, items }))
}

fn parse_import_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid import id '{raw}'")))
}
