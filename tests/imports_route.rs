//! Read-API tests: run listing, run lookup, per-run jobs, and logs, served
//! by a Rocket instance wired to a containerized Postgres.

use jobwire_api::ingest::config::{FeedConfig, FeedSource};
use jobwire_api::ingest::coordinator::ImportCoordinator;
use jobwire_api::ingest::fetcher::{FeedFetcher, Listing};
use jobwire_api::ingest::queue::ImportQueue;
use jobwire_api::ingest::worker::ImportWorker;
use jobwire_api::routes::imports::{
    get_import, get_queue_status, list_import_jobs, list_import_logs, list_imports,
};
use jobwire_api::test_support::{TestDatabase, TestRocketBuilder};
use rocket::http::Status;
use rocket::routes;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn source() -> FeedSource {
    FeedSource {
        url: "https://feeds.example.com/jobs.rss".to_string(),
        input_type: "jp1".to_string(),
    }
}

fn listing(id: &str, title: &str) -> Listing {
    Listing {
        external_id: Some(id.to_string()),
        title: Some(title.to_string()),
        description: None,
        categories: Vec::new(),
        link: Some(format!("https://example.com/jobs/{id}")),
        published_at: None,
    }
}

/// Run one import to completion and return its id.
async fn seed_completed_run(pool: &PgPool, listings: Vec<Listing>) -> Uuid {
    let coordinator = ImportCoordinator::new(pool.clone(), FeedFetcher::new());
    let started = coordinator
        .start_with_listings(&source(), listings)
        .await
        .expect("start import");
    let import_id = started.import_id.expect("run created");

    let config = Arc::new(FeedConfig {
        sources: vec![source()],
        sweep_interval: Duration::from_secs(3600),
        worker_count: 1,
        max_attempts: 3,
        poll_interval: Duration::from_millis(10),
        visibility_timeout: Duration::from_secs(600),
    });

    let queue = ImportQueue::new(pool.clone());
    let worker = ImportWorker::new(pool.clone(), config, 0);
    while let Some(item) = queue.claim_next().await.expect("claim item") {
        worker.handle(item).await;
    }

    import_id
}

#[tokio::test]
async fn import_read_api_serves_runs_jobs_and_logs() {
    let db = TestDatabase::new().await.expect("provision database");
    let pool = db.pool_clone();

    let import_id = seed_completed_run(
        &pool,
        vec![
            listing("A", "Backend Engineer"),
            listing("B", "Data Analyst"),
            listing("C", "Designer"),
        ],
    )
    .await;

    let client = TestRocketBuilder::new()
        .mount_api_routes(routes![
            list_imports,
            get_import,
            list_import_jobs,
            list_import_logs,
            get_queue_status,
        ])
        .manage_pg_pool(pool.clone())
        .async_client()
        .await;

    // List runs, newest first.
    let response = client.get("/api/v1/imports").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let runs: Value = response.into_json().await.expect("valid JSON");
    let runs = runs.as_array().expect("array of runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["importId"], Value::String(import_id.to_string()));
    assert_eq!(runs[0]["totalJobs"], 3);
    assert_eq!(runs[0]["processedJobs"], 3);
    assert_eq!(runs[0]["status"], "completed");

    // Single run lookup.
    let response = client
        .get(format!("/api/v1/imports/{import_id}"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let run: Value = response.into_json().await.expect("valid JSON");
    assert_eq!(run["failedJobs"], 0);

    // Unknown and malformed ids.
    let response = client
        .get(format!("/api/v1/imports/{}", Uuid::new_v4()))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NotFound);

    let response = client.get("/api/v1/imports/not-a-uuid").dispatch().await;
    assert_eq!(response.status(), Status::BadRequest);

    // Paginated jobs for the run.
    let response = client
        .get(format!("/api/v1/imports/{import_id}/jobs?page=1&limit=2"))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let page: Value = response.into_json().await.expect("valid JSON");
    assert_eq!(page["page"], 1);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["totalJobs"], 3);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["jobs"].as_array().unwrap().len(), 2);

    let response = client
        .get(format!("/api/v1/imports/{import_id}/jobs?page=2&limit=2"))
        .dispatch()
        .await;
    let page: Value = response.into_json().await.expect("valid JSON");
    assert_eq!(page["jobs"].as_array().unwrap().len(), 1);

    // Jobs for an unknown run are a 404, not an empty page.
    let response = client
        .get(format!("/api/v1/imports/{}/jobs", Uuid::new_v4()))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NotFound);

    // Paginated logs.
    let response = client.get("/api/v1/imports/logs").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let logs: Value = response.into_json().await.expect("valid JSON");
    assert_eq!(logs["totalLogs"], 1);
    assert_eq!(logs["totalPages"], 1);
    let entries = logs["logs"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["inputType"], "jp1");
    assert_eq!(entries[0]["fileName"], "https://feeds.example.com/jobs.rss");
    assert_eq!(entries[0]["newJobs"], 3);

    // Queue is drained.
    let response = client.get("/api/v1/imports/queue/status").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let queue_status: Value = response.into_json().await.expect("valid JSON");
    assert_eq!(queue_status["backlog"], 0);
    assert!(queue_status["items"].as_array().unwrap().is_empty());

    db.close().await.expect("drop database");
}
