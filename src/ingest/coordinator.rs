//! Import coordination: turn one fetched feed into an open run plus queued
//! work items.

use crate::ingest::config::FeedSource;
use crate::ingest::fetcher::{FeedFetcher, FetchError, Listing};
use crate::ingest::queue::ImportQueue;
use rocket_db_pools::sqlx::{self, PgPool};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Failure starting one import run.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to open import run: {0}")]
    Database(sqlx::Error),
    /// The queue became unavailable mid-fan-out. Already-enqueued items are
    /// not rolled back; the run under-reports against what was enqueued.
    #[error("failed to enqueue listing: {0}")]
    Enqueue(sqlx::Error),
}

/// Result of starting (or short-circuiting) one import run.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportStarted {
    pub message: String,
    /// `None` when the feed was empty and no run was created.
    pub import_id: Option<Uuid>,
    pub total_fetched: i64,
}

pub struct ImportCoordinator {
    pool: PgPool,
    fetcher: FeedFetcher,
}

impl ImportCoordinator {
    pub fn new(pool: PgPool, fetcher: FeedFetcher) -> Self {
        Self { pool, fetcher }
    }

    /// Fetch one feed and fan its listings out to the work queue.
    pub async fn start_import(&self, source: &FeedSource) -> Result<ImportStarted, ImportError> {
        let listings = self.fetcher.fetch(&source.url).await?;
        self.start_with_listings(source, listings).await
    }

    /// Open a run for already-fetched listings and enqueue one item each.
    ///
    /// The run and its log are both created before the first enqueue, so a
    /// worker can never observe an item whose run does not exist yet. An
    /// empty feed is a no-op, not an error: nothing is written.
    pub async fn start_with_listings(
        &self,
        source: &FeedSource,
        listings: Vec<Listing>,
    ) -> Result<ImportStarted, ImportError> {
        let listings: Vec<Listing> = listings
            .into_iter()
            .filter(|listing| {
                if listing.job_id().is_some() {
                    true
                } else {
                    log::warn!(
                        "feed {}: skipping listing without guid or link: {:?}",
                        source.url,
                        listing.title
                    );
                    false
                }
            })
            .collect();

        if listings.is_empty() {
            log::info!("feed {}: no listings, nothing to import", source.url);
            return Ok(ImportStarted {
                message: "No jobs found in feed".to_string(),
                import_id: None,
                total_fetched: 0,
            });
        }

        let import_id = Uuid::new_v4();
        let total = listings.len() as i32;

        sqlx::query("INSERT INTO import_runs (import_id, total_jobs) VALUES ($1, $2)")
            .bind(import_id)
            .bind(total)
            .execute(&self.pool)
            .await
            .map_err(ImportError::Database)?;

        sqlx::query(
            r#"INSERT INTO import_logs (import_id, file_name, input_type, total_fetched)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(import_id)
        .bind(&source.url)
        .bind(&source.input_type)
        .bind(total)
        .execute(&self.pool)
        .await
        .map_err(ImportError::Database)?;

        let source_name = feed_host(&source.url);
        let queue = ImportQueue::new(self.pool.clone());

        for listing in &listings {
            // job_id presence is guaranteed by the filter above.
            let job_id = listing.job_id().unwrap_or_default().to_string();
            let payload = json!({
                "importId": import_id,
                "jobId": job_id,
                "title": listing.title,
                "description": listing.description,
                "category": listing.category(),
                "source": source_name,
                "link": listing.link,
                "publishedAt": listing.published_at,
            });

            queue
                .enqueue(import_id, &job_id, &payload)
                .await
                .map_err(ImportError::Enqueue)?;
        }

        log::info!(
            "import {}: enqueued {} listings from {} ({})",
            import_id,
            total,
            source.url,
            source.input_type
        );

        Ok(ImportStarted {
            message: "Import started".to_string(),
            import_id: Some(import_id),
            total_fetched: total as i64,
        })
    }
}

/// Source tag for job records, derived from the feed URL's host.
fn feed_host(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_source_from_feed_host() {
        assert_eq!(
            feed_host("https://jobicy.com/?feed=job_feed").as_deref(),
            Some("jobicy.com")
        );
        assert_eq!(feed_host("not a url"), None);
    }
}
