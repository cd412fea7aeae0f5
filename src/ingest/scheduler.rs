//! Periodic sweep across every configured feed source.

use crate::ingest::config::FeedConfig;
use crate::ingest::coordinator::ImportCoordinator;
use crate::ingest::fetcher::FeedFetcher;
use crate::ingest::queue::ImportQueue;
use rocket_db_pools::sqlx::PgPool;
use std::sync::Arc;

pub struct SweepScheduler {
    pool: PgPool,
    config: Arc<FeedConfig>,
    fetcher: FeedFetcher,
}

impl SweepScheduler {
    pub fn new(pool: PgPool, config: Arc<FeedConfig>, fetcher: FeedFetcher) -> Self {
        Self {
            pool,
            config,
            fetcher,
        }
    }

    /// Run the sweep loop forever, one pass per `sweep_interval`.
    ///
    /// The first sweep fires one full period after startup, not immediately.
    pub async fn run(self) -> ! {
        log::info!(
            "sweep scheduler started: {} sources every {:?}",
            self.config.sources.len(),
            self.config.sweep_interval
        );

        loop {
            tokio::time::sleep(self.config.sweep_interval).await;
            self.sweep().await;
        }
    }

    /// One pass: requeue orphaned work, then trigger every configured source
    /// in order.
    ///
    /// Waits only for each source's enqueue to finish, never for its items to
    /// be processed, so runs from the same sweep execute concurrently in the
    /// worker pool. A failing source is logged and the sweep continues.
    pub async fn sweep(&self) {
        let queue = ImportQueue::new(self.pool.clone());
        match queue.requeue_stale(self.config.visibility_timeout).await {
            Ok(0) => {}
            Ok(n) => log::warn!("sweep: requeued {} stale items", n),
            Err(e) => log::error!("sweep: failed to requeue stale items: {}", e),
        }

        let coordinator = ImportCoordinator::new(self.pool.clone(), self.fetcher.clone());

        for source in &self.config.sources {
            match coordinator.start_import(source).await {
                Ok(started) => log::info!(
                    "sweep: {} ({}): {} listings, import {:?}",
                    source.url,
                    source.input_type,
                    started.total_fetched,
                    started.import_id
                ),
                Err(e) => {
                    log::error!("sweep: import failed for {}: {}", source.url, e);
                }
            }
        }
    }
}
