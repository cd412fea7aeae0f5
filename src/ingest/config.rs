//! Immutable pipeline configuration, resolved once at process start.
//!
//! The same [`FeedConfig`] value is passed to both the trigger endpoint's
//! default-source resolution and the scheduler's sweep, so there is a single
//! source of truth for the configured feeds and no mutable global state.

use serde::Deserialize;
use std::env;
use std::time::Duration;

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

/// One configured feed source: where to fetch and how to tag the run.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeedSource {
    pub url: String,
    #[serde(rename = "inputType")]
    pub input_type: String,
}

/// Runtime configuration for the import pipeline.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Ordered feed-source list; the first entry is the trigger default.
    pub sources: Vec<FeedSource>,
    /// Period between scheduler sweeps.
    pub sweep_interval: Duration,
    /// Number of concurrent worker slots draining the queue.
    pub worker_count: usize,
    /// Delivery attempts per queue item before it is parked as failed.
    pub max_attempts: i32,
    /// How long an idle worker sleeps before polling the queue again.
    pub poll_interval: Duration,
    /// How long a claimed item may sit without a heartbeat before it is
    /// considered orphaned and requeued.
    pub visibility_timeout: Duration,
}

impl FeedConfig {
    pub fn from_env() -> Self {
        let sources = env::var("FEED_SOURCES")
            .ok()
            .and_then(|raw| parse_sources(&raw))
            .unwrap_or_else(default_sources);

        Self {
            sources,
            sweep_interval: env_duration_secs("FEED_SWEEP_INTERVAL_SECS", 3600),
            worker_count: env_usize("IMPORT_WORKER_COUNT", 5),
            max_attempts: env_i32("IMPORT_MAX_ATTEMPTS", 3),
            poll_interval: env_duration_secs("IMPORT_POLL_INTERVAL_SECS", 5),
            visibility_timeout: env_duration_secs("IMPORT_VISIBILITY_TIMEOUT_SECS", 600),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Parse a `FEED_SOURCES` override: a JSON array of `{url, inputType}`.
///
/// Malformed or empty overrides are ignored so a bad deploy falls back to
/// the built-in source list instead of silently sweeping nothing.
fn parse_sources(raw: &str) -> Option<Vec<FeedSource>> {
    match serde_json::from_str::<Vec<FeedSource>>(raw) {
        Ok(sources) if !sources.is_empty() => Some(sources),
        Ok(_) => {
            log::warn!("FEED_SOURCES is empty, using built-in source list");
            None
        }
        Err(err) => {
            log::warn!("ignoring malformed FEED_SOURCES: {}", err);
            None
        }
    }
}

fn default_sources() -> Vec<FeedSource> {
    let feeds = [
        ("https://jobicy.com/?feed=job_feed", "jp1"),
        (
            "https://jobicy.com/?feed=job_feed&job_categories=smm&job_types=full-time",
            "jp2",
        ),
        (
            "https://jobicy.com/?feed=job_feed&job_categories=seller&job_types=full-time&search_region=france",
            "jp3",
        ),
        (
            "https://jobicy.com/?feed=job_feed&job_categories=design-multi-media",
            "jp4",
        ),
        (
            "https://jobicy.com/?feed=job_feed&job_categories=data-science",
            "jp5",
        ),
        (
            "https://jobicy.com/?feed=job_feed&job_categories=copywriting",
            "jp6",
        ),
        (
            "https://jobicy.com/?feed=job_feed&job_categories=business",
            "jp7",
        ),
        (
            "https://jobicy.com/?feed=job_feed&job_categories=management",
            "jp8",
        ),
        ("https://www.higheredjobs.com/rss/articleFeed.cfm", "he1"),
    ];

    feeds
        .into_iter()
        .map(|(url, input_type)| FeedSource {
            url: url.to_string(),
            input_type: input_type.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_override() {
        let parsed = parse_sources(
            r#"[{"url": "https://example.com/feed", "inputType": "ex1"}]"#,
        )
        .unwrap();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].url, "https://example.com/feed");
        assert_eq!(parsed[0].input_type, "ex1");
    }

    #[test]
    fn rejects_empty_and_malformed_overrides() {
        assert_eq!(parse_sources("[]"), None);
        assert_eq!(parse_sources("not json"), None);
        assert_eq!(parse_sources(r#"[{"url": "missing tag"}]"#), None);
    }

    #[test]
    fn built_in_sources_are_ordered_and_nonempty() {
        let sources = default_sources();
        assert!(!sources.is_empty());
        assert_eq!(sources[0].input_type, "jp1");
    }
}
