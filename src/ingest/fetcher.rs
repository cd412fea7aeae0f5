//! Feed retrieval: HTTP fetch plus RSS 2.0 parsing.
//!
//! [`FeedFetcher::fetch`] downloads a feed and hands the body to
//! [`parse_feed`], a pure function over the XML text so parsing is testable
//! without a network.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::time::Duration;
use thiserror::Error;

/// A feed was unreachable or its body could not be parsed.
///
/// Either way the import run is never created; the error aborts one
/// coordinator invocation and is surfaced to the caller.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed is not well-formed XML: {0}")]
    Xml(String),
}

/// One normalized listing from a feed.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// External identifier (`<guid>`), if the feed provides one.
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub categories: Vec<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Listing {
    /// Idempotency key for the listing: the external id, falling back to the
    /// listing URL.
    pub fn job_id(&self) -> Option<&str> {
        self.external_id.as_deref().or(self.link.as_deref())
    }

    /// All category tags joined into one value.
    pub fn category(&self) -> Option<String> {
        if self.categories.is_empty() {
            None
        } else {
            Some(self.categories.join(", "))
        }
    }
}

/// HTTP client wrapper for downloading feeds.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("jobwire/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");

        Self { client }
    }

    /// Download one feed and parse its listings.
    pub async fn fetch(&self, url: &str) -> Result<Vec<Listing>, FetchError> {
        log::info!("fetching feed {}", url);

        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let listings = parse_feed(&body)?;
        log::info!("feed {}: {} listings", url, listings.len());

        Ok(listings)
    }
}

impl Default for FeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Fields of an `<item>` element the pipeline cares about.
#[derive(Debug, Clone, Copy)]
enum ItemField {
    Title,
    Link,
    Guid,
    Description,
    Category,
    PubDate,
}

impl ItemField {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"link" => Some(Self::Link),
            b"guid" => Some(Self::Guid),
            b"description" => Some(Self::Description),
            b"category" => Some(Self::Category),
            b"pubDate" => Some(Self::PubDate),
            _ => None,
        }
    }

    fn assign(self, listing: &mut Listing, value: String) {
        match self {
            Self::Title => listing.title = Some(value),
            Self::Link => listing.link = Some(value),
            Self::Guid => listing.external_id = Some(value),
            Self::Description => listing.description = Some(value),
            Self::Category => listing.categories.push(value),
            Self::PubDate => listing.published_at = parse_pub_date(&value),
        }
    }
}

/// Parse an RSS 2.0 document into listings.
///
/// Only `<item>` children are inspected; unknown elements are skipped.
/// Listings carrying neither a `<guid>` nor a `<link>` cannot satisfy the
/// queue-item contract and are dropped with a warning.
pub fn parse_feed(xml: &str) -> Result<Vec<Listing>, FetchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut listings = Vec::new();
    let mut current: Option<Listing> = None;
    let mut field: Option<ItemField> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let local_name = e.local_name();
                if local_name.as_ref() == b"item" {
                    current = Some(Listing::default());
                } else if current.is_some() {
                    field = ItemField::from_name(local_name.as_ref());
                    text.clear();
                }
            }
            Ok(Event::Text(e)) => {
                if current.is_some() && field.is_some() {
                    text.push_str(&e.xml_content().unwrap_or_default());
                }
            }
            Ok(Event::CData(e)) => {
                if current.is_some() && field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(ref e)) => {
                if e.local_name().as_ref() == b"item" {
                    if let Some(listing) = current.take() {
                        if listing.job_id().is_some() {
                            listings.push(listing);
                        } else {
                            log::warn!(
                                "dropping listing without guid or link: {:?}",
                                listing.title
                            );
                        }
                    }
                    field = None;
                } else if let (Some(listing), Some(item_field)) = (current.as_mut(), field.take())
                {
                    let value = text.trim();
                    if !value.is_empty() {
                        item_field.assign(listing, value.to_string());
                    }
                }
            }
            Ok(Event::Empty(_)) => field = None,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FetchError::Xml(e.to_string())),
        }
    }

    Ok(listings)
}

fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc2822(raw) {
        Ok(date) => Some(date.with_timezone(&Utc)),
        Err(err) => {
            log::warn!("unparseable pubDate '{}': {}", raw, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Remote Jobs</title>
    <item>
      <title>Backend Engineer</title>
      <link>https://example.com/jobs/backend</link>
      <guid isPermaLink="false">job-1001</guid>
      <description><![CDATA[<p>Build &amp; run services.</p>]]></description>
      <category>Engineering</category>
      <category>Remote</category>
      <pubDate>Tue, 05 Aug 2025 09:30:00 +0000</pubDate>
    </item>
    <item>
      <title>Designer</title>
      <link>https://example.com/jobs/designer</link>
      <pubDate>not a date</pubDate>
    </item>
    <item>
      <title>Identifier-less</title>
      <description>No guid, no link.</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_items_with_guid_categories_and_dates() {
        let listings = parse_feed(FEED).unwrap();
        assert_eq!(listings.len(), 2);

        let backend = &listings[0];
        assert_eq!(backend.external_id.as_deref(), Some("job-1001"));
        assert_eq!(backend.job_id(), Some("job-1001"));
        assert_eq!(backend.title.as_deref(), Some("Backend Engineer"));
        assert_eq!(
            backend.description.as_deref(),
            Some("<p>Build &amp; run services.</p>")
        );
        assert_eq!(backend.category().as_deref(), Some("Engineering, Remote"));
        assert_eq!(
            backend.published_at,
            Some(Utc.with_ymd_and_hms(2025, 8, 5, 9, 30, 0).unwrap())
        );
    }

    #[test]
    fn falls_back_to_link_when_guid_is_missing() {
        let listings = parse_feed(FEED).unwrap();
        let designer = &listings[1];

        assert_eq!(designer.external_id, None);
        assert_eq!(designer.job_id(), Some("https://example.com/jobs/designer"));
        assert_eq!(designer.published_at, None, "bad pubDate becomes None");
    }

    #[test]
    fn drops_listings_without_any_identifier() {
        let listings = parse_feed(FEED).unwrap();
        assert!(listings.iter().all(|l| l.title.as_deref() != Some("Identifier-less")));
    }

    #[test]
    fn empty_channel_yields_no_listings() {
        let listings =
            parse_feed("<rss><channel><title>empty</title></channel></rss>").unwrap();
        assert!(listings.is_empty());
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_feed("<rss><channel><item></rss>").is_err());
    }
}
