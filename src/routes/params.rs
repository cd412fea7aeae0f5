//! Query parameter helpers shared by the paginated list endpoints.
//!
//! The struct follows Rocket's `FromForm` conventions and derives
//! `JsonSchema` so the generated OpenAPI document reflects the available
//! parameters and their defaults.

use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const fn default_page() -> i64 {
    1
}

const fn default_limit() -> i64 {
    10
}

const MAX_LIMIT: i64 = 100;

/// Common pagination parameters applied to list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, rocket::form::FromForm)]
pub struct PaginationParams {
    /// One-based page index (defaults to the first page).
    #[field(default = 1)]
    #[serde(default = "default_page")]
    pub page: i64,
    /// Number of items per page (clamped between 1 and 100, default 10).
    #[field(default = 10)]
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PaginationParams {
    /// Normalized 1-based page index.
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    /// Normalized page size capped at [`MAX_LIMIT`].
    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, MAX_LIMIT)
    }

    /// Row offset for the normalized page.
    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }

    /// Total number of pages needed for `total` rows.
    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.limit() - 1) / self.limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::form::Form;

    #[test]
    fn parses_page_and_limit() {
        let parsed: PaginationParams = Form::parse("page=3&limit=25").unwrap();
        assert_eq!(parsed.page(), 3);
        assert_eq!(parsed.limit(), 25);
        assert_eq!(parsed.offset(), 50);

        let defaults: PaginationParams = Form::parse("").unwrap();
        assert_eq!(defaults.page(), 1);
        assert_eq!(defaults.limit(), 10);
        assert_eq!(defaults.offset(), 0);
    }

    #[test]
    fn clamps_out_of_range_values() {
        let parsed: PaginationParams = Form::parse("page=0&limit=5000").unwrap();
        assert_eq!(parsed.page(), 1);
        assert_eq!(parsed.limit(), 100);

        let negative: PaginationParams = Form::parse("page=-2&limit=-1").unwrap();
        assert_eq!(negative.page(), 1);
        assert_eq!(negative.limit(), 1);
    }

    #[test]
    fn computes_total_pages() {
        let params: PaginationParams = Form::parse("limit=10").unwrap();
        assert_eq!(params.total_pages(0), 0);
        assert_eq!(params.total_pages(10), 1);
        assert_eq!(params.total_pages(11), 2);
    }
}
