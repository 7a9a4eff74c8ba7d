//! Core types for the search domain.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::domain::item::Item;

/// Sort order requested by the caller.
///
/// `Relevance` only applies when query text is present; without a query the
/// service falls back to `Date` ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Relevance,
    Date,
    Views,
}

/// Explicit ordering for the unranked listing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    /// `created_at` descending.
    Newest,
    /// `view_count` descending.
    MostViewed,
}

/// Secondary filters applied on top of the text-match dimension.
///
/// Empty vectors mean "no constraint". Filters combine with AND between
/// dimensions; values within one dimension combine with OR. Tag filters
/// match tag names case-insensitively as substrings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub item_types: Vec<String>,
    pub categories: Vec<i64>,
    pub tags: Vec<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.item_types.is_empty() && self.categories.is_empty() && self.tags.is_empty()
    }
}

/// A search request from the route-handling collaborator.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub filters: SearchFilters,
    pub sort: SortOrder,
    /// 1-indexed page number.
    pub page: i64,
    /// Page size; `None` uses the configured default, values are clamped to
    /// the configured maximum.
    pub limit: Option<i64>,
    /// Source tag recorded in search telemetry.
    pub source: String,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            filters: SearchFilters::default(),
            sort: SortOrder::default(),
            page: 1,
            limit: None,
            source: "web".to_string(),
        }
    }
}

/// Ranked identifiers plus total match count from the search executor.
///
/// `total` reflects all matches, not just the fetched window. Ephemeral,
/// recomputed per request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub ids: Vec<i64>,
    pub total: i64,
}

/// One hydrated page of results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub items: Vec<Item>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

impl SearchPage {
    pub(crate) fn empty(page: i64, limit: i64) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page,
            limit,
        }
    }
}

/// Append-only telemetry record for one executed search.
///
/// Never read by the search path itself.
#[derive(Debug, Clone)]
pub struct SearchLogEntry {
    pub query: String,
    pub result_count: i64,
    pub source: String,
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_order_parses_case_insensitively() {
        assert_eq!("relevance".parse::<SortOrder>(), Ok(SortOrder::Relevance));
        assert_eq!("Date".parse::<SortOrder>(), Ok(SortOrder::Date));
        assert_eq!("VIEWS".parse::<SortOrder>(), Ok(SortOrder::Views));
        assert!("rank".parse::<SortOrder>().is_err());
    }

    #[test]
    fn filters_emptiness() {
        assert!(SearchFilters::default().is_empty());

        let filters = SearchFilters {
            item_types: vec!["agent".to_string()],
            ..Default::default()
        };
        assert!(!filters.is_empty());
    }

    #[test]
    fn request_defaults() {
        let request = SearchRequest::new("python");
        assert_eq!(request.query, "python");
        assert_eq!(request.page, 1);
        assert_eq!(request.limit, None);
        assert_eq!(request.sort, SortOrder::Relevance);
        assert_eq!(request.source, "web");
    }

    #[test]
    fn search_page_serializes_timestamps_as_rfc3339() {
        let item = Item {
            id: 7,
            title: "Python Tutorial".to_string(),
            description: "intro".to_string(),
            content: "body".to_string(),
            item_type: "doc".to_string(),
            category_id: None,
            tags: vec!["python".to_string()],
            view_count: 3,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };
        let page = SearchPage {
            items: vec![item],
            total: 1,
            page: 1,
            limit: 20,
        };

        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["items"][0]["id"], 7);
        assert_eq!(json["items"][0]["created_at"], "1970-01-01T00:00:00Z");
    }
}
