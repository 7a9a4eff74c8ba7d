//! Trait definitions for the search domain.
//!
//! The two backend variants (SQLite FTS5 and PostgreSQL tsvector) implement
//! the same traits, so callers never need to know which one is active.

use async_trait::async_trait;

use super::query::NormalizedQuery;
use super::types::{ListOrder, SearchFilters, SearchHits, SearchLogEntry};
use crate::domain::item::{Item, ItemPatch, NewItem};

/// Error type for search operations.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("item not found: {0}")]
    NotFound(i64),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;

/// Full-text index capability: query normalization, ranked execution and
/// index maintenance, unified across backends.
///
/// Read-path errors (`search`) surface to the caller. Write-path index
/// failures are expected to be logged and swallowed by callers so that the
/// entity table, which is the source of truth, stays available; `rebuild_all`
/// recovers the index from it at any time.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Convert raw user text into this backend's query expression.
    ///
    /// Returns `None` for empty or degenerate input, which means "no search
    /// constraint" rather than an error.
    fn normalize(&self, raw: &str) -> Option<NormalizedQuery>;

    /// Execute a ranked query, most relevant first.
    ///
    /// `None` input returns `(vec![], 0)` without touching the backend. A
    /// zero match count skips the ranked fetch entirely. `total` counts all
    /// matches, independent of the `limit`/`offset` window.
    async fn search(
        &self,
        query: Option<&NormalizedQuery>,
        limit: i64,
        offset: i64,
    ) -> Result<SearchHits>;

    /// Add a freshly created item to the index.
    async fn index_on_insert(&self, item: &Item) -> Result<()>;

    /// Replace an item's index entry (full delete + reinsert, never a
    /// partial field patch).
    async fn index_on_update(&self, item: &Item) -> Result<()>;

    /// Remove an item from the index. Idempotent.
    async fn index_on_delete(&self, id: i64) -> Result<()>;

    /// Clear the index and repopulate it from the `items` table.
    ///
    /// Idempotent and safe to re-invoke after a partial failure. Returns the
    /// number of indexed rows.
    async fn rebuild_all(&self) -> Result<u64>;
}

/// Entity persistence and hydration for marketplace items.
///
/// Write operations invoke index maintenance around their own commit, so the
/// index never lags the entity table by more than one committed write.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn create_item(&self, item: &NewItem) -> Result<Item>;

    async fn update_item(&self, id: i64, patch: &ItemPatch) -> Result<Item>;

    /// Returns true if an item was deleted.
    async fn delete_item(&self, id: i64) -> Result<bool>;

    async fn get_item(&self, id: i64) -> Result<Option<Item>>;

    async fn create_category(&self, name: &str) -> Result<i64>;

    /// Bump the popularity counter backing the "views" sort.
    async fn record_view(&self, id: i64) -> Result<()>;

    /// Return the subset of `ids` that passes `filters`, in no particular
    /// order.
    async fn filter_ids(&self, ids: &[i64], filters: &SearchFilters) -> Result<Vec<i64>>;

    /// Hydrate full items for `ids`, in no particular order.
    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<Item>>;

    /// Unranked listing with filters and an optional id constraint.
    ///
    /// Returns the page window and the total count after filtering.
    async fn list_items(
        &self,
        filters: &SearchFilters,
        within: Option<&[i64]>,
        order: ListOrder,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Item>, i64)>;
}

/// Append-only sink for search telemetry.
#[async_trait]
pub trait SearchLogRepository: Send + Sync {
    async fn insert_search_log(&self, entry: &SearchLogEntry) -> Result<()>;
}
