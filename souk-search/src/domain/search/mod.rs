//! Full-text search over marketplace items, unified across two backends.
//!
//! Two interchangeable engines sit behind the same traits:
//!
//! - **SQLite FTS5**: an `items_fts` virtual table with BM25 ranking,
//!   maintained explicitly by the application (delete + reinsert).
//! - **PostgreSQL**: a trigger-maintained `tsvector` column queried with
//!   `to_tsquery` and ranked with `ts_rank`; the maintenance hooks are no-op
//!   passthroughs.
//!
//! # Architecture
//!
//! - [`fts5_query`] / [`tsquery`] - pure per-backend query normalizers
//! - [`SearchIndex`] - ranked execution plus index maintenance
//! - [`ItemRepository`] - entity persistence, filtering and hydration
//! - [`SearchService`] - composes the pieces: normalize, rank, apply
//!   secondary filters while preserving relevance order, paginate, hydrate
//! - [`SearchLogger`] - fire-and-forget telemetry through a bounded channel
//!
//! # Example
//!
//! ```ignore
//! use souk_search::{BackendStore, SearchRequest, SearchService};
//!
//! let store = Arc::new(BackendStore::connect(&settings.database).await?);
//! let service = SearchService::with_defaults(store);
//!
//! let page = service.search(&SearchRequest::new("python agent")).await?;
//! println!("{} of {} items", page.items.len(), page.total);
//! ```

mod query;
mod service;
mod telemetry;
mod traits;
mod types;

pub mod store;

pub use query::{fts5_query, tsquery, NormalizedQuery};
pub use service::{SearchConfig, SearchService};
pub use telemetry::{SearchLogger, DEFAULT_LOG_BUFFER};
pub use traits::{
    ItemRepository, Result, SearchError, SearchIndex, SearchLogRepository,
};
pub use types::{
    ListOrder, SearchFilters, SearchHits, SearchLogEntry, SearchPage, SearchRequest, SortOrder,
};
