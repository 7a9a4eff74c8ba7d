//! # souk-search
//!
//! Search core of the Souk marketplace: full-text search with relevance
//! ranking over marketplace items, unified across an embedded engine
//! (SQLite FTS5) and native PostgreSQL text search, plus the index
//! maintenance and telemetry that keep it honest.
//!
//! The crate is a library invoked in-process by the route-handling layer; it
//! owns no wire protocol and no CLI. Callers pick a backend once at startup
//! via [`config::SearchBackend`], connect a [`BackendStore`], and talk to a
//! [`SearchService`] from then on.

pub mod config;
pub mod domain;

pub use config::{read_config, SearchBackend, Settings};
pub use domain::item::{Item, ItemPatch, NewItem};
pub use domain::search::store::{BackendStore, PgSearchStore, SqliteSearchStore};
pub use domain::search::{
    ItemRepository, NormalizedQuery, SearchConfig, SearchError, SearchFilters, SearchIndex,
    SearchLogRepository, SearchLogger, SearchPage, SearchRequest, SearchService, SortOrder,
};
