//! Search store implementations.

use async_trait::async_trait;
use time::OffsetDateTime;

#[cfg(test)]
mod mock;
mod postgres;
mod sqlite;

#[cfg(test)]
pub use mock::MockSearchStore;
pub use postgres::PgSearchStore;
pub use sqlite::SqliteSearchStore;

use super::query::NormalizedQuery;
use super::traits::{ItemRepository, Result, SearchIndex, SearchLogRepository};
use super::types::{ListOrder, SearchFilters, SearchHits, SearchLogEntry};
use crate::config::{DatabaseSettings, SearchBackend};
use crate::domain::item::{Item, ItemPatch, NewItem};

pub(crate) const ITEM_COLUMNS: &str =
    "id, title, description, content, item_type, category_id, view_count, created_at, updated_at";

/// Row mapping shared by both SQL backends; tags are hydrated separately.
#[derive(sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub content: String,
    pub item_type: String,
    pub category_id: Option<i64>,
    pub view_count: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ItemRow {
    pub(crate) fn into_item(self, tags: Vec<String>) -> Item {
        Item {
            id: self.id,
            title: self.title,
            description: self.description,
            content: self.content,
            item_type: self.item_type,
            category_id: self.category_id,
            tags,
            view_count: self.view_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Store variant selected once at process start from configuration.
///
/// Callers hold a single `BackendStore` and never branch on the active
/// engine again; there is no per-request switching.
pub enum BackendStore {
    Sqlite(SqliteSearchStore),
    Postgres(PgSearchStore),
}

impl BackendStore {
    /// Connect the configured backend and bring its schema up to date.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        match settings.backend {
            SearchBackend::Sqlite => Ok(Self::Sqlite(
                SqliteSearchStore::connect(settings.sqlite()).await?,
            )),
            SearchBackend::Postgres => {
                Ok(Self::Postgres(PgSearchStore::connect(settings.with_db()).await?))
            }
        }
    }
}

#[async_trait]
impl SearchIndex for BackendStore {
    fn normalize(&self, raw: &str) -> Option<NormalizedQuery> {
        match self {
            Self::Sqlite(store) => store.normalize(raw),
            Self::Postgres(store) => store.normalize(raw),
        }
    }

    async fn search(
        &self,
        query: Option<&NormalizedQuery>,
        limit: i64,
        offset: i64,
    ) -> Result<SearchHits> {
        match self {
            Self::Sqlite(store) => store.search(query, limit, offset).await,
            Self::Postgres(store) => store.search(query, limit, offset).await,
        }
    }

    async fn index_on_insert(&self, item: &Item) -> Result<()> {
        match self {
            Self::Sqlite(store) => store.index_on_insert(item).await,
            Self::Postgres(store) => store.index_on_insert(item).await,
        }
    }

    async fn index_on_update(&self, item: &Item) -> Result<()> {
        match self {
            Self::Sqlite(store) => store.index_on_update(item).await,
            Self::Postgres(store) => store.index_on_update(item).await,
        }
    }

    async fn index_on_delete(&self, id: i64) -> Result<()> {
        match self {
            Self::Sqlite(store) => store.index_on_delete(id).await,
            Self::Postgres(store) => store.index_on_delete(id).await,
        }
    }

    async fn rebuild_all(&self) -> Result<u64> {
        match self {
            Self::Sqlite(store) => store.rebuild_all().await,
            Self::Postgres(store) => store.rebuild_all().await,
        }
    }
}

#[async_trait]
impl ItemRepository for BackendStore {
    async fn create_item(&self, item: &NewItem) -> Result<Item> {
        match self {
            Self::Sqlite(store) => store.create_item(item).await,
            Self::Postgres(store) => store.create_item(item).await,
        }
    }

    async fn update_item(&self, id: i64, patch: &ItemPatch) -> Result<Item> {
        match self {
            Self::Sqlite(store) => store.update_item(id, patch).await,
            Self::Postgres(store) => store.update_item(id, patch).await,
        }
    }

    async fn delete_item(&self, id: i64) -> Result<bool> {
        match self {
            Self::Sqlite(store) => store.delete_item(id).await,
            Self::Postgres(store) => store.delete_item(id).await,
        }
    }

    async fn get_item(&self, id: i64) -> Result<Option<Item>> {
        match self {
            Self::Sqlite(store) => store.get_item(id).await,
            Self::Postgres(store) => store.get_item(id).await,
        }
    }

    async fn create_category(&self, name: &str) -> Result<i64> {
        match self {
            Self::Sqlite(store) => store.create_category(name).await,
            Self::Postgres(store) => store.create_category(name).await,
        }
    }

    async fn record_view(&self, id: i64) -> Result<()> {
        match self {
            Self::Sqlite(store) => store.record_view(id).await,
            Self::Postgres(store) => store.record_view(id).await,
        }
    }

    async fn filter_ids(&self, ids: &[i64], filters: &SearchFilters) -> Result<Vec<i64>> {
        match self {
            Self::Sqlite(store) => store.filter_ids(ids, filters).await,
            Self::Postgres(store) => store.filter_ids(ids, filters).await,
        }
    }

    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<Item>> {
        match self {
            Self::Sqlite(store) => store.fetch_by_ids(ids).await,
            Self::Postgres(store) => store.fetch_by_ids(ids).await,
        }
    }

    async fn list_items(
        &self,
        filters: &SearchFilters,
        within: Option<&[i64]>,
        order: ListOrder,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Item>, i64)> {
        match self {
            Self::Sqlite(store) => store.list_items(filters, within, order, limit, offset).await,
            Self::Postgres(store) => store.list_items(filters, within, order, limit, offset).await,
        }
    }
}

#[async_trait]
impl SearchLogRepository for BackendStore {
    async fn insert_search_log(&self, entry: &SearchLogEntry) -> Result<()> {
        match self {
            Self::Sqlite(store) => store.insert_search_log(entry).await,
            Self::Postgres(store) => store.insert_search_log(entry).await,
        }
    }
}
