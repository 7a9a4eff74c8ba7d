//! PostgreSQL store using native full-text search.
//!
//! The `items.search_vector` tsvector column is maintained by a database
//! trigger (see `migrations/postgres`), so the application-level index
//! maintenance hooks are no-op passthroughs; only `rebuild_all` issues a
//! statement, recomputing the vector for every row.

use std::collections::HashMap;

use async_trait::async_trait;
use itertools::Itertools;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;

use super::{ItemRow, ITEM_COLUMNS};
use crate::domain::item::{Item, ItemPatch, NewItem};
use crate::domain::search::query::{tsquery, NormalizedQuery};
use crate::domain::search::traits::{
    ItemRepository, Result, SearchError, SearchIndex, SearchLogRepository,
};
use crate::domain::search::types::{ListOrder, SearchFilters, SearchHits, SearchLogEntry};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgres");

const FILTER_CLAUSES: &str = "($1::text[] IS NULL OR item_type = ANY($1)) \
     AND ($2::bigint[] IS NULL OR category_id = ANY($2)) \
     AND ($3::text[] IS NULL OR EXISTS (\
         SELECT 1 FROM item_tags it JOIN tags t ON t.id = it.tag_id \
         WHERE it.item_id = items.id AND lower(t.name) LIKE ANY($3)))";

/// PostgreSQL-backed search store.
#[derive(Clone)]
pub struct PgSearchStore {
    pool: PgPool,
}

impl PgSearchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date.
    pub async fn connect(options: PgConnectOptions) -> Result<Self> {
        let pool = PgPoolOptions::new().connect_with(options).await?;
        let store = Self::new(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_tags(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT it.item_id, t.name FROM item_tags it \
             JOIN tags t ON t.id = it.tag_id WHERE it.item_id = ANY($1) ORDER BY t.name",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().into_group_map())
    }

    async fn hydrate(&self, rows: Vec<ItemRow>) -> Result<Vec<Item>> {
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut tags = self.load_tags(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let item_tags = tags.remove(&row.id).unwrap_or_default();
                row.into_item(item_tags)
            })
            .collect())
    }
}

/// Replace the tag set of an item, creating missing tags on the fly.
async fn replace_tags(
    conn: &mut PgConnection,
    item_id: i64,
    tags: &[String],
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM item_tags WHERE item_id = $1")
        .bind(item_id)
        .execute(&mut *conn)
        .await?;

    let names: Vec<String> = tags
        .iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .unique()
        .collect();

    for name in &names {
        sqlx::query("INSERT INTO tags (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "INSERT INTO item_tags (item_id, tag_id) SELECT $1, id FROM tags WHERE name = $2",
        )
        .bind(item_id)
        .bind(name)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Bind-ready filter values: `None` disables a dimension in SQL.
fn filter_binds(
    filters: &SearchFilters,
) -> (Option<Vec<String>>, Option<Vec<i64>>, Option<Vec<String>>) {
    let item_types = (!filters.item_types.is_empty()).then(|| filters.item_types.clone());
    let categories = (!filters.categories.is_empty()).then(|| filters.categories.clone());
    let tag_patterns = (!filters.tags.is_empty()).then(|| {
        filters
            .tags
            .iter()
            .map(|tag| format!("%{}%", tag.trim().to_lowercase()))
            .collect()
    });
    (item_types, categories, tag_patterns)
}

#[async_trait]
impl SearchIndex for PgSearchStore {
    fn normalize(&self, raw: &str) -> Option<NormalizedQuery> {
        tsquery(raw)
    }

    async fn search(
        &self,
        query: Option<&NormalizedQuery>,
        limit: i64,
        offset: i64,
    ) -> Result<SearchHits> {
        let Some(query) = query else {
            return Ok(SearchHits::default());
        };

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM items WHERE search_vector @@ to_tsquery('english', $1)",
        )
        .bind(query.as_str())
        .fetch_one(&self.pool)
        .await?;

        if total == 0 {
            return Ok(SearchHits::default());
        }

        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM items WHERE search_vector @@ to_tsquery('english', $1) \
             ORDER BY ts_rank(search_vector, to_tsquery('english', $1)) DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(query.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(SearchHits { ids, total })
    }

    /// No-op: the trigger computes `search_vector` on insert.
    async fn index_on_insert(&self, _item: &Item) -> Result<()> {
        Ok(())
    }

    /// No-op: the trigger recomputes `search_vector` on update.
    async fn index_on_update(&self, _item: &Item) -> Result<()> {
        Ok(())
    }

    /// No-op: deleting the row removes its vector with it.
    async fn index_on_delete(&self, _id: i64) -> Result<()> {
        Ok(())
    }

    async fn rebuild_all(&self) -> Result<u64> {
        let updated = sqlx::query(
            "UPDATE items SET search_vector = to_tsvector('english', \
             coalesce(title, '') || ' ' || coalesce(description, '') || ' ' || coalesce(content, ''))",
        )
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }
}

#[async_trait]
impl ItemRepository for PgSearchStore {
    async fn create_item(&self, item: &NewItem) -> Result<Item> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO items (title, description, content, item_type, category_id, view_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 0, $6, $7) RETURNING id",
        )
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.content)
        .bind(&item.item_type)
        .bind(item.category_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        replace_tags(&mut tx, id, &item.tags).await?;
        tx.commit().await?;

        self.get_item(id).await?.ok_or(SearchError::NotFound(id))
    }

    async fn update_item(&self, id: i64, patch: &ItemPatch) -> Result<Item> {
        let current = self.get_item(id).await?.ok_or(SearchError::NotFound(id))?;

        let title = patch.title.clone().unwrap_or(current.title);
        let description = patch.description.clone().unwrap_or(current.description);
        let content = patch.content.clone().unwrap_or(current.content);
        let item_type = patch.item_type.clone().unwrap_or(current.item_type);
        let category_id = match patch.category_id {
            Some(value) => value,
            None => current.category_id,
        };
        let now = OffsetDateTime::now_utc();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE items SET title = $1, description = $2, content = $3, item_type = $4, \
             category_id = $5, updated_at = $6 WHERE id = $7",
        )
        .bind(&title)
        .bind(&description)
        .bind(&content)
        .bind(&item_type)
        .bind(category_id)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if let Some(tags) = &patch.tags {
            replace_tags(&mut tx, id, tags).await?;
        }

        tx.commit().await?;

        self.get_item(id).await?.ok_or(SearchError::NotFound(id))
    }

    async fn delete_item(&self, id: i64) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected()
            > 0;
        Ok(deleted)
    }

    async fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1");
        let row: Option<ItemRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let mut tags = self.load_tags(&[row.id]).await?;
                let item_tags = tags.remove(&row.id).unwrap_or_default();
                Ok(Some(row.into_item(item_tags)))
            }
            None => Ok(None),
        }
    }

    async fn create_category(&self, name: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO categories (name) VALUES ($1) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name RETURNING id",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn record_view(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE items SET view_count = view_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn filter_ids(&self, ids: &[i64], filters: &SearchFilters) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let (item_types, categories, tag_patterns) = filter_binds(filters);
        let sql = format!("SELECT id FROM items WHERE {FILTER_CLAUSES} AND id = ANY($4)");
        let kept: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(item_types)
            .bind(categories)
            .bind(tag_patterns)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(kept)
    }

    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<Item>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ANY($1)");
        let rows: Vec<ItemRow> = sqlx::query_as(&sql).bind(ids).fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn list_items(
        &self,
        filters: &SearchFilters,
        within: Option<&[i64]>,
        order: ListOrder,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Item>, i64)> {
        if let Some(ids) = within {
            if ids.is_empty() {
                return Ok((Vec::new(), 0));
            }
        }

        let (item_types, categories, tag_patterns) = filter_binds(filters);
        let within = within.map(|ids| ids.to_vec());

        let count_sql = format!(
            "SELECT COUNT(*) FROM items WHERE {FILTER_CLAUSES} \
             AND ($4::bigint[] IS NULL OR id = ANY($4))"
        );
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&item_types)
            .bind(&categories)
            .bind(&tag_patterns)
            .bind(&within)
            .fetch_one(&self.pool)
            .await?;

        if total == 0 {
            return Ok((Vec::new(), 0));
        }

        let order_clause = match order {
            ListOrder::Newest => "created_at DESC",
            ListOrder::MostViewed => "view_count DESC",
        };
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items \
             WHERE {FILTER_CLAUSES} AND ($4::bigint[] IS NULL OR id = ANY($4)) \
             ORDER BY {order_clause} LIMIT $5 OFFSET $6"
        );
        let rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(&item_types)
            .bind(&categories)
            .bind(&tag_patterns)
            .bind(&within)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let items = self.hydrate(rows).await?;
        Ok((items, total))
    }
}

#[async_trait]
impl SearchLogRepository for PgSearchStore {
    async fn insert_search_log(&self, entry: &SearchLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO search_logs (query, result_count, source, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&entry.query)
        .bind(entry.result_count)
        .bind(&entry.source)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
