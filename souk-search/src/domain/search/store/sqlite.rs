//! SQLite store backed by an FTS5 index with explicit, application-level
//! index maintenance.
//!
//! The `items` table is the source of truth; `items_fts` holds the derived
//! text projection keyed by rowid = item id. Entity writes and their index
//! statements run in one transaction, and a failed index statement is logged
//! without aborting the entity write (`rebuild_all` recovers the index).

use std::collections::HashMap;

use async_trait::async_trait;
use itertools::Itertools;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use time::OffsetDateTime;
use tracing::warn;

use super::{ItemRow, ITEM_COLUMNS};
use crate::domain::item::{Item, ItemPatch, NewItem};
use crate::domain::search::query::{fts5_query, NormalizedQuery};
use crate::domain::search::traits::{
    ItemRepository, Result, SearchError, SearchIndex, SearchLogRepository,
};
use crate::domain::search::types::{ListOrder, SearchFilters, SearchHits, SearchLogEntry};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// SQLite-backed search store.
#[derive(Clone)]
pub struct SqliteSearchStore {
    pool: SqlitePool,
}

impl SqliteSearchStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database and bring the schema up to date.
    ///
    /// A single pooled connection is enough here: SQLite serializes writers
    /// anyway, and it keeps `:memory:` databases coherent across calls.
    pub async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.create_if_missing(true).foreign_keys(true))
            .await?;

        let store = Self::new(pool);
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_tags(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT it.item_id, t.name FROM item_tags it \
             JOIN tags t ON t.id = it.tag_id WHERE it.item_id IN (",
        );
        {
            let mut sep = qb.separated(", ");
            for id in ids {
                sep.push_bind(*id);
            }
        }
        qb.push(") ORDER BY t.name");

        let rows: Vec<(i64, String)> = qb.build_query_as().fetch_all(&self.pool).await?;
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

async fn fts_insert(
    conn: &mut SqliteConnection,
    id: i64,
    title: &str,
    description: &str,
    content: &str,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO items_fts (rowid, title, description, content) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(content)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn fts_delete(conn: &mut SqliteConnection, id: i64) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM items_fts WHERE rowid = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn fts_replace(
    conn: &mut SqliteConnection,
    id: i64,
    title: &str,
    description: &str,
    content: &str,
) -> std::result::Result<(), sqlx::Error> {
    fts_delete(conn, id).await?;
    fts_insert(conn, id, title, description, content).await
}

/// Replace the tag set of an item, creating missing tags on the fly.
async fn replace_tags(
    conn: &mut SqliteConnection,
    item_id: i64,
    tags: &[String],
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM item_tags WHERE item_id = ?")
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
        sqlx::query("INSERT INTO tags (name) VALUES (?) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&mut *conn)
            .await?;
        sqlx::query("INSERT INTO item_tags (item_id, tag_id) SELECT ?, id FROM tags WHERE name = ?")
            .bind(item_id)
            .bind(name)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

fn filtered_query<'a>(
    select: &str,
    within: Option<&[i64]>,
    filters: &SearchFilters,
) -> QueryBuilder<'a, Sqlite> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {select} FROM items WHERE 1=1"));

    if let Some(ids) = within {
        qb.push(" AND id IN (");
        {
            let mut sep = qb.separated(", ");
            for id in ids {
                sep.push_bind(*id);
            }
        }
        qb.push(")");
    }

    push_filters(&mut qb, filters);
    qb
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filters: &SearchFilters) {
    if !filters.item_types.is_empty() {
        qb.push(" AND item_type IN (");
        {
            let mut sep = qb.separated(", ");
            for item_type in &filters.item_types {
                sep.push_bind(item_type.clone());
            }
        }
        qb.push(")");
    }

    if !filters.categories.is_empty() {
        qb.push(" AND category_id IN (");
        {
            let mut sep = qb.separated(", ");
            for category in &filters.categories {
                sep.push_bind(*category);
            }
        }
        qb.push(")");
    }

    if !filters.tags.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM item_tags it JOIN tags t ON t.id = it.tag_id \
             WHERE it.item_id = items.id AND (",
        );
        for (i, tag) in filters.tags.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push("lower(t.name) LIKE ");
            qb.push_bind(format!("%{}%", tag.trim().to_lowercase()));
        }
        qb.push("))");
    }
}

#[async_trait]
impl SearchIndex for SqliteSearchStore {
    fn normalize(&self, raw: &str) -> Option<NormalizedQuery> {
        fts5_query(raw)
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

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items_fts WHERE items_fts MATCH ?")
            .bind(query.as_str())
            .fetch_one(&self.pool)
            .await?;

        if total == 0 {
            return Ok(SearchHits::default());
        }

        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT rowid FROM items_fts WHERE items_fts MATCH ? \
             ORDER BY bm25(items_fts) ASC LIMIT ? OFFSET ?",
        )
        .bind(query.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(SearchHits { ids, total })
    }

    async fn index_on_insert(&self, item: &Item) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        fts_insert(&mut conn, item.id, &item.title, &item.description, &item.content).await?;
        Ok(())
    }

    async fn index_on_update(&self, item: &Item) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        fts_replace(&mut tx, item.id, &item.title, &item.description, &item.content).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn index_on_delete(&self, id: i64) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        fts_delete(&mut conn, id).await?;
        Ok(())
    }

    async fn rebuild_all(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM items_fts").execute(&mut *tx).await?;
        let indexed = sqlx::query(
            "INSERT INTO items_fts (rowid, title, description, content) \
             SELECT id, title, description, content FROM items",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        Ok(indexed)
    }
}

#[async_trait]
impl ItemRepository for SqliteSearchStore {
    async fn create_item(&self, item: &NewItem) -> Result<Item> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO items (title, description, content, item_type, category_id, view_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, 0, ?, ?) RETURNING id",
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

        if let Err(err) = fts_insert(&mut tx, id, &item.title, &item.description, &item.content).await
        {
            warn!(item_id = id, error = %err, "failed to index new item, index stale until rebuild");
        }

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
            "UPDATE items SET title = ?, description = ?, content = ?, item_type = ?, \
             category_id = ?, updated_at = ? WHERE id = ?",
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

        if let Err(err) = fts_replace(&mut tx, id, &title, &description, &content).await {
            warn!(item_id = id, error = %err, "failed to reindex item, index stale until rebuild");
        }

        tx.commit().await?;

        self.get_item(id).await?.ok_or(SearchError::NotFound(id))
    }

    async fn delete_item(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM item_tags WHERE item_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if let Err(err) = fts_delete(&mut tx, id).await {
            warn!(item_id = id, error = %err, "failed to remove item from index, index stale until rebuild");
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn get_item(&self, id: i64) -> Result<Option<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?");
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
            "INSERT INTO categories (name) VALUES (?) \
             ON CONFLICT (name) DO UPDATE SET name = excluded.name RETURNING id",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn record_view(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE items SET view_count = view_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn filter_ids(&self, ids: &[i64], filters: &SearchFilters) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = filtered_query("id", Some(ids), filters);
        let kept: Vec<i64> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(kept)
    }

    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<Item>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = filtered_query(ITEM_COLUMNS, Some(ids), &SearchFilters::default());
        let rows: Vec<ItemRow> = qb.build_query_as().fetch_all(&self.pool).await?;
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

        let mut count_qb = filtered_query("COUNT(*)", within, filters);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;
        if total == 0 {
            return Ok((Vec::new(), 0));
        }

        let mut qb = filtered_query(ITEM_COLUMNS, within, filters);
        qb.push(match order {
            ListOrder::Newest => " ORDER BY created_at DESC",
            ListOrder::MostViewed => " ORDER BY view_count DESC",
        });
        qb.push(" LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows: Vec<ItemRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let items = self.hydrate(rows).await?;
        Ok((items, total))
    }
}

#[async_trait]
impl SearchLogRepository for SqliteSearchStore {
    async fn insert_search_log(&self, entry: &SearchLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO search_logs (query, result_count, source, created_at) VALUES (?, ?, ?, ?)",
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
