//! In-memory store for testing the service layer without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use itertools::Itertools;
use time::OffsetDateTime;

use crate::domain::item::{Item, ItemPatch, NewItem};
use crate::domain::search::query::{fts5_query, NormalizedQuery};
use crate::domain::search::traits::{
    ItemRepository, Result, SearchError, SearchIndex, SearchLogRepository,
};
use crate::domain::search::types::{ListOrder, SearchFilters, SearchHits, SearchLogEntry};

/// Mock store backed by in-memory maps.
///
/// Keeps a separate "index" of projected text so index staleness behaves
/// like the real stores: items are only findable while indexed. The executor
/// call counter lets tests assert that degenerate queries never reach the
/// backend.
#[derive(Clone, Default)]
pub struct MockSearchStore {
    items: Arc<RwLock<HashMap<i64, Item>>>,
    index: Arc<RwLock<HashMap<i64, String>>>,
    categories: Arc<RwLock<HashMap<String, i64>>>,
    logs: Arc<RwLock<Vec<SearchLogEntry>>>,
    ranked_override: Arc<RwLock<Option<Vec<i64>>>>,
    next_id: Arc<AtomicI64>,
    search_calls: Arc<AtomicUsize>,
}

impl MockSearchStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.next_id.store(1, Ordering::SeqCst);
        store
    }

    /// Pin the executor's ranked id order for subsequent searches.
    pub fn set_ranked_ids(&self, ids: Vec<i64>) {
        *self.ranked_override.write().unwrap() = Some(ids);
    }

    /// Number of times the executor actually queried the index.
    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    /// Recorded telemetry entries.
    pub fn logged(&self) -> Vec<SearchLogEntry> {
        self.logs.read().unwrap().clone()
    }

    /// Backdate an item for listing-order tests.
    pub fn set_created_at(&self, id: i64, created_at: OffsetDateTime) {
        if let Some(item) = self.items.write().unwrap().get_mut(&id) {
            item.created_at = created_at;
        }
    }

    fn projection(item: &Item) -> String {
        format!("{} {} {}", item.title, item.description, item.content)
    }

    fn matches_filters(item: &Item, filters: &SearchFilters) -> bool {
        if !filters.item_types.is_empty() && !filters.item_types.contains(&item.item_type) {
            return false;
        }
        if !filters.categories.is_empty() {
            match item.category_id {
                Some(category) if filters.categories.contains(&category) => {}
                _ => return false,
            }
        }
        if !filters.tags.is_empty() {
            let matched = filters.tags.iter().any(|wanted| {
                let wanted = wanted.trim().to_lowercase();
                item.tags.iter().any(|tag| tag.contains(&wanted))
            });
            if !matched {
                return false;
            }
        }
        true
    }
}

fn unquote(term: &str) -> String {
    term.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(term)
        .replace("\"\"", "\"")
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .unique()
        .sorted()
        .collect()
}

#[async_trait]
impl SearchIndex for MockSearchStore {
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
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(ranked) = self.ranked_override.read().unwrap().as_ref() {
            let ids: Vec<i64> = ranked
                .iter()
                .copied()
                .skip(offset as usize)
                .take(limit as usize)
                .collect();
            return Ok(SearchHits {
                ids,
                total: ranked.len() as i64,
            });
        }

        let terms: Vec<String> = query
            .as_str()
            .split_whitespace()
            .map(|term| unquote(term).to_lowercase())
            .collect();

        let index = self.index.read().unwrap();
        let mut scored: Vec<(i64, usize)> = index
            .iter()
            .filter_map(|(id, text)| {
                let text = text.to_lowercase();
                if terms.iter().all(|term| text.contains(term)) {
                    let occurrences = terms.iter().map(|term| text.matches(term).count()).sum();
                    Some((*id, occurrences))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let total = scored.len() as i64;
        let ids: Vec<i64> = scored
            .into_iter()
            .map(|(id, _)| id)
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok(SearchHits { ids, total })
    }

    async fn index_on_insert(&self, item: &Item) -> Result<()> {
        self.index
            .write()
            .unwrap()
            .insert(item.id, Self::projection(item));
        Ok(())
    }

    async fn index_on_update(&self, item: &Item) -> Result<()> {
        let mut index = self.index.write().unwrap();
        index.remove(&item.id);
        index.insert(item.id, Self::projection(item));
        Ok(())
    }

    async fn index_on_delete(&self, id: i64) -> Result<()> {
        self.index.write().unwrap().remove(&id);
        Ok(())
    }

    async fn rebuild_all(&self) -> Result<u64> {
        let items = self.items.read().unwrap();
        let mut index = self.index.write().unwrap();
        index.clear();
        for (id, item) in items.iter() {
            index.insert(*id, Self::projection(item));
        }
        Ok(index.len() as u64)
    }
}

#[async_trait]
impl ItemRepository for MockSearchStore {
    async fn create_item(&self, item: &NewItem) -> Result<Item> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = OffsetDateTime::now_utc();
        let item = Item {
            id,
            title: item.title.clone(),
            description: item.description.clone(),
            content: item.content.clone(),
            item_type: item.item_type.clone(),
            category_id: item.category_id,
            tags: normalize_tags(&item.tags),
            view_count: 0,
            created_at: now,
            updated_at: now,
        };

        self.items.write().unwrap().insert(id, item.clone());
        self.index
            .write()
            .unwrap()
            .insert(id, Self::projection(&item));
        Ok(item)
    }

    async fn update_item(&self, id: i64, patch: &ItemPatch) -> Result<Item> {
        let mut items = self.items.write().unwrap();
        let item = items.get_mut(&id).ok_or(SearchError::NotFound(id))?;

        if let Some(title) = &patch.title {
            item.title = title.clone();
        }
        if let Some(description) = &patch.description {
            item.description = description.clone();
        }
        if let Some(content) = &patch.content {
            item.content = content.clone();
        }
        if let Some(item_type) = &patch.item_type {
            item.item_type = item_type.clone();
        }
        if let Some(category_id) = patch.category_id {
            item.category_id = category_id;
        }
        if let Some(tags) = &patch.tags {
            item.tags = normalize_tags(tags);
        }
        item.updated_at = OffsetDateTime::now_utc();

        let updated = item.clone();
        self.index
            .write()
            .unwrap()
            .insert(id, Self::projection(&updated));
        Ok(updated)
    }

    async fn delete_item(&self, id: i64) -> Result<bool> {
        let removed = self.items.write().unwrap().remove(&id).is_some();
        self.index.write().unwrap().remove(&id);
        Ok(removed)
    }

    async fn get_item(&self, id: i64) -> Result<Option<Item>> {
        Ok(self.items.read().unwrap().get(&id).cloned())
    }

    async fn create_category(&self, name: &str) -> Result<i64> {
        let mut categories = self.categories.write().unwrap();
        let next = categories.len() as i64 + 1;
        Ok(*categories.entry(name.to_string()).or_insert(next))
    }

    async fn record_view(&self, id: i64) -> Result<()> {
        if let Some(item) = self.items.write().unwrap().get_mut(&id) {
            item.view_count += 1;
        }
        Ok(())
    }

    async fn filter_ids(&self, ids: &[i64], filters: &SearchFilters) -> Result<Vec<i64>> {
        let items = self.items.read().unwrap();
        Ok(ids
            .iter()
            .copied()
            .filter(|id| {
                items
                    .get(id)
                    .is_some_and(|item| Self::matches_filters(item, filters))
            })
            .collect())
    }

    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<Item>> {
        let items = self.items.read().unwrap();
        Ok(ids.iter().filter_map(|id| items.get(id).cloned()).collect())
    }

    async fn list_items(
        &self,
        filters: &SearchFilters,
        within: Option<&[i64]>,
        order: ListOrder,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Item>, i64)> {
        let items = self.items.read().unwrap();
        let mut selected: Vec<Item> = items
            .values()
            .filter(|item| match within {
                Some(ids) => ids.contains(&item.id),
                None => true,
            })
            .filter(|item| Self::matches_filters(item, filters))
            .cloned()
            .collect();

        match order {
            ListOrder::Newest => selected.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ListOrder::MostViewed => selected.sort_by(|a, b| b.view_count.cmp(&a.view_count)),
        }

        let total = selected.len() as i64;
        let page: Vec<Item> = selected
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl SearchLogRepository for MockSearchStore {
    async fn insert_search_log(&self, entry: &SearchLogEntry) -> Result<()> {
        self.logs.write().unwrap().push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(title: &str) -> NewItem {
        NewItem {
            title: title.to_string(),
            item_type: "agent".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_get_delete_round_trip() {
        let store = MockSearchStore::new();
        let item = store.create_item(&widget("alpha")).await.unwrap();

        let fetched = store.get_item(item.id).await.unwrap();
        assert_eq!(fetched.unwrap().title, "alpha");

        assert!(store.delete_item(item.id).await.unwrap());
        assert!(store.get_item(item.id).await.unwrap().is_none());
        assert!(!store.delete_item(item.id).await.unwrap());
    }

    #[tokio::test]
    async fn search_counts_calls_and_skips_none() {
        let store = MockSearchStore::new();
        store.create_item(&widget("alpha widget")).await.unwrap();

        let hits = store.search(None, 10, 0).await.unwrap();
        assert_eq!(hits, SearchHits::default());
        assert_eq!(store.search_calls(), 0);

        let hits = store
            .search(store.normalize("widget").as_ref(), 10, 0)
            .await
            .unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(store.search_calls(), 1);
    }

    #[tokio::test]
    async fn ranked_override_windows() {
        let store = MockSearchStore::new();
        store.set_ranked_ids(vec![5, 3, 8, 1]);

        let hits = store
            .search(store.normalize("anything").as_ref(), 2, 1)
            .await
            .unwrap();
        assert_eq!(hits.ids, vec![3, 8]);
        assert_eq!(hits.total, 4);
    }

    #[tokio::test]
    async fn delete_unindexes_item() {
        let store = MockSearchStore::new();
        let item = store.create_item(&widget("vanishing trick")).await.unwrap();
        store.delete_item(item.id).await.unwrap();

        let hits = store
            .search(store.normalize("vanishing").as_ref(), 10, 0)
            .await
            .unwrap();
        assert_eq!(hits, SearchHits::default());
    }

    #[tokio::test]
    async fn rebuild_recovers_wiped_index() {
        let store = MockSearchStore::new();
        let item = store.create_item(&widget("phoenix")).await.unwrap();

        store.index_on_delete(item.id).await.unwrap();
        let hits = store
            .search(store.normalize("phoenix").as_ref(), 10, 0)
            .await
            .unwrap();
        assert_eq!(hits, SearchHits::default());

        assert_eq!(store.rebuild_all().await.unwrap(), 1);
        let hits = store
            .search(store.normalize("phoenix").as_ref(), 10, 0)
            .await
            .unwrap();
        assert_eq!(hits.ids, vec![item.id]);
    }
}
