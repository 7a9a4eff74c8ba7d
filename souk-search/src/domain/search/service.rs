//! Search service composing normalization, ranked execution, secondary
//! filtering and pagination.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;

use super::telemetry::SearchLogger;
use super::traits::{ItemRepository, Result, SearchIndex};
use super::types::{ListOrder, SearchFilters, SearchPage, SearchRequest, SortOrder};

/// Configuration for the search service.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Page size used when the request does not specify one.
    pub default_limit: i64,
    /// Upper bound on the requested page size.
    pub max_limit: i64,
    /// How many ranked candidates to pull from the executor before secondary
    /// filters and pagination are applied.
    pub max_candidates: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            max_candidates: 1000,
        }
    }
}

/// Search service over one backend store.
///
/// The store is selected once at startup; both backend variants implement
/// the same traits, so this type never branches on the active engine.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(SqliteSearchStore::connect(options).await?);
/// let service = SearchService::with_defaults(store);
///
/// let page = service.search(&SearchRequest::new("python agent")).await?;
/// ```
pub struct SearchService<S>
where
    S: SearchIndex + ItemRepository,
{
    store: Arc<S>,
    logger: Option<SearchLogger>,
    config: SearchConfig,
}

impl<S> SearchService<S>
where
    S: SearchIndex + ItemRepository,
{
    pub fn new(store: Arc<S>, config: SearchConfig) -> Self {
        Self {
            store,
            logger: None,
            config,
        }
    }

    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, SearchConfig::default())
    }

    /// Attach a telemetry logger. Searches with query text are recorded
    /// fire-and-forget; listing requests are not.
    pub fn with_logger(mut self, logger: SearchLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Execute a search request.
    ///
    /// With query text and `Relevance` sort, the ranked path runs: the
    /// executor returns an ordered candidate id list, secondary filters
    /// reduce it, and the final page preserves the original relevance order
    /// via each surviving id's rank position. Every other combination takes
    /// the listing path with explicit sort keys.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchPage> {
        let limit = request
            .limit
            .unwrap_or(self.config.default_limit)
            .min(self.config.max_limit)
            .max(1);
        let page = request.page.max(1);
        let offset = (page - 1) * limit;

        let raw = request.query.trim();

        let result = if !raw.is_empty() && request.sort == SortOrder::Relevance {
            self.ranked(raw, &request.filters, page, limit, offset).await
        } else {
            self.listing(raw, request, page, limit, offset).await
        }?;

        if !raw.is_empty() {
            if let Some(logger) = &self.logger {
                logger.record(raw, result.total, &request.source);
            }
        }

        Ok(result)
    }

    /// Rebuild the search index from the entity table.
    pub async fn rebuild_index(&self) -> Result<u64> {
        self.store.rebuild_all().await
    }

    async fn ranked(
        &self,
        raw: &str,
        filters: &SearchFilters,
        page: i64,
        limit: i64,
        offset: i64,
    ) -> Result<SearchPage> {
        let normalized = self.store.normalize(raw);
        let hits = self
            .store
            .search(normalized.as_ref(), self.config.max_candidates, 0)
            .await?;

        if hits.ids.is_empty() {
            return Ok(SearchPage::empty(page, limit));
        }

        let surviving: Vec<i64> = if filters.is_empty() {
            hits.ids
        } else {
            let kept: HashSet<i64> = self
                .store
                .filter_ids(&hits.ids, filters)
                .await?
                .into_iter()
                .collect();
            hits.ids
                .into_iter()
                .filter(|id| kept.contains(id))
                .collect()
        };

        let total = surviving.len() as i64;
        let window: Vec<i64> = surviving
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        if window.is_empty() {
            return Ok(SearchPage {
                items: Vec::new(),
                total,
                page,
                limit,
            });
        }

        let position: HashMap<i64, usize> = window
            .iter()
            .enumerate()
            .map(|(idx, id)| (*id, idx))
            .collect();

        let mut items = self.store.fetch_by_ids(&window).await?;
        items.sort_by_key(|item| position.get(&item.id).copied().unwrap_or(usize::MAX));

        Ok(SearchPage {
            items,
            total,
            page,
            limit,
        })
    }

    async fn listing(
        &self,
        raw: &str,
        request: &SearchRequest,
        page: i64,
        limit: i64,
        offset: i64,
    ) -> Result<SearchPage> {
        // A non-relevance sort still honours the query text by constraining
        // the listing to matching ids.
        let within = if raw.is_empty() {
            None
        } else {
            let normalized = self.store.normalize(raw);
            let hits = self
                .store
                .search(normalized.as_ref(), self.config.max_candidates, 0)
                .await?;
            if hits.ids.is_empty() {
                return Ok(SearchPage::empty(page, limit));
            }
            Some(hits.ids)
        };

        let order = match request.sort {
            SortOrder::Views => ListOrder::MostViewed,
            _ => ListOrder::Newest,
        };

        let (items, total) = self
            .store
            .list_items(&request.filters, within.as_deref(), order, limit, offset)
            .await?;

        Ok(SearchPage {
            items,
            total,
            page,
            limit,
        })
    }
}
