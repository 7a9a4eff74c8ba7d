//! Marketplace item entity types.

use serde::Serialize;
use time::OffsetDateTime;

/// A marketplace item (agent, prompt, MCP server, workflow, doc).
///
/// The `items` table is the source of truth; the search index only holds a
/// derived projection of `title`, `description` and `content`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Markdown body.
    pub content: String,
    pub item_type: String,
    pub category_id: Option<i64>,
    /// Tag names, lowercased, sorted.
    pub tags: Vec<String>,
    pub view_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Payload for creating an item.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub title: String,
    pub description: String,
    pub content: String,
    pub item_type: String,
    pub category_id: Option<i64>,
    pub tags: Vec<String>,
}

/// Partial update of an item. `None` fields are left unchanged.
///
/// `category_id` is doubly optional: `Some(None)` clears the category.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub item_type: Option<String>,
    pub category_id: Option<Option<i64>>,
    pub tags: Option<Vec<String>>,
}
