use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Identifier of a displayable record. Remote sources use numbers, routes and
/// hand-written records may carry strings; both are kept as received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum ItemId {
    Number(i64),
    Text(String),
}

impl ItemId {
    pub fn is_blank(&self) -> bool {
        matches!(self, ItemId::Text(text) if text.trim().is_empty())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Number(n) => f.pad(&n.to_string()),
            ItemId::Text(s) => f.pad(s),
        }
    }
}

impl From<i64> for ItemId {
    fn from(value: i64) -> Self {
        ItemId::Number(value)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        value
            .parse::<i64>()
            .map(ItemId::Number)
            .unwrap_or_else(|_| ItemId::Text(value.to_owned()))
    }
}

/// A record as delivered by the data source. Attributes beyond `id` and
/// `title` are carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    pub fn new(id: impl Into<ItemId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            extra: Map::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_blank() {
            return Err(ValidationError::MissingId);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FavoriteRecord {
    #[serde(flatten)]
    pub item: Item,
    pub comment: String,
}

impl FavoriteRecord {
    /// An incoming `comment` attribute on `item` is replaced by `comment`;
    /// the record serializes with exactly one `comment` key.
    pub fn new(mut item: Item, comment: impl Into<String>) -> Self {
        item.extra.remove("comment");
        Self {
            item,
            comment: comment.into(),
        }
    }

    pub fn id(&self) -> &ItemId {
        &self.item.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    pub page_number: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CastMember {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrewMember {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub job: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Credits {
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

/// Everything the detail view of one movie shows.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieDetail {
    pub movie: Item,
    pub credits: Credits,
    pub recommendations: Vec<Item>,
}

/// What a paginated list is resolved against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ListKey {
    Category(String),
    Genre(String),
    Search(String),
}

impl fmt::Display for ListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListKey::Category(c) => write!(f, "category:{c}"),
            ListKey::Genre(g) => write!(f, "genre:{g}"),
            ListKey::Search(q) => write!(f, "search:{q}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListStatus {
    #[default]
    Idle,
    Fetching,
}

/// Items gathered so far for one key, in page-arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateList {
    pub key: ListKey,
    pub items: Vec<Item>,
    /// Last page successfully appended; 0 before the first page lands.
    pub page_number: u32,
    pub status: ListStatus,
}

impl AggregateList {
    pub fn new(key: ListKey) -> Self {
        Self {
            key,
            items: Vec::new(),
            page_number: 0,
            status: ListStatus::Idle,
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.status == ListStatus::Fetching
    }
}
