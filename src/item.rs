//! Ordered items and the scopes that group them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::space::Position;

/// Generate a new opaque item identifier
pub fn new_item_id() -> String {
    Ulid::new().to_string().to_lowercase()
}

/// The `(list, parent)` pairing that groups siblings sharing one order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub list_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Scope {
    pub fn new(list_id: impl Into<String>, parent_id: Option<String>) -> Self {
        Self {
            list_id: list_id.into(),
            parent_id,
        }
    }

    /// Top level of a list
    pub fn root(list_id: impl Into<String>) -> Self {
        Self::new(list_id, None)
    }

    /// Children of `parent_id` within a list
    pub fn child(list_id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self::new(list_id, Some(parent_id.into()))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent_id {
            Some(parent) => write!(f, "{}/{}", self.list_id, parent),
            None => write!(f, "{}", self.list_id),
        }
    }
}

/// Transient instruction describing where an item should land
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum PlacementIntention {
    /// End of the list
    #[default]
    None,
    Top,
    After(String),
}

impl PlacementIntention {
    pub fn is_none(&self) -> bool {
        matches!(self, PlacementIntention::None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedItem {
    pub id: String,
    pub title: String,
    #[serde(flatten)]
    pub scope: Scope,
    pub position: Position,
    pub position_finalized: bool,
    #[serde(default, skip_serializing_if = "PlacementIntention::is_none")]
    pub placement_intention: PlacementIntention,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reordered_at: Option<DateTime<Utc>>,
    /// Optimistic lock counter for whole-record writes
    #[serde(default)]
    pub version: u64,
}

impl OrderedItem {
    /// A fresh, unfinalized item carrying a placement intention
    pub fn new(title: impl Into<String>, scope: Scope, intention: PlacementIntention) -> Self {
        let now = Utc::now();
        Self {
            id: new_item_id(),
            title: title.into(),
            scope,
            position: 0,
            position_finalized: false,
            placement_intention: intention,
            deleted: false,
            created_at: now,
            updated_at: now,
            reordered_at: None,
            version: 0,
        }
    }

    pub fn is_kept(&self) -> bool {
        !self.deleted
    }

    /// Mark the record as needing a new position
    pub fn reopen(&mut self, intention: PlacementIntention) {
        self.placement_intention = intention;
        self.position_finalized = false;
    }

    /// Record a computed position and consume the intention
    pub fn finalize(&mut self, position: Position, at: DateTime<Utc>) {
        self.position = position;
        self.position_finalized = true;
        self.placement_intention = PlacementIntention::None;
        self.reordered_at = Some(at);
        self.updated_at = at;
    }
}

/// Order kept siblings by position, ties broken by id
pub fn sort_siblings(items: &mut [OrderedItem]) {
    items.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
}
