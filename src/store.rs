//! Persistence boundary for ordered items.
//!
//! All sibling, min/max and next-sibling queries return kept items only.
//! Ordering is computed over this full kept set, never over a
//! display-filtered subset; there is no way to hand the allocator a
//! caller-chosen sibling list.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::item::{sort_siblings, OrderedItem, Scope};
use crate::lock::{ItemsLock, DEFAULT_LOCK_TIMEOUT_MS};
use crate::space::Position;
use crate::storage::{ItemSnapshot, Storage};

/// Position-only write, applied last-writer-wins without touching `version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionUpdate {
    pub id: String,
    pub position: Position,
    pub at: DateTime<Utc>,
}

impl PositionUpdate {
    pub fn new(id: impl Into<String>, position: Position, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            position,
            at,
        }
    }

    fn apply(&self, item: &mut OrderedItem) {
        item.finalize(self.position, self.at);
    }
}

pub trait OrderedListStore: Send + Sync {
    /// Any item, tombstoned or not
    fn get(&self, id: &str) -> Result<Option<OrderedItem>>;

    fn insert(&self, item: &OrderedItem) -> Result<()>;

    /// Whole-record write guarded by `version`; returns the new version
    fn save(&self, item: &OrderedItem) -> Result<u64>;

    /// Kept items in `scope` ordered by `(position, id)`, minus `exclude`
    fn kept_siblings(&self, scope: &Scope, exclude: Option<&str>) -> Result<Vec<OrderedItem>>;

    fn update_position(&self, update: &PositionUpdate) -> Result<()>;

    /// Apply every update or none of them
    fn update_positions(&self, updates: &[PositionUpdate]) -> Result<()>;

    /// Kept items of a list across all scopes
    fn list_items(&self, list_id: &str) -> Result<Vec<OrderedItem>>;

    /// Hard delete of every item in a list; returns the number removed
    fn delete_list(&self, list_id: &str) -> Result<usize>;

    fn require(&self, id: &str) -> Result<OrderedItem> {
        self.get(id)?
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))
    }

    fn parent_of(&self, id: &str) -> Result<Option<String>> {
        Ok(self.get(id)?.and_then(|item| item.scope.parent_id))
    }

    fn min_position(&self, scope: &Scope, exclude: Option<&str>) -> Result<Option<Position>> {
        Ok(self
            .kept_siblings(scope, exclude)?
            .first()
            .map(|item| item.position))
    }

    fn max_position(&self, scope: &Scope, exclude: Option<&str>) -> Result<Option<Position>> {
        Ok(self
            .kept_siblings(scope, exclude)?
            .last()
            .map(|item| item.position))
    }

    /// Kept sibling with the smallest position strictly greater than `after`
    fn next_sibling(
        &self,
        scope: &Scope,
        after: Position,
        exclude: Option<&str>,
    ) -> Result<Option<OrderedItem>> {
        Ok(self
            .kept_siblings(scope, exclude)?
            .into_iter()
            .find(|item| item.position > after))
    }

    fn kept_children(&self, item: &OrderedItem) -> Result<Vec<OrderedItem>> {
        self.kept_siblings(&Scope::child(item.scope.list_id.clone(), item.id.clone()), None)
    }
}

fn collect_siblings<'a>(
    items: impl Iterator<Item = &'a OrderedItem>,
    scope: &Scope,
    exclude: Option<&str>,
) -> Vec<OrderedItem> {
    let mut siblings: Vec<OrderedItem> = items
        .filter(|item| item.is_kept() && &item.scope == scope)
        .filter(|item| exclude != Some(item.id.as_str()))
        .cloned()
        .collect();
    sort_siblings(&mut siblings);
    siblings
}

fn check_version(stored: &OrderedItem, incoming: &OrderedItem) -> Result<()> {
    if stored.version != incoming.version {
        return Err(Error::StaleRecord {
            item_id: incoming.id.clone(),
            expected: incoming.version,
            found: stored.version,
        });
    }
    Ok(())
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, OrderedItem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, OrderedItem>> {
        self.items.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, OrderedItem>> {
        self.items.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OrderedListStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<OrderedItem>> {
        Ok(self.read().get(id).cloned())
    }

    fn insert(&self, item: &OrderedItem) -> Result<()> {
        let mut items = self.write();
        if items.contains_key(&item.id) {
            return Err(Error::InvalidArgument(format!(
                "item already exists: {}",
                item.id
            )));
        }
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    fn save(&self, item: &OrderedItem) -> Result<u64> {
        let mut items = self.write();
        let stored = items
            .get_mut(&item.id)
            .ok_or_else(|| Error::ItemNotFound(item.id.clone()))?;
        check_version(stored, item)?;
        let mut next = item.clone();
        next.version += 1;
        let version = next.version;
        *stored = next;
        Ok(version)
    }

    fn kept_siblings(&self, scope: &Scope, exclude: Option<&str>) -> Result<Vec<OrderedItem>> {
        Ok(collect_siblings(self.read().values(), scope, exclude))
    }

    fn update_position(&self, update: &PositionUpdate) -> Result<()> {
        let mut items = self.write();
        let item = items
            .get_mut(&update.id)
            .ok_or_else(|| Error::ItemNotFound(update.id.clone()))?;
        update.apply(item);
        Ok(())
    }

    fn update_positions(&self, updates: &[PositionUpdate]) -> Result<()> {
        let mut items = self.write();
        if let Some(missing) = updates.iter().find(|u| !items.contains_key(&u.id)) {
            return Err(Error::ItemNotFound(missing.id.clone()));
        }
        for update in updates {
            if let Some(item) = items.get_mut(&update.id) {
                update.apply(item);
            }
        }
        Ok(())
    }

    fn list_items(&self, list_id: &str) -> Result<Vec<OrderedItem>> {
        let mut items: Vec<OrderedItem> = self
            .read()
            .values()
            .filter(|item| item.is_kept() && item.scope.list_id == list_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.scope
                .cmp(&b.scope)
                .then_with(|| a.position.cmp(&b.position))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(items)
    }

    fn delete_list(&self, list_id: &str) -> Result<usize> {
        let mut items = self.write();
        let before = items.len();
        items.retain(|_, item| item.scope.list_id != list_id);
        Ok(before - items.len())
    }
}

// =============================================================================
// File-backed store
// =============================================================================

/// Store backed by `.taskorder/items.json`
///
/// Writes lock `items.lock`, reload the snapshot, apply the change and
/// rewrite the file atomically, so a batch either lands whole or not at all.
#[derive(Debug, Clone)]
pub struct FileStore {
    storage: Storage,
    lock_timeout_ms: u64,
}

impl FileStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }

    pub fn with_lock_timeout(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn snapshot(&self) -> Result<ItemSnapshot> {
        self.storage.read_items()
    }

    fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<OrderedItem>) -> Result<T>,
    {
        self.storage.ensure_initialized()?;
        let _lock = ItemsLock::acquire(self.storage.items_lock_file(), self.lock_timeout_ms)?;
        let mut snapshot = self.snapshot()?;
        let value = f(&mut snapshot.items)?;
        self.storage.write_items(&mut snapshot)?;
        Ok(value)
    }
}

impl OrderedListStore for FileStore {
    fn get(&self, id: &str) -> Result<Option<OrderedItem>> {
        Ok(self.snapshot()?.items.into_iter().find(|item| item.id == id))
    }

    fn insert(&self, item: &OrderedItem) -> Result<()> {
        self.mutate(|items| {
            if items.iter().any(|existing| existing.id == item.id) {
                return Err(Error::InvalidArgument(format!(
                    "item already exists: {}",
                    item.id
                )));
            }
            items.push(item.clone());
            Ok(())
        })
    }

    fn save(&self, item: &OrderedItem) -> Result<u64> {
        self.mutate(|items| {
            let stored = items
                .iter_mut()
                .find(|existing| existing.id == item.id)
                .ok_or_else(|| Error::ItemNotFound(item.id.clone()))?;
            check_version(stored, item)?;
            let mut next = item.clone();
            next.version += 1;
            let version = next.version;
            *stored = next;
            Ok(version)
        })
    }

    fn kept_siblings(&self, scope: &Scope, exclude: Option<&str>) -> Result<Vec<OrderedItem>> {
        let snapshot = self.snapshot()?;
        Ok(collect_siblings(snapshot.items.iter(), scope, exclude))
    }

    fn update_position(&self, update: &PositionUpdate) -> Result<()> {
        self.update_positions(std::slice::from_ref(update))
    }

    fn update_positions(&self, updates: &[PositionUpdate]) -> Result<()> {
        self.mutate(|items| {
            let targets = {
                let index: HashMap<&str, usize> = items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| (item.id.as_str(), idx))
                    .collect();
                let mut targets = Vec::with_capacity(updates.len());
                for update in updates {
                    let idx = index
                        .get(update.id.as_str())
                        .copied()
                        .ok_or_else(|| Error::ItemNotFound(update.id.clone()))?;
                    targets.push(idx);
                }
                targets
            };
            for (update, idx) in updates.iter().zip(targets) {
                update.apply(&mut items[idx]);
            }
            Ok(())
        })
    }

    fn list_items(&self, list_id: &str) -> Result<Vec<OrderedItem>> {
        // snapshot is already written in (scope, position, id) order
        Ok(self
            .snapshot()?
            .items
            .into_iter()
            .filter(|item| item.is_kept() && item.scope.list_id == list_id)
            .collect())
    }

    fn delete_list(&self, list_id: &str) -> Result<usize> {
        self.mutate(|items| {
            let before = items.len();
            items.retain(|item| item.scope.list_id != list_id);
            Ok(before - items.len())
        })
    }
}
