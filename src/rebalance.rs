//! Sibling-set rebalancing.
//!
//! The worker reassigns evenly spaced positions to every kept sibling in a
//! scope, in the order users already see, and persists them as one batch.
//! Scopes waiting for a pass are held in a [`RebalanceQueue`], which collapses
//! duplicate enqueues of the same scope.

use std::collections::BTreeSet;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

use crate::config::RebalanceConfig;
use crate::error::{Error, Result};
use crate::item::Scope;
use crate::space::Position;
use crate::store::{OrderedListStore, PositionUpdate};

/// Receives scopes that need a rebalance pass
pub trait RebalanceDispatcher: Send + Sync {
    fn enqueue(&self, scope: Scope);
}

/// Coalescing set of scopes waiting for a rebalance.
#[derive(Debug, Default)]
pub struct RebalanceQueue {
    scopes: Mutex<BTreeSet<Scope>>,
}

impl RebalanceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the scope was already queued
    pub fn push(&self, scope: Scope) -> bool {
        self.lock().insert(scope)
    }

    /// Take every queued scope, leaving the queue empty
    pub fn drain(&self) -> Vec<Scope> {
        std::mem::take(&mut *self.lock()).into_iter().collect()
    }

    pub fn contains(&self, scope: &Scope) -> bool {
        self.lock().contains(scope)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<Scope>> {
        self.scopes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RebalanceDispatcher for RebalanceQueue {
    fn enqueue(&self, scope: Scope) {
        if !self.push(scope.clone()) {
            tracing::trace!(%scope, "rebalance already queued");
        }
    }
}

/// Outcome of one rebalance pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebalanceReport {
    pub scope: Scope,
    /// Kept siblings seen at execution time
    pub items: usize,
    /// Items whose position was rewritten
    pub updated: usize,
    pub spacing: Position,
}

#[derive(Debug, Clone, Copy)]
pub struct RebalanceWorker {
    pub spacing: Position,
    pub high_water_mark: Position,
    /// Spacing never shrinks below this gap
    pub min_gap: Position,
}

impl Default for RebalanceWorker {
    fn default() -> Self {
        Self::from_config(&RebalanceConfig::default())
    }
}

impl RebalanceWorker {
    pub fn from_config(config: &RebalanceConfig) -> Self {
        Self {
            spacing: config.spacing,
            high_water_mark: config.high_water_mark,
            min_gap: config.min_gap,
        }
    }

    /// Spacing for `count` siblings, shrunk so the last one stays at or
    /// below the high-water mark.
    ///
    /// The gap floor wins over the high-water mark: a scope too large for
    /// both is spaced at `min_gap` and may end above the mark.
    pub fn effective_spacing(&self, count: usize) -> Position {
        let count = Position::try_from(count.max(1)).unwrap_or(Position::MAX);
        let floor = self.min_gap.max(1);
        if self.spacing.saturating_mul(count) <= self.high_water_mark {
            self.spacing.max(floor)
        } else {
            (self.high_water_mark / count).max(floor)
        }
    }

    /// Reassign `i * spacing` (for `i = 1..=N`) to the scope's kept siblings.
    ///
    /// Siblings are re-read here, so the pass covers whatever the scope holds
    /// now rather than when it was queued. Running it again on an unchanged
    /// set issues no write.
    pub fn rebalance<S>(&self, store: &S, scope: &Scope) -> Result<RebalanceReport>
    where
        S: OrderedListStore + ?Sized,
    {
        let siblings = store.kept_siblings(scope, None)?;
        let spacing = self.effective_spacing(siblings.len());
        let at = Utc::now();

        let updates: Vec<PositionUpdate> = siblings
            .iter()
            .zip(1..)
            .filter_map(|(item, index): (_, Position)| {
                let position = index.saturating_mul(spacing);
                (item.position != position || !item.position_finalized)
                    .then(|| PositionUpdate::new(item.id.clone(), position, at))
            })
            .collect();

        if !updates.is_empty() {
            store
                .update_positions(&updates)
                .map_err(|err| Error::RebalanceFailed {
                    scope: scope.to_string(),
                    reason: err.to_string(),
                })?;
        }

        let report = RebalanceReport {
            scope: scope.clone(),
            items: siblings.len(),
            updated: updates.len(),
            spacing,
        };
        tracing::info!(
            %scope,
            items = report.items,
            updated = report.updated,
            spacing,
            "scope rebalanced"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{OrderedItem, PlacementIntention};
    use crate::store::MemoryStore;

    fn seed(store: &MemoryStore, scope: &Scope, id: &str, position: Position) {
        let mut item = OrderedItem::new(id, scope.clone(), PlacementIntention::None);
        item.id = id.to_string();
        item.finalize(position, Utc::now());
        store.insert(&item).unwrap();
    }

    fn positions(store: &MemoryStore, scope: &Scope) -> Vec<(String, Position)> {
        store
            .kept_siblings(scope, None)
            .unwrap()
            .into_iter()
            .map(|item| (item.id, item.position))
            .collect()
    }

    #[test]
    fn queue_coalesces_duplicates() {
        let queue = RebalanceQueue::new();
        assert!(queue.push(Scope::root("job")));
        assert!(!queue.push(Scope::root("job")));
        queue.enqueue(Scope::child("job", "parent"));
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn rebalance_spaces_evenly_in_current_order() {
        let store = MemoryStore::new();
        let scope = Scope::root("job");
        for (id, pos) in [("c", 3), ("a", 1), ("b", 2), ("d", 2)] {
            seed(&store, &scope, id, pos);
        }

        let report = RebalanceWorker::default().rebalance(&store, &scope).unwrap();
        assert_eq!(report.items, 4);
        assert_eq!(report.updated, 4);
        assert_eq!(
            positions(&store, &scope),
            vec![
                ("a".to_string(), 10_000),
                ("b".to_string(), 20_000),
                ("d".to_string(), 30_000),
                ("c".to_string(), 40_000),
            ]
        );
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let store = MemoryStore::new();
        let scope = Scope::root("job");
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            seed(&store, &scope, id, i as Position + 1);
        }
        let worker = RebalanceWorker::default();
        worker.rebalance(&store, &scope).unwrap();
        let first = positions(&store, &scope);

        let report = worker.rebalance(&store, &scope).unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(positions(&store, &scope), first);
    }

    #[test]
    fn tombstones_are_left_alone() {
        let store = MemoryStore::new();
        let scope = Scope::root("job");
        seed(&store, &scope, "a", 5);
        seed(&store, &scope, "b", 6);
        let mut gone = OrderedItem::new("gone", scope.clone(), PlacementIntention::None);
        gone.id = "gone".to_string();
        gone.finalize(1, Utc::now());
        gone.deleted = true;
        store.insert(&gone).unwrap();

        let report = RebalanceWorker::default().rebalance(&store, &scope).unwrap();
        assert_eq!(report.items, 2);
        assert_eq!(store.require("gone").unwrap().position, 1);
        assert_eq!(store.require("a").unwrap().position, 10_000);
    }

    #[test]
    fn spacing_shrinks_near_high_water_mark() {
        let worker = RebalanceWorker {
            spacing: 10_000,
            high_water_mark: 100_000,
            min_gap: 2,
        };
        assert_eq!(worker.effective_spacing(5), 10_000);
        assert_eq!(worker.effective_spacing(10), 10_000);
        assert_eq!(worker.effective_spacing(40), 2_500);
        assert_eq!(worker.effective_spacing(0), 10_000);
    }

    #[test]
    fn spacing_never_drops_below_min_gap() {
        let worker = RebalanceWorker {
            spacing: 10_000,
            high_water_mark: 100,
            min_gap: 8,
        };
        assert_eq!(worker.effective_spacing(50), 8);

        let store = MemoryStore::new();
        let scope = Scope::root("job");
        for pos in 1..=50 {
            seed(&store, &scope, &format!("t{pos:02}"), pos);
        }
        worker.rebalance(&store, &scope).unwrap();

        let after: Vec<Position> = positions(&store, &scope)
            .into_iter()
            .map(|(_, position)| position)
            .collect();
        assert!(after.windows(2).all(|pair| pair[1] - pair[0] >= 8));
    }

    #[test]
    fn empty_scope_reports_nothing() {
        let store = MemoryStore::new();
        let report = RebalanceWorker::default()
            .rebalance(&store, &Scope::root("empty"))
            .unwrap();
        assert_eq!(report.items, 0);
        assert_eq!(report.updated, 0);
    }
}
