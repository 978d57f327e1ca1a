//! Write path tying the ordering pieces together.
//!
//! Every mutation runs the same sequence: hierarchy check for parent
//! changes, position allocation against the kept sibling set, persistence,
//! then the rebalance trigger for the scope that received the item.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;

use crate::allocator::{Placement, PositionAllocator};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hierarchy::HierarchyGuard;
use crate::item::{OrderedItem, PlacementIntention, Scope};
use crate::rebalance::{RebalanceDispatcher, RebalanceReport, RebalanceWorker};
use crate::space::NumericSpace;
use crate::store::{OrderedListStore, PositionUpdate};
use crate::trigger::{RebalanceReason, RebalanceTrigger, WriteMode};

/// Input for [`Orderer::create`]
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub title: String,
    pub list_id: String,
    pub parent_id: Option<String>,
    pub intention: PlacementIntention,
}

impl NewItem {
    pub fn new(title: impl Into<String>, list_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            list_id: list_id.into(),
            ..Self::default()
        }
    }

    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn placed(mut self, intention: PlacementIntention) -> Self {
        self.intention = intention;
        self
    }
}

/// Result of a write that placed an item
#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    pub item: OrderedItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
    /// Set when the write pushed its scope past a rebalance threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebalance: Option<RebalanceReason>,
}

pub struct Orderer<S: ?Sized> {
    store: Arc<S>,
    allocator: Mutex<PositionAllocator>,
    trigger: RebalanceTrigger,
    worker: RebalanceWorker,
    dispatcher: Arc<dyn RebalanceDispatcher>,
}

impl<S> Orderer<S>
where
    S: OrderedListStore + ?Sized,
{
    pub fn new(store: Arc<S>, config: &Config, dispatcher: Arc<dyn RebalanceDispatcher>) -> Self {
        Self {
            store,
            allocator: Mutex::new(PositionAllocator::new(NumericSpace::from_config(
                &config.ordering,
            ))),
            trigger: RebalanceTrigger::from_config(&config.rebalance),
            worker: RebalanceWorker::from_config(&config.rebalance),
            dispatcher,
        }
    }

    /// Replace the allocator, e.g. with a seeded one
    pub fn with_allocator(mut self, allocator: PositionAllocator) -> Self {
        self.allocator = Mutex::new(allocator);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn trigger(&self) -> &RebalanceTrigger {
        &self.trigger
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn create(&self, new: NewItem) -> Result<WriteOutcome> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(Error::InvalidArgument("title cannot be empty".to_string()));
        }
        if new.list_id.trim().is_empty() {
            return Err(Error::InvalidArgument("list id cannot be empty".to_string()));
        }

        let scope = Scope::new(new.list_id, new.parent_id);
        let mut item = OrderedItem::new(title, scope, new.intention);
        if let Some(parent_id) = item.scope.parent_id.as_deref() {
            self.validate_parent(&item.id, parent_id, &item.scope.list_id)?;
        }

        let placement = self.place(&mut item)?;
        self.store.insert(&item)?;
        tracing::info!(item_id = %item.id, scope = %item.scope, position = item.position, "item created");

        let rebalance = self.after_write(&item.scope);
        Ok(WriteOutcome {
            item,
            placement: Some(placement),
            rebalance,
        })
    }

    /// Reposition within the current scope.
    ///
    /// Only the position field is written, last-writer-wins, so concurrent
    /// edits to other fields never conflict with a drag.
    pub fn move_item(&self, id: &str, intention: PlacementIntention) -> Result<WriteOutcome> {
        let mut item = self.require_kept(id)?;
        item.reopen(intention);

        let placement = self.place(&mut item)?;
        let at = item.reordered_at.unwrap_or_else(Utc::now);
        self.store
            .update_position(&PositionUpdate::new(item.id.clone(), item.position, at))?;
        tracing::info!(item_id = %item.id, scope = %item.scope, position = item.position, "item moved");

        let rebalance = self.after_write(&item.scope);
        Ok(WriteOutcome {
            item,
            placement: Some(placement),
            rebalance,
        })
    }

    /// Move an item under another parent (or to the list top level) and place
    /// it in the new sibling set.
    pub fn reparent(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        intention: PlacementIntention,
    ) -> Result<WriteOutcome> {
        let mut item = self.require_kept(id)?;
        if let Some(parent_id) = new_parent_id {
            self.validate_parent(&item.id, parent_id, &item.scope.list_id)?;
        }

        let previous = item.scope.clone();
        item.scope = Scope::new(previous.list_id.clone(), new_parent_id.map(str::to_string));
        item.reopen(intention);

        let placement = self.place(&mut item)?;
        item.version = self.store.save(&item)?;
        tracing::info!(
            item_id = %item.id,
            from = %previous,
            to = %item.scope,
            position = item.position,
            "item reparented"
        );

        let rebalance = self.after_write(&item.scope);
        Ok(WriteOutcome {
            item,
            placement: Some(placement),
            rebalance,
        })
    }

    /// Soft delete. Refused while the item still has kept children.
    pub fn tombstone(&self, id: &str) -> Result<OrderedItem> {
        let mut item = self.store.require(id)?;
        if item.deleted {
            return Ok(item);
        }

        let children = self.store.kept_children(&item)?;
        if !children.is_empty() {
            return Err(Error::HasKeptChildren {
                item_id: item.id,
                children: children.len(),
            });
        }

        item.deleted = true;
        item.updated_at = Utc::now();
        item.version = self.store.save(&item)?;
        tracing::info!(item_id = %item.id, scope = %item.scope, "item tombstoned");
        Ok(item)
    }

    /// Hard delete of a whole list
    pub fn delete_list(&self, list_id: &str) -> Result<usize> {
        let removed = self.store.delete_list(list_id)?;
        tracing::info!(list_id, removed, "list deleted");
        Ok(removed)
    }

    // =========================================================================
    // Reads and maintenance
    // =========================================================================

    pub fn siblings(&self, scope: &Scope) -> Result<Vec<OrderedItem>> {
        self.store.kept_siblings(scope, None)
    }

    pub fn check(&self, scope: &Scope) -> Result<Option<RebalanceReason>> {
        self.trigger.evaluate(&*self.store, scope)
    }

    /// Rebalance a scope inline instead of through the dispatcher.
    ///
    /// Worker writes never pass through the post-write trigger.
    pub fn rebalance_now(&self, scope: &Scope) -> Result<RebalanceReport> {
        self.worker.rebalance(&*self.store, scope)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn require_kept(&self, id: &str) -> Result<OrderedItem> {
        let item = self.store.require(id)?;
        if item.deleted {
            return Err(Error::ItemNotFound(id.to_string()));
        }
        Ok(item)
    }

    /// Guard first, then the parent record itself
    fn validate_parent(&self, item_id: &str, parent_id: &str, list_id: &str) -> Result<()> {
        HierarchyGuard::validate_in(&*self.store, item_id, parent_id)?;

        let parent = self
            .store
            .get(parent_id)?
            .ok_or_else(|| Error::InvalidParent(format!("{parent_id} does not exist")))?;
        if parent.deleted {
            return Err(Error::InvalidParent(format!("{parent_id} is deleted")));
        }
        if parent.scope.list_id != list_id {
            return Err(Error::InvalidParent(format!(
                "{parent_id} belongs to list {}, not {list_id}",
                parent.scope.list_id
            )));
        }
        Ok(())
    }

    /// Allocate from the item's intention and finalize it in place
    fn place(&self, item: &mut OrderedItem) -> Result<Placement> {
        let allocation = self.allocator().allocate(
            &*self.store,
            &item.scope,
            &item.placement_intention,
            Some(&item.id),
        )?;
        item.finalize(allocation.position, Utc::now());
        Ok(allocation.placement)
    }

    fn allocator(&self) -> MutexGuard<'_, PositionAllocator> {
        self.allocator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The write already landed; trigger failures are logged, not returned.
    fn after_write(&self, scope: &Scope) -> Option<RebalanceReason> {
        match self.trigger.after_write(
            &*self.store,
            scope,
            WriteMode::Normal,
            self.dispatcher.as_ref(),
        )
        {
            Ok(reason) => reason,
            Err(err) => {
                tracing::warn!(%scope, error = %err, "rebalance check failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::FixedJitter;
    use crate::rebalance::RebalanceQueue;
    use crate::space::Position;
    use crate::store::MemoryStore;

    fn orderer() -> (Orderer<MemoryStore>, Arc<RebalanceQueue>) {
        let queue = Arc::new(RebalanceQueue::new());
        let orderer = Orderer::new(
            Arc::new(MemoryStore::new()),
            &Config::default(),
            Arc::clone(&queue) as Arc<dyn RebalanceDispatcher>,
        )
        .with_allocator(PositionAllocator::seeded(NumericSpace::default(), 7).with_jitter(FixedJitter(0.0)));
        (orderer, queue)
    }

    fn titles(orderer: &Orderer<MemoryStore>, scope: &Scope) -> Vec<String> {
        orderer
            .siblings(scope)
            .unwrap()
            .into_iter()
            .map(|item| item.title)
            .collect()
    }

    #[test]
    fn create_places_by_intention() {
        let (orderer, _) = orderer();
        let scope = Scope::root("job");
        let first = orderer.create(NewItem::new("first", "job")).unwrap().item;
        assert!((1_000..10_000).contains(&first.position));
        assert!(first.position_finalized);
        assert!(first.placement_intention.is_none());

        orderer.create(NewItem::new("last", "job")).unwrap();
        orderer
            .create(NewItem::new("top", "job").placed(PlacementIntention::Top))
            .unwrap();
        orderer
            .create(NewItem::new("second", "job").placed(PlacementIntention::After(first.id)))
            .unwrap();

        assert_eq!(titles(&orderer, &scope), vec!["top", "first", "second", "last"]);
    }

    #[test]
    fn rejects_blank_input() {
        let (orderer, _) = orderer();
        assert!(matches!(
            orderer.create(NewItem::new("  ", "job")),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            orderer.create(NewItem::new("x", "")),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn move_rewrites_position_only() {
        let (orderer, _) = orderer();
        let a = orderer.create(NewItem::new("a", "job")).unwrap().item;
        let b = orderer.create(NewItem::new("b", "job")).unwrap().item;

        let moved = orderer.move_item(&b.id, PlacementIntention::Top).unwrap().item;
        assert!(moved.position < a.position);

        let stored = orderer.store().require(&b.id).unwrap();
        assert_eq!(stored.position, moved.position);
        assert_eq!(stored.version, 0);
        assert_eq!(titles(&orderer, &Scope::root("job")), vec!["b", "a"]);
    }

    #[test]
    fn moving_after_itself_appends() {
        let (orderer, _) = orderer();
        let a = orderer.create(NewItem::new("a", "job")).unwrap().item;
        orderer.create(NewItem::new("b", "job")).unwrap();

        let moved = orderer
            .move_item(&a.id, PlacementIntention::After(a.id.clone()))
            .unwrap();
        assert_eq!(titles(&orderer, &Scope::root("job")), vec!["b", "a"]);
        assert!(matches!(moved.placement, Some(Placement::End { .. })));
    }

    #[test]
    fn reparent_into_descendant_is_rejected_without_side_effects() {
        let (orderer, _) = orderer();
        let a = orderer.create(NewItem::new("a", "job")).unwrap().item;
        let b = orderer
            .create(NewItem::new("b", "job").under(a.id.clone()))
            .unwrap()
            .item;
        let c = orderer
            .create(NewItem::new("c", "job").under(b.id.clone()))
            .unwrap()
            .item;

        let err = orderer
            .reparent(&a.id, Some(&c.id), PlacementIntention::None)
            .unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }), "{err:?}");

        let stored = orderer.store().require(&a.id).unwrap();
        assert_eq!(stored.position, a.position);
        assert_eq!(stored.scope, a.scope);
        assert_eq!(stored.version, a.version);

        let err = orderer
            .reparent(&a.id, Some(&a.id), PlacementIntention::None)
            .unwrap_err();
        assert!(matches!(err, Error::SelfReference { .. }));
    }

    #[test]
    fn reparent_places_in_new_scope() {
        let (orderer, _) = orderer();
        let a = orderer.create(NewItem::new("a", "job")).unwrap().item;
        let b = orderer.create(NewItem::new("b", "job")).unwrap().item;

        let moved = orderer
            .reparent(&b.id, Some(&a.id), PlacementIntention::Top)
            .unwrap()
            .item;
        assert_eq!(moved.scope, Scope::child("job", a.id.clone()));
        assert_eq!(moved.version, 1);
        assert_eq!(titles(&orderer, &Scope::root("job")), vec!["a"]);

        let back = orderer
            .reparent(&b.id, None, PlacementIntention::None)
            .unwrap()
            .item;
        assert_eq!(back.scope, Scope::root("job"));
        assert_eq!(back.version, 2);
    }

    #[test]
    fn parent_must_be_kept_and_in_the_same_list() {
        let (orderer, _) = orderer();
        let other = orderer.create(NewItem::new("other", "job-2")).unwrap().item;
        let gone = orderer.create(NewItem::new("gone", "job")).unwrap().item;
        orderer.tombstone(&gone.id).unwrap();

        for parent in [other.id.as_str(), gone.id.as_str(), "missing"] {
            let err = orderer
                .create(NewItem::new("child", "job").under(parent))
                .unwrap_err();
            assert!(matches!(err, Error::InvalidParent(_)), "{parent}: {err:?}");
        }
    }

    #[test]
    fn tombstone_requires_no_kept_children() {
        let (orderer, _) = orderer();
        let parent = orderer.create(NewItem::new("parent", "job")).unwrap().item;
        let child = orderer
            .create(NewItem::new("child", "job").under(parent.id.clone()))
            .unwrap()
            .item;

        let err = orderer.tombstone(&parent.id).unwrap_err();
        assert!(matches!(err, Error::HasKeptChildren { children: 1, .. }));

        orderer.tombstone(&child.id).unwrap();
        let removed = orderer.tombstone(&parent.id).unwrap();
        assert!(removed.deleted);
        // repeat is a no-op
        assert_eq!(orderer.tombstone(&parent.id).unwrap().version, removed.version);
        assert!(matches!(
            orderer.move_item(&parent.id, PlacementIntention::Top),
            Err(Error::ItemNotFound(_))
        ));
    }

    #[test]
    fn crowded_scope_is_queued_once() {
        let (orderer, queue) = orderer();
        let scope = Scope::root("job");
        for pos in 1..=11 {
            let mut item = OrderedItem::new(format!("t{pos}"), scope.clone(), PlacementIntention::None);
            item.finalize(pos as Position, Utc::now());
            orderer.store().insert(&item).unwrap();
        }

        let outcome = orderer.create(NewItem::new("twelfth", "job")).unwrap();
        assert_eq!(outcome.rebalance, Some(RebalanceReason::MinGap { gap: 1 }));
        orderer.create(NewItem::new("thirteenth", "job")).unwrap();
        assert_eq!(queue.drain(), vec![scope.clone()]);

        let report = orderer.rebalance_now(&scope).unwrap();
        assert_eq!(report.items, 13);
        assert!(queue.is_empty());
        assert_eq!(orderer.check(&scope).unwrap(), None);
    }

    #[test]
    fn inline_rebalance_never_queues_its_scope() {
        let (orderer, queue) = orderer();
        let scope = Scope::root("job");
        for pos in 1..=12 {
            let mut item = OrderedItem::new(format!("t{pos}"), scope.clone(), PlacementIntention::None);
            item.finalize(pos as Position, Utc::now());
            orderer.store().insert(&item).unwrap();
        }
        assert!(orderer.check(&scope).unwrap().is_some());

        let report = orderer.rebalance_now(&scope).unwrap();
        assert_eq!(report.updated, 12);
        assert!(queue.is_empty());
    }

    #[test]
    fn delete_list_removes_everything() {
        let (orderer, _) = orderer();
        orderer.create(NewItem::new("a", "job")).unwrap();
        orderer.create(NewItem::new("b", "job")).unwrap();
        orderer.create(NewItem::new("c", "job-2")).unwrap();
        assert_eq!(orderer.delete_list("job").unwrap(), 2);
        assert!(orderer.siblings(&Scope::root("job")).unwrap().is_empty());
        assert_eq!(orderer.siblings(&Scope::root("job-2")).unwrap().len(), 1);
    }
}
