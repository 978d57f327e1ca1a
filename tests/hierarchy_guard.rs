mod support;

use std::sync::Arc;

use taskorder::config::Config;
use taskorder::error::Error;
use taskorder::hierarchy::HierarchyGuard;
use taskorder::item::{PlacementIntention, Scope};
use taskorder::rebalance::{RebalanceDispatcher, RebalanceQueue};
use taskorder::store::{MemoryStore, OrderedListStore};
use taskorder::{NewItem, Orderer};

use support::{memory_orderer, TestRoot};

#[test]
fn parent_cannot_be_a_descendant() -> Result<(), Box<dyn std::error::Error>> {
    let (orderer, _) = memory_orderer();
    let a = orderer.create(NewItem::new("A", "job"))?.item;
    let b = orderer.create(NewItem::new("B", "job").under(a.id.clone()))?.item;
    let c = orderer.create(NewItem::new("C", "job").under(b.id.clone()))?.item;

    for descendant in [&b.id, &c.id] {
        let err = orderer
            .reparent(&a.id, Some(descendant), PlacementIntention::Top)
            .unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }), "{err:?}");
        assert!(err.is_hierarchy_violation());
    }

    let stored = orderer.store().require(&a.id)?;
    assert_eq!(stored.position, a.position);
    assert_eq!(stored.scope, Scope::root("job"));
    assert_eq!(stored.version, a.version);
    Ok(())
}

#[test]
fn acyclic_reparent_is_accepted() -> Result<(), Box<dyn std::error::Error>> {
    let (orderer, _) = memory_orderer();
    let a = orderer.create(NewItem::new("A", "job"))?.item;
    let b = orderer.create(NewItem::new("B", "job").under(a.id.clone()))?.item;
    let c = orderer.create(NewItem::new("C", "job"))?.item;

    // sibling subtree
    orderer.reparent(&c.id, Some(&b.id), PlacementIntention::None)?;
    // grandchild back up to the grandparent
    let moved = orderer
        .reparent(&c.id, Some(&a.id), PlacementIntention::Top)?
        .item;
    assert_eq!(moved.scope, Scope::child("job", a.id.clone()));

    let children: Vec<String> = orderer
        .siblings(&Scope::child("job", a.id.clone()))?
        .into_iter()
        .map(|item| item.title)
        .collect();
    assert_eq!(children, vec!["C", "B"]);
    Ok(())
}

#[test]
fn guard_rejects_through_file_store() -> Result<(), Box<dyn std::error::Error>> {
    let root = TestRoot::init();
    let store = Arc::new(root.file_store());
    let queue = Arc::new(RebalanceQueue::new());
    let orderer = Orderer::new(
        Arc::clone(&store),
        &Config::default(),
        queue as Arc<dyn RebalanceDispatcher>,
    );

    let a = orderer.create(NewItem::new("A", "job"))?.item;
    let b = orderer.create(NewItem::new("B", "job").under(a.id.clone()))?.item;

    assert!(matches!(
        HierarchyGuard::validate_in(store.as_ref(), &a.id, &b.id),
        Err(Error::Cycle { .. })
    ));
    HierarchyGuard::validate_in(store.as_ref(), &b.id, &a.id)?;
    Ok(())
}

#[test]
fn tombstone_blocked_by_kept_children_only() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let orderer = Orderer::new(
        Arc::clone(&store),
        &Config::default(),
        Arc::new(RebalanceQueue::new()) as Arc<dyn RebalanceDispatcher>,
    );
    let parent = orderer.create(NewItem::new("parent", "job"))?.item;
    let child = orderer
        .create(NewItem::new("child", "job").under(parent.id.clone()))?
        .item;

    let err = orderer.tombstone(&parent.id).unwrap_err();
    assert!(matches!(
        err,
        Error::HasKeptChildren { children: 1, .. }
    ));
    assert!(!store.require(&parent.id)?.deleted);

    orderer.tombstone(&child.id)?;
    assert!(orderer.tombstone(&parent.id)?.deleted);
    Ok(())
}
