//! Parent/child validation.
//!
//! The ancestor walk is iterative with a visited set, so arbitrarily deep
//! trees never grow the stack and a corrupt pre-existing loop still ends.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::store::OrderedListStore;

pub struct HierarchyGuard;

impl HierarchyGuard {
    /// Check that `item_id` may take `proposed_parent_id` as its parent.
    ///
    /// `parent_of` resolves an id to its current parent; unknown ids resolve
    /// to `None`, which ends the walk.
    pub fn validate<F>(item_id: &str, proposed_parent_id: &str, mut parent_of: F) -> Result<()>
    where
        F: FnMut(&str) -> Result<Option<String>>,
    {
        if proposed_parent_id == item_id {
            return Err(Error::SelfReference {
                item_id: item_id.to_string(),
            });
        }

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(item_id.to_string());

        let mut current = Some(proposed_parent_id.to_string());
        while let Some(node) = current {
            current = parent_of(&node)?;
            if !visited.insert(node) {
                return Err(Error::Cycle {
                    item_id: item_id.to_string(),
                    parent_id: proposed_parent_id.to_string(),
                });
            }
        }
        tracing::trace!(item_id, proposed_parent_id, depth = visited.len() - 1, "parent accepted");

        Ok(())
    }

    /// Same check, resolving parents through the store
    pub fn validate_in<S>(store: &S, item_id: &str, proposed_parent_id: &str) -> Result<()>
    where
        S: OrderedListStore + ?Sized,
    {
        Self::validate(item_id, proposed_parent_id, |id| store.parent_of(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn tree(edges: &[(&str, &str)]) -> HashMap<String, String> {
        edges
            .iter()
            .map(|(child, parent)| (child.to_string(), parent.to_string()))
            .collect()
    }

    fn check(edges: &HashMap<String, String>, item: &str, parent: &str) -> Result<()> {
        HierarchyGuard::validate(item, parent, |id| Ok(edges.get(id).cloned()))
    }

    #[test]
    fn rejects_self_reference() {
        let edges = tree(&[]);
        assert!(matches!(
            check(&edges, "a", "a"),
            Err(Error::SelfReference { .. })
        ));
    }

    #[test]
    fn rejects_descendant_as_parent() {
        // a <- b <- c <- d
        let edges = tree(&[("b", "a"), ("c", "b"), ("d", "c")]);
        for descendant in ["b", "c", "d"] {
            let err = check(&edges, "a", descendant).unwrap_err();
            assert!(matches!(err, Error::Cycle { .. }), "{descendant}: {err:?}");
        }
    }

    #[test]
    fn accepts_acyclic_assignments() {
        let edges = tree(&[("b", "a"), ("c", "b"), ("x", "y")]);
        check(&edges, "c", "a").unwrap();
        check(&edges, "a", "x").unwrap();
        check(&edges, "x", "c").unwrap();
        check(&edges, "new", "c").unwrap();
        check(&edges, "c", "unknown").unwrap();
    }

    #[test]
    fn detects_loop_not_involving_item() {
        let edges = tree(&[("p", "q"), ("q", "p")]);
        assert!(matches!(check(&edges, "a", "p"), Err(Error::Cycle { .. })));
    }

    #[test]
    fn deep_chain_does_not_recurse() {
        let depth = 100_000;
        let edges: HashMap<String, String> = (1..depth)
            .map(|i| (format!("n{i}"), format!("n{}", i - 1)))
            .collect();
        check(&edges, "leaf", &format!("n{}", depth - 1)).unwrap();
        assert!(matches!(
            check(&edges, "n0", &format!("n{}", depth - 1)),
            Err(Error::Cycle { .. })
        ));
    }

    #[test]
    fn lookup_errors_propagate() {
        let result = HierarchyGuard::validate("a", "b", |_| {
            Err(Error::OperationFailed("store offline".to_string()))
        });
        assert!(matches!(result, Err(Error::OperationFailed(_))));
    }
}
