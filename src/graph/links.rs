//! Bidirectional adjacency for the working graph.
//!
//! Forward edges (a node's children) are the source of truth; dependents are
//! derived and patched on every forward change so the two never disagree.
//! Uses BTreeMap/BTreeSet for deterministic iteration order.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::NodeId;

/// Children and derived dependents of every node in a working set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkIndex {
    /// Parent -> ordered children.
    children: BTreeMap<NodeId, Vec<NodeId>>,
    /// Child -> parents.
    dependents: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl LinkIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire child list of `node`.
    ///
    /// Removes `node` from the dependents of children it no longer has and
    /// adds it to the dependents of the new ones. Idempotent.
    pub fn set_children(&mut self, node: NodeId, new_children: &[NodeId]) {
        let old = self.children.remove(&node).unwrap_or_default();
        for child in &old {
            if !new_children.contains(child) {
                self.remove_dependent(*child, node);
            }
        }
        for child in new_children {
            self.dependents.entry(*child).or_default().insert(node);
        }
        if !new_children.is_empty() {
            self.children.insert(node, new_children.to_vec());
        }
    }

    /// Substitute `new` for `old` in the children of `parent`, keeping position.
    ///
    /// Returns false if `old` was not a child of `parent`.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> bool {
        let Some(current) = self.children.get(&parent) else {
            return false;
        };
        if !current.contains(&old) {
            return false;
        }
        let mut updated: Vec<NodeId> = Vec::with_capacity(current.len());
        for child in current {
            let child = if *child == old { new } else { *child };
            if !updated.contains(&child) {
                updated.push(child);
            }
        }
        self.set_children(parent, &updated);
        true
    }

    /// Purge a deleted node from every cached child and dependent set.
    pub fn forget(&mut self, node: NodeId) {
        self.set_children(node, &[]);
        if let Some(parents) = self.dependents.remove(&node) {
            for parent in parents {
                if let Some(children) = self.children.get_mut(&parent) {
                    children.retain(|child| *child != node);
                    if children.is_empty() {
                        self.children.remove(&parent);
                    }
                }
            }
        }
    }

    /// Ordered children of `node`.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.children.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes holding an edge to `node`.
    pub fn dependents(&self, node: NodeId) -> Vec<NodeId> {
        self.dependents
            .get(&node)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether `node` appears anywhere in the index.
    pub fn contains(&self, node: NodeId) -> bool {
        self.children.contains_key(&node) || self.dependents.contains_key(&node)
    }

    /// Check that dependents mirror children exactly.
    pub fn is_consistent(&self) -> bool {
        let mut derived: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for (parent, children) in &self.children {
            for child in children {
                derived.entry(*child).or_default().insert(*parent);
            }
        }
        derived == self.dependents
    }

    fn remove_dependent(&mut self, child: NodeId, parent: NodeId) {
        if let Some(parents) = self.dependents.get_mut(&child) {
            parents.remove(&parent);
            if parents.is_empty() {
                self.dependents.remove(&child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn id(n: u128) -> NodeId {
        NodeId::new(Uuid::from_u128(n))
    }

    #[test]
    fn test_set_children_maintains_dependents() {
        let mut links = LinkIndex::new();
        links.set_children(id(1), &[id(2), id(3)]);

        assert_eq!(links.children(id(1)), &[id(2), id(3)]);
        assert_eq!(links.dependents(id(2)), vec![id(1)]);
        assert_eq!(links.dependents(id(3)), vec![id(1)]);

        links.set_children(id(1), &[id(3), id(4)]);
        assert!(links.dependents(id(2)).is_empty());
        assert_eq!(links.dependents(id(4)), vec![id(1)]);
        assert!(links.is_consistent());
    }

    #[test]
    fn test_set_children_idempotent_and_empty() {
        let mut links = LinkIndex::new();
        links.set_children(id(1), &[id(2)]);
        let snapshot = links.clone();

        links.set_children(id(1), &[id(2)]);
        assert_eq!(links, snapshot);

        links.set_children(id(1), &[]);
        assert!(links.children(id(1)).is_empty());
        assert!(links.dependents(id(2)).is_empty());
        assert!(!links.contains(id(2)));
    }

    #[test]
    fn test_replace_child_keeps_position() {
        let mut links = LinkIndex::new();
        links.set_children(id(1), &[id(2), id(3), id(4)]);

        assert!(links.replace_child(id(1), id(3), id(9)));
        assert_eq!(links.children(id(1)), &[id(2), id(9), id(4)]);
        assert!(links.dependents(id(3)).is_empty());
        assert_eq!(links.dependents(id(9)), vec![id(1)]);

        assert!(!links.replace_child(id(1), id(3), id(9)));
        assert!(links.is_consistent());
    }

    #[test]
    fn test_forget_purges_both_directions() {
        let mut links = LinkIndex::new();
        links.set_children(id(1), &[id(2)]);
        links.set_children(id(2), &[id(3)]);

        links.forget(id(2));

        assert!(links.children(id(1)).is_empty());
        assert!(links.dependents(id(3)).is_empty());
        assert!(!links.contains(id(2)));
        assert!(links.is_consistent());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Set(u8, Vec<u8>),
        Replace(u8, u8, u8),
        Forget(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8, prop::collection::vec(0u8..8, 0..4)).prop_map(|(n, c)| Op::Set(n, c)),
            (0u8..8, 0u8..8, 0u8..8).prop_map(|(p, o, n)| Op::Replace(p, o, n)),
            (0u8..8).prop_map(Op::Forget),
        ]
    }

    proptest! {
        #[test]
        fn prop_dependents_mirror_children(ops in prop::collection::vec(op(), 0..40)) {
            let mut links = LinkIndex::new();
            for op in ops {
                match op {
                    Op::Set(node, children) => {
                        let mut unique: Vec<NodeId> = Vec::new();
                        for c in children {
                            if !unique.contains(&id(c as u128)) {
                                unique.push(id(c as u128));
                            }
                        }
                        links.set_children(id(node as u128), &unique);
                    }
                    Op::Replace(parent, old, new) => {
                        links.replace_child(id(parent as u128), id(old as u128), id(new as u128));
                    }
                    Op::Forget(node) => links.forget(id(node as u128)),
                }
                prop_assert!(links.is_consistent());
            }
        }
    }
}
