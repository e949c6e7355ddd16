//! Copy-on-write draft propagation toward a root.
//!
//! When a node below the displayed root is drafted, every node on a path from
//! the root down to it must become a draft too, so the view from the root is
//! one consistent in-progress chain. Only the path is copied; every subtree
//! hanging off it stays shared with the published graph.
//!
//! ## Algorithm
//!
//! 1. Collect the nodes that are reachable from the root and reach the edited
//!    node, in post-order (children before parents)
//! 2. Seed the replacement map with `edited -> draft`
//! 3. For each path node in that order:
//!    - a draft owned by the acting author is rewired in place
//!    - a published node gets a draft copy whose children are its own
//!      children with replacements substituted in position
//! 4. The effective root is the root's replacement, or the root itself

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{KernelError, KernelResult, RuleViolation};
use crate::types::{ArgumentNode, AuthorId, NodeId};
use super::working::WorkingSet;

/// What a propagation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Propagation {
    /// Root to display from now on.
    pub root_id: NodeId,
    /// Published path nodes and the drafts that now stand in for them.
    pub copied: BTreeMap<NodeId, NodeId>,
    /// Existing drafts whose edges were rewired in place.
    pub rewired: Vec<NodeId>,
}

/// Branch a private draft off a published node.
///
/// The copy gets a fresh id and stable id, the same edges, a body branched
/// from the published body, and `previous_version` pointing back. The
/// published node stops being finalized until the draft is published or
/// discarded.
pub fn branch_draft(ws: &mut WorkingSet, node_id: NodeId, author: AuthorId) -> KernelResult<NodeId> {
    let node = ws.node(node_id)?.clone();
    let body = ws.body(node.body_id)?;

    if !body.is_public {
        return Err(RuleViolation::AlreadyDraft(node_id).into());
    }
    if !body.is_editable {
        return Err(RuleViolation::NotEditable(node_id).into());
    }
    if !node.finalized {
        return Err(RuleViolation::OutstandingDraft(node_id).into());
    }

    let branched_body = body.branch(author, ws.now());
    let body_id = ws.insert_body(branched_body);

    let mut draft = ArgumentNode::new(node.kind(), body_id);
    draft.links = node.links.clone();
    draft.previous_version = Some(node_id);
    let draft_id = ws.insert_node(draft);

    ws.node_mut(node_id)?.finalized = false;

    tracing::debug!(
        node_id = %node_id,
        draft_id = %draft_id,
        author = %author,
        "Branched draft"
    );

    Ok(draft_id)
}

/// Propagate a fresh draft of `edited` up to `root`.
///
/// `edited` is the published node that was branched and `draft` its new
/// draft. Every node reachable from `root` must be loaded.
pub fn propagate_to_root(
    ws: &mut WorkingSet,
    author: AuthorId,
    edited: NodeId,
    draft: NodeId,
    root: NodeId,
) -> KernelResult<Propagation> {
    if root == edited {
        return Ok(Propagation {
            root_id: draft,
            copied: BTreeMap::from([(edited, draft)]),
            rewired: Vec::new(),
        });
    }

    let path = path_to(ws, root, edited);
    let mut replacements: BTreeMap<NodeId, NodeId> = BTreeMap::from([(edited, draft)]);
    let mut rewired = Vec::new();

    for ancestor in path {
        let children = ws.children(ancestor);
        let substitutions: Vec<(NodeId, NodeId)> = children
            .iter()
            .filter_map(|child| replacements.get(child).map(|new| (*child, *new)))
            .collect();

        let (is_public, owner) = {
            let body = ws.body_of(ancestor)?;
            (body.is_public, body.author)
        };
        if is_public {
            let copy = branch_draft(ws, ancestor, author)?;
            for (old, new) in substitutions {
                ws.replace_child(copy, old, new)?;
            }
            replacements.insert(ancestor, copy);
        } else {
            if owner != author {
                return Err(KernelError::NotAuthorized { node: ancestor, author });
            }
            for (old, new) in substitutions {
                ws.replace_child(ancestor, old, new)?;
            }
            rewired.push(ancestor);
        }
    }

    let root_id = replacements.get(&root).copied().unwrap_or(root);
    replacements.remove(&edited);

    tracing::debug!(
        edited = %edited,
        root = %root,
        effective_root = %root_id,
        copied = replacements.len(),
        rewired = rewired.len(),
        "Propagated draft to root"
    );

    Ok(Propagation {
        root_id,
        copied: replacements,
        rewired,
    })
}

/// Nodes reachable from `root` that reach `target`, children before parents.
///
/// `target` itself is excluded. Back edges of a cycle are ignored.
pub fn path_to(ws: &WorkingSet, root: NodeId, target: NodeId) -> Vec<NodeId> {
    let mut reaches: BTreeMap<NodeId, bool> = BTreeMap::from([(target, true)]);
    let mut started: BTreeSet<NodeId> = BTreeSet::new();
    let mut order = Vec::new();
    let mut stack: Vec<(NodeId, bool)> = vec![(root, false)];

    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            let hit = ws
                .children(id)
                .iter()
                .any(|child| reaches.get(child).copied().unwrap_or(false));
            reaches.insert(id, hit);
            if hit {
                order.push(id);
            }
            continue;
        }
        if reaches.contains_key(&id) || !started.insert(id) {
            continue;
        }
        stack.push((id, true));
        for child in ws.children(id).into_iter().rev() {
            if !reaches.contains_key(&child) && !started.contains(&child) {
                stack.push((child, false));
            }
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArgumentBody, AuthorId, BodyFields, MajorVersion, NodeKind};
    use chrono::Utc;

    fn add_published(ws: &mut WorkingSet, kind: NodeKind, owner: AuthorId) -> NodeId {
        let major = ws.insert_major(MajorVersion::new(owner));
        let mut body = ArgumentBody::draft(BodyFields::new("t", ""), owner, major, ws.now());
        body.is_public = true;
        body.minor_version = 0;
        let body = ws.insert_body(body);
        let mut node = ArgumentNode::new(kind, body);
        node.finalized = true;
        ws.insert_node(node)
    }

    /// ```text
    ///        A
    ///       / \
    ///      B   C
    ///      |   |
    ///      I1  I2
    ///      |   |
    ///      S1  S2
    /// ```
    struct Fixture {
        ws: WorkingSet,
        a: NodeId,
        b: NodeId,
        c: NodeId,
        i1: NodeId,
        i2: NodeId,
        s1: NodeId,
    }

    fn fixture(owner: AuthorId) -> Fixture {
        let mut ws = WorkingSet::new(Utc::now());
        let s1 = add_published(&mut ws, NodeKind::Source, owner);
        let s2 = add_published(&mut ws, NodeKind::Source, owner);
        let i1 = add_published(&mut ws, NodeKind::Interpretation, owner);
        let i2 = add_published(&mut ws, NodeKind::Interpretation, owner);
        let b = add_published(&mut ws, NodeKind::Assertion, owner);
        let c = add_published(&mut ws, NodeKind::Assertion, owner);
        let a = add_published(&mut ws, NodeKind::Assertion, owner);
        ws.set_children(i1, &[s1]).unwrap();
        ws.set_children(i2, &[s2]).unwrap();
        ws.set_children(b, &[i1]).unwrap();
        ws.set_children(c, &[i2]).unwrap();
        ws.set_children(a, &[b, c]).unwrap();
        Fixture { ws, a, b, c, i1, i2, s1 }
    }

    #[test]
    fn test_path_to_is_post_order() {
        let f = fixture(AuthorId::generate());
        assert_eq!(path_to(&f.ws, f.a, f.s1), vec![f.i1, f.b, f.a]);
        assert!(path_to(&f.ws, f.c, f.s1).is_empty());
    }

    #[test]
    fn test_propagation_copies_only_the_path() {
        let author = AuthorId::generate();
        let mut f = fixture(author);
        let c_children = f.ws.children(f.c);

        let draft = branch_draft(&mut f.ws, f.s1, author).unwrap();
        let result = propagate_to_root(&mut f.ws, author, f.s1, draft, f.a).unwrap();

        assert_ne!(result.root_id, f.a);
        assert_eq!(result.copied.len(), 3);
        let new_b = result.copied[&f.b];
        let new_i1 = result.copied[&f.i1];

        // Path copies point down the new chain, in position.
        assert_eq!(f.ws.children(result.root_id), vec![new_b, f.c]);
        assert_eq!(f.ws.children(new_b), vec![new_i1]);
        assert_eq!(f.ws.children(new_i1), vec![draft]);

        // Sibling subtree is shared and untouched.
        assert_eq!(f.ws.children(f.c), c_children);
        assert_eq!(f.ws.dependents(f.c).len(), 2);
        assert_eq!(f.ws.children(f.i2), f.ws.node(f.i2).unwrap().graph_children());

        // Published originals keep their edges.
        assert_eq!(f.ws.children(f.a), vec![f.b, f.c]);
        assert!(!f.ws.node(f.a).unwrap().finalized);
        assert!(f.ws.node(f.c).unwrap().finalized);
    }

    #[test]
    fn test_root_is_the_edited_node() {
        let author = AuthorId::generate();
        let mut f = fixture(author);
        let draft = branch_draft(&mut f.ws, f.a, author).unwrap();
        let result = propagate_to_root(&mut f.ws, author, f.a, draft, f.a).unwrap();
        assert_eq!(result.root_id, draft);
    }

    #[test]
    fn test_unreachable_root_is_unchanged() {
        let author = AuthorId::generate();
        let mut f = fixture(author);
        let draft = branch_draft(&mut f.ws, f.s1, author).unwrap();
        let result = propagate_to_root(&mut f.ws, author, f.s1, draft, f.c).unwrap();
        assert_eq!(result.root_id, f.c);
        assert!(result.copied.is_empty());
    }

    #[test]
    fn test_existing_drafts_are_rewired_in_place() {
        let author = AuthorId::generate();
        let mut f = fixture(author);
        let draft_a = branch_draft(&mut f.ws, f.a, author).unwrap();

        let draft_s = branch_draft(&mut f.ws, f.s1, author).unwrap();
        let result = propagate_to_root(&mut f.ws, author, f.s1, draft_s, draft_a).unwrap();

        assert_eq!(result.root_id, draft_a);
        assert_eq!(result.rewired, vec![draft_a]);
        assert_eq!(f.ws.children(draft_a)[0], result.copied[&f.b]);
    }

    #[test]
    fn test_foreign_draft_on_path_is_refused() {
        let owner = AuthorId::generate();
        let mut f = fixture(owner);
        let draft_a = branch_draft(&mut f.ws, f.a, owner).unwrap();

        let intruder = AuthorId::generate();
        let draft_s = branch_draft(&mut f.ws, f.s1, intruder).unwrap();
        let err = propagate_to_root(&mut f.ws, intruder, f.s1, draft_s, draft_a).unwrap_err();
        assert!(matches!(err, KernelError::NotAuthorized { node, .. } if node == draft_a));
    }

    #[test]
    fn test_branching_twice_is_refused() {
        let author = AuthorId::generate();
        let mut f = fixture(author);
        branch_draft(&mut f.ws, f.b, author).unwrap();
        let err = branch_draft(&mut f.ws, f.b, author).unwrap_err();
        assert_eq!(err.rule(), Some(&RuleViolation::OutstandingDraft(f.b)));
    }
}
