//! Grounding validation.
//!
//! A subtree is grounded when every path through support and interpretation
//! edges ends at a source. The walk keeps a visited set so a cyclic graph,
//! which the link rules should never produce, still terminates.

use std::collections::BTreeSet;

use crate::error::{KernelResult, RuleViolation};
use crate::types::{NodeId, NodeKind};
use super::working::WorkingSet;

/// Outcome of a grounding walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundingReport {
    /// Node the walk started from.
    pub root: NodeId,
    /// Reachable non-source nodes with no outgoing edges, sorted.
    pub ungrounded: Vec<NodeId>,
    /// Number of distinct nodes visited.
    pub visited: usize,
}

impl GroundingReport {
    /// Whether every path ends at a source.
    pub fn is_grounded(&self) -> bool {
        self.ungrounded.is_empty()
    }

    /// Turn a failed report into the matching rules violation.
    pub fn into_result(self) -> Result<(), RuleViolation> {
        if self.is_grounded() {
            Ok(())
        } else {
            Err(RuleViolation::Ungrounded {
                root: self.root,
                offending: self.ungrounded,
            })
        }
    }
}

/// Walk everything reachable from `root` and report ungrounded leaves.
///
/// Every reachable node must be loaded in the working set.
pub fn check_grounding(ws: &WorkingSet, root: NodeId) -> KernelResult<GroundingReport> {
    let mut visited: BTreeSet<NodeId> = BTreeSet::new();
    let mut ungrounded: BTreeSet<NodeId> = BTreeSet::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let node = ws.node(id)?;
        if node.kind() == NodeKind::Source {
            continue;
        }
        if !node.links.is_locally_grounded() {
            ungrounded.insert(id);
            continue;
        }
        for child in node.graph_children() {
            if !visited.contains(&child) {
                stack.push(child);
            }
        }
    }

    Ok(GroundingReport {
        root,
        ungrounded: ungrounded.into_iter().collect(),
        visited: visited.len(),
    })
}

/// Shortcut for [`check_grounding`] when only the verdict matters.
pub fn is_grounded(ws: &WorkingSet, root: NodeId) -> KernelResult<bool> {
    Ok(check_grounding(ws, root)?.is_grounded())
}

/// Whether `target` is reachable from `from` (inclusive).
pub fn reaches(ws: &WorkingSet, from: NodeId, target: NodeId) -> bool {
    let mut visited: BTreeSet<NodeId> = BTreeSet::new();
    let mut stack = vec![from];
    while let Some(id) = stack.pop() {
        if id == target {
            return true;
        }
        if !visited.insert(id) {
            continue;
        }
        stack.extend(ws.children(id));
    }
    false
}
