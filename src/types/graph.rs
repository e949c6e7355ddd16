//! Read-only views handed back to callers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::canonical::canonical_hash_hex;
use super::body::ArgumentBody;
use super::edge::Edge;
use super::ids::NodeId;
use super::node::ArgumentNode;

/// A node together with its current body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeView {
    /// The node record.
    pub node: ArgumentNode,
    /// Its body.
    pub body: ArgumentBody,
}

impl NodeView {
    /// Pair a node with its body.
    pub fn new(node: ArgumentNode, body: ArgumentBody) -> Self {
        Self { node, body }
    }

    /// Shortcut for the node id.
    pub fn id(&self) -> NodeId {
        self.node.id
    }
}

/// A rendered neighbourhood of the argument graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphView {
    /// Nodes reachable from the root, sorted by id.
    pub nodes: Vec<NodeView>,
    /// Edges among those nodes, in canonical order.
    pub edges: BTreeSet<Edge>,
    /// The root the view was built around.
    pub root_id: NodeId,
    /// Nodes that build on the root and are visible to the viewer.
    pub consumers: Vec<NodeView>,
}

impl GraphView {
    /// Look up a node in the view.
    pub fn node(&self, id: NodeId) -> Option<&NodeView> {
        self.nodes.iter().find(|view| view.node.id == id)
    }

    /// The root node.
    pub fn root(&self) -> Option<&NodeView> {
        self.node(self.root_id)
    }

    /// Deterministic fingerprint of nodes and edges (consumers excluded).
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&(&self.nodes, &self.edges, self.root_id))
    }
}

/// Result of branching a draft off a published node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditResult {
    /// The new draft of the requested node.
    pub draft: NodeView,
    /// The root to display: unchanged, or a draft copy of the root.
    pub root_id: NodeId,
    /// Graph around `root_id`.
    pub graph: GraphView,
}
