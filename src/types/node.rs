//! Node records and the closed set of node kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{BodyId, NodeId, StableId};

/// Type tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A claim supported by other assertions or interpretations.
    Assertion,
    /// A gloss on exactly one source.
    Interpretation,
    /// A cited source. Always a leaf.
    Source,
}

impl NodeKind {
    /// Parse node kind from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "assertion" => Some(Self::Assertion),
            "interpretation" => Some(Self::Interpretation),
            "source" => Some(Self::Source),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assertion => write!(f, "assertion"),
            Self::Interpretation => write!(f, "interpretation"),
            Self::Source => write!(f, "source"),
        }
    }
}

/// Outgoing edges of a node, tagged by kind.
///
/// Per-kind behavior is dispatched on the tag:
/// - `Assertion`: N ordered supporting children, every one must ground.
/// - `Interpretation`: at most one source link; grounded once it has one.
/// - `Source`: no children, always grounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeLinks {
    /// Supporting children in author order.
    Assertion {
        /// Assertions or interpretations that support this claim.
        supporting: Vec<NodeId>,
    },
    /// Link to the interpreted source, if set yet.
    Interpretation {
        /// The interpreted source.
        source: Option<NodeId>,
    },
    /// Leaf.
    Source,
}

impl NodeLinks {
    /// Empty link set for a kind.
    pub fn empty(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Assertion => Self::Assertion { supporting: Vec::new() },
            NodeKind::Interpretation => Self::Interpretation { source: None },
            NodeKind::Source => Self::Source,
        }
    }

    /// Build a link set of `kind` from an ordered child list.
    ///
    /// Interpretations keep only the first child; sources ignore children.
    pub fn from_children(kind: NodeKind, children: &[NodeId]) -> Self {
        match kind {
            NodeKind::Assertion => Self::Assertion { supporting: children.to_vec() },
            NodeKind::Interpretation => Self::Interpretation { source: children.first().copied() },
            NodeKind::Source => Self::Source,
        }
    }

    /// The type tag.
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Assertion { .. } => NodeKind::Assertion,
            Self::Interpretation { .. } => NodeKind::Interpretation,
            Self::Source => NodeKind::Source,
        }
    }

    /// Outgoing edges in order.
    pub fn graph_children(&self) -> Vec<NodeId> {
        match self {
            Self::Assertion { supporting } => supporting.clone(),
            Self::Interpretation { source } => source.iter().copied().collect(),
            Self::Source => Vec::new(),
        }
    }

    /// Whether this node, on its own, terminates or continues a grounded path.
    ///
    /// A source terminates a path; anything else must have an outgoing edge.
    pub fn is_locally_grounded(&self) -> bool {
        match self {
            Self::Assertion { supporting } => !supporting.is_empty(),
            Self::Interpretation { source } => source.is_some(),
            Self::Source => true,
        }
    }

    /// Children that a publish of this node must publish first if still drafts.
    pub fn cascade_targets(&self) -> Vec<NodeId> {
        self.graph_children()
    }

    /// The kind a child of this node must have, if the link is legal.
    pub fn accepts_child(&self, child: NodeKind) -> bool {
        match self {
            Self::Assertion { .. } => matches!(child, NodeKind::Assertion | NodeKind::Interpretation),
            Self::Interpretation { .. } => child == NodeKind::Source,
            Self::Source => false,
        }
    }
}

/// A vertex of the argument graph.
///
/// Identity (`id`, `stable_id`, kind) is immutable; the body reference and the
/// link set are not. Dependents are derived and never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentNode {
    /// Record identifier.
    pub id: NodeId,
    /// Public handle.
    pub stable_id: StableId,
    /// Outgoing edges, tagged by kind.
    pub links: NodeLinks,
    /// The body currently attached.
    pub body_id: BodyId,
    /// The published node this draft will replace on publish.
    pub previous_version: Option<NodeId>,
    /// Published, with no outstanding draft that will replace it.
    pub finalized: bool,
    /// Conditional-write counter, maintained by the content store.
    pub revision: u64,
}

impl ArgumentNode {
    /// Create a fresh, unsaved node with no links.
    pub fn new(kind: NodeKind, body_id: BodyId) -> Self {
        Self {
            id: NodeId::generate(),
            stable_id: StableId::generate(),
            links: NodeLinks::empty(kind),
            body_id,
            previous_version: None,
            finalized: false,
            revision: 0,
        }
    }

    /// The type tag.
    pub fn kind(&self) -> NodeKind {
        self.links.kind()
    }

    /// Outgoing edges in order.
    pub fn graph_children(&self) -> Vec<NodeId> {
        self.links.graph_children()
    }

    /// Whether this record has never been committed.
    pub fn is_new(&self) -> bool {
        self.revision == 0
    }
}
