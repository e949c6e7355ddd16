//! Edge types for the argument graph.

use serde::{Deserialize, Serialize};

use super::ids::NodeId;
use super::node::NodeKind;

/// Type of edge in the argument graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    /// Assertion supported by an assertion or interpretation.
    SupportedBy,
    /// Interpretation of a source.
    Interprets,
}

impl EdgeType {
    /// Parse edge type from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "supported_by" => Some(Self::SupportedBy),
            "interprets" => Some(Self::Interprets),
            _ => None,
        }
    }

    /// Edge type leaving a node of `kind`, if that kind has outgoing edges.
    pub fn for_parent(kind: NodeKind) -> Option<Self> {
        match kind {
            NodeKind::Assertion => Some(Self::SupportedBy),
            NodeKind::Interpretation => Some(Self::Interprets),
            NodeKind::Source => None,
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SupportedBy => write!(f, "supported_by"),
            Self::Interprets => write!(f, "interprets"),
        }
    }
}

/// Edge in the argument graph.
///
/// Directed from the consuming node (parent) to the node it builds on (child).
/// Implements `Ord` for deterministic ordering: (parent, child, edge_type).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Consuming node.
    pub parent: NodeId,
    /// Node being built on.
    pub child: NodeId,
    /// Type of edge.
    pub edge_type: EdgeType,
}

impl Edge {
    /// Create a new edge.
    pub fn new(parent: NodeId, child: NodeId, edge_type: EdgeType) -> Self {
        Self {
            parent,
            child,
            edge_type,
        }
    }
}

impl PartialOrd for Edge {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Edge {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.parent, self.child, self.edge_type).cmp(&(other.parent, other.child, other.edge_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_edge_ordering() {
        let id1 = NodeId::new(Uuid::from_u128(1));
        let id2 = NodeId::new(Uuid::from_u128(2));
        let id3 = NodeId::new(Uuid::from_u128(3));

        let e1 = Edge::new(id1, id2, EdgeType::SupportedBy);
        let e2 = Edge::new(id1, id3, EdgeType::SupportedBy);
        let e3 = Edge::new(id2, id3, EdgeType::Interprets);

        // Same parent, different child
        assert!(e1 < e2);
        // Different parent
        assert!(e1 < e3);
        assert!(e2 < e3);
    }

    #[test]
    fn test_edge_type_for_parent() {
        assert_eq!(EdgeType::for_parent(NodeKind::Assertion), Some(EdgeType::SupportedBy));
        assert_eq!(EdgeType::for_parent(NodeKind::Interpretation), Some(EdgeType::Interprets));
        assert_eq!(EdgeType::for_parent(NodeKind::Source), None);
        assert_eq!(EdgeType::from_str("INTERPRETS"), Some(EdgeType::Interprets));
    }
}
