//! Error types for kernel operations.
//!
//! Rules violations, authorization failures and missing records are distinct
//! variants so the request layer can map them to different responses. Store
//! failures are carried as strings so the error stays backend-agnostic.

use crate::types::{AuthorId, BodyId, MajorVersionId, NodeId, NodeKind, StableId};

/// Result alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Error type for kernel operations.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// The operation would break a graph or lifecycle rule.
    #[error("Rules violation: {0}")]
    Rules(#[from] RuleViolation),
    /// The acting identity does not own the draft.
    #[error("Author {author} is not allowed to modify node {node}")]
    NotAuthorized {
        /// Node the author tried to touch.
        node: NodeId,
        /// Acting identity.
        author: AuthorId,
    },
    /// A referenced record does not resolve.
    #[error("Not found: {0}")]
    NotFound(#[from] NotFound),
    /// The commit lost a race with a concurrent writer.
    #[error("Concurrent modification: {0}")]
    Conflict(String),
    /// Backend failure.
    #[error("Store error: {0}")]
    Store(String),
}

impl KernelError {
    /// Create a store error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Store(e.to_string())
    }

    /// Whether this is a rules violation.
    pub fn is_rules_violation(&self) -> bool {
        matches!(self, Self::Rules(_))
    }

    /// The rules violation, if this is one.
    pub fn rule(&self) -> Option<&RuleViolation> {
        match self {
            Self::Rules(rule) => Some(rule),
            _ => None,
        }
    }
}

/// Graph and lifecycle rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleViolation {
    /// Some reachable non-source node has nothing underneath it.
    #[error("The roots of node {root} do not all end in sources (ungrounded: {offending:?})")]
    Ungrounded {
        /// Node whose subtree was checked.
        root: NodeId,
        /// Reachable non-source nodes without outgoing edges.
        offending: Vec<NodeId>,
    },
    /// Published content is immutable; branch off a draft instead.
    #[error("Node {0} is published; split off a private draft before editing")]
    PublishedImmutable(NodeId),
    /// Nothing new to publish.
    #[error("Node {0} is already finalized; no new changes to publish")]
    AlreadyFinalized(NodeId),
    /// Drafts are branched from published nodes only.
    #[error("Node {0} is already a draft; a new draft must branch off published content")]
    AlreadyDraft(NodeId),
    /// Only drafts can be discarded.
    #[error("Node {0} is not a draft and cannot be discarded")]
    NotADraft(NodeId),
    /// A published node may have one outstanding draft at a time.
    #[error("Node {0} already has an outstanding draft")]
    OutstandingDraft(NodeId),
    /// The body is flagged non-editable.
    #[error("Node {0} cannot be edited")]
    NotEditable(NodeId),
    /// Assertions build on assertions or interpretations, never on sources.
    #[error("An assertion cannot link directly to source {0}")]
    AssertionLinksSource(NodeId),
    /// Child of the wrong kind for the parent.
    #[error("A {parent} cannot link to {child_kind} {child}")]
    InvalidLink {
        /// Parent kind.
        parent: NodeKind,
        /// Offending child.
        child: NodeId,
        /// Its kind.
        child_kind: NodeKind,
    },
    /// Links may target public content or the author's own drafts.
    #[error("Node {0} is someone else's draft and cannot be linked")]
    ForeignDraftLink(NodeId),
    /// The link would make the support graph cyclic.
    #[error("Linking {child} under {parent} would create a cycle")]
    Cycle {
        /// Node gaining the link.
        parent: NodeId,
        /// Child that already reaches the parent.
        child: NodeId,
    },
    /// The node is not of the kind the operation edits.
    #[error("Node {node} is a {actual}, not a {expected}")]
    WrongKind {
        /// Node addressed.
        node: NodeId,
        /// Kind the operation edits.
        expected: NodeKind,
        /// Kind it actually has.
        actual: NodeKind,
    },
    /// A draft cannot be discarded while published content points at it.
    #[error("Draft {draft} is referenced by published node {dependent}")]
    PublishedDependent {
        /// Draft being discarded.
        draft: NodeId,
        /// Published consumer.
        dependent: NodeId,
    },
}

/// A reference that did not resolve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFound {
    /// Node id.
    #[error("node {0}")]
    Node(NodeId),
    /// Stable id.
    #[error("node with stable id {0}")]
    StableId(StableId),
    /// Body id.
    #[error("body {0}")]
    Body(BodyId),
    /// Major version id.
    #[error("major version {0}")]
    MajorVersion(MajorVersionId),
}
