//! Content storage backends.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{
    ArgumentBody, ArgumentNode, AuthorId, BodyId, MajorVersion, MajorVersionId, NodeId, StableId,
};

/// Every write of one kernel operation.
///
/// Records carry the revision they were loaded at (0 for new records). A
/// store applies the whole set or none of it: if any stored revision differs
/// from the carried one, the commit is rejected as a conflict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Node upserts.
    pub nodes: Vec<ArgumentNode>,
    /// Body upserts.
    pub bodies: Vec<ArgumentBody>,
    /// Major version upserts.
    pub majors: Vec<MajorVersion>,
    /// Node deletions with the revision they were loaded at.
    pub deleted_nodes: Vec<(NodeId, u64)>,
    /// Body deletions with the revision they were loaded at.
    pub deleted_bodies: Vec<(BodyId, u64)>,
}

impl ChangeSet {
    /// Whether there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.bodies.is_empty()
            && self.majors.is_empty()
            && self.deleted_nodes.is_empty()
            && self.deleted_bodies.is_empty()
    }

    /// Total number of record writes.
    pub fn len(&self) -> usize {
        self.nodes.len()
            + self.bodies.len()
            + self.majors.len()
            + self.deleted_nodes.len()
            + self.deleted_bodies.len()
    }
}

/// Result of a conditional commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Everything was written.
    Committed {
        /// Number of records written or deleted.
        records: usize,
    },
    /// Nothing was written because a record changed underneath.
    Conflict {
        /// Which record disagreed.
        reason: String,
    },
}

/// Trait for content storage backends.
///
/// Implementations must guarantee deterministic ordering of results and
/// all-or-nothing commits. All methods are async to support async database
/// access.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync;

    /// Fetch a node by ID.
    async fn get_node(&self, id: &NodeId) -> Result<Option<ArgumentNode>, Self::Error>;

    /// Fetch multiple nodes by ID (ordered by NodeId, missing ids skipped).
    async fn get_nodes(&self, ids: &[NodeId]) -> Result<Vec<ArgumentNode>, Self::Error>;

    /// Fetch a node by its public handle.
    async fn find_by_stable_id(&self, stable_id: &StableId) -> Result<Option<ArgumentNode>, Self::Error>;

    /// Fetch multiple bodies by ID (ordered by BodyId, missing ids skipped).
    async fn get_bodies(&self, ids: &[BodyId]) -> Result<Vec<ArgumentBody>, Self::Error>;

    /// Fetch a major version by ID.
    async fn get_major_version(&self, id: &MajorVersionId) -> Result<Option<MajorVersion>, Self::Error>;

    /// Nodes reachable from `root` within `max_depth` hops, root included.
    ///
    /// `None` means unbounded. Ordered by NodeId.
    async fn load_subgraph(&self, root: &NodeId, max_depth: Option<usize>) -> Result<Vec<ArgumentNode>, Self::Error>;

    /// Nodes holding an edge to `id` (ordered by NodeId).
    async fn get_dependents(&self, id: &NodeId) -> Result<Vec<NodeId>, Self::Error>;

    /// Highest minor version among bodies of a major version, drafts included.
    async fn max_minor_version(&self, major: &MajorVersionId) -> Result<Option<i32>, Self::Error>;

    /// Published assertions that no assertion builds on.
    async fn root_nodes(&self) -> Result<Vec<NodeId>, Self::Error>;

    /// Nodes whose body is an unpublished draft by `author`.
    async fn draft_nodes(&self, author: &AuthorId) -> Result<Vec<NodeId>, Self::Error>;

    /// Published nodes whose content line was started by `author`.
    async fn nodes_by_author(&self, author: &AuthorId) -> Result<Vec<NodeId>, Self::Error>;

    /// Live nodes whose current body belongs to `major`.
    async fn nodes_in_major_version(&self, major: &MajorVersionId) -> Result<Vec<NodeId>, Self::Error>;

    /// `body` followed by its preceded-by chain, newest first, at most `limit`.
    async fn body_history(&self, body: &BodyId, limit: usize) -> Result<Vec<ArgumentBody>, Self::Error>;

    /// Apply a change set atomically with revision checks.
    ///
    /// Also a conflict: deleting a node that still has a stored dependent the
    /// change set does not rewrite or delete, and writing a link to a node
    /// that no longer exists.
    async fn commit(&self, changes: ChangeSet) -> Result<CommitOutcome, Self::Error>;
}

pub use memory::InMemoryContentStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresContentStore};
