//! In-memory content store for testing and embedding.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::canonical_hash_hex;
use crate::graph::LinkIndex;
use crate::types::{
    ArgumentBody, ArgumentNode, AuthorId, BodyId, MajorVersion, MajorVersionId, NodeId, NodeKind,
    StableId,
};
use super::{ChangeSet, CommitOutcome, ContentStore};

/// Error type for in-memory store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// A committed node would point at a body that does not exist.
    #[error("Node {node} references missing body {body}")]
    MissingBody {
        /// Node record.
        node: NodeId,
        /// Missing body.
        body: BodyId,
    },
}

#[derive(Debug, Default)]
struct StoreState {
    nodes: BTreeMap<NodeId, ArgumentNode>,
    bodies: BTreeMap<BodyId, ArgumentBody>,
    majors: BTreeMap<MajorVersionId, MajorVersion>,
    /// Adjacency mirror of node links.
    links: LinkIndex,
}

impl StoreState {
    fn stored_revisions_match(&self, changes: &ChangeSet) -> Result<(), String> {
        for node in &changes.nodes {
            let stored = self.nodes.get(&node.id).map(|n| n.revision).unwrap_or(0);
            if stored != node.revision {
                return Err(format!("node {} at revision {stored}, expected {}", node.id, node.revision));
            }
        }
        for body in &changes.bodies {
            let stored = self.bodies.get(&body.id).map(|b| b.revision).unwrap_or(0);
            if stored != body.revision {
                return Err(format!("body {} at revision {stored}, expected {}", body.id, body.revision));
            }
        }
        for major in &changes.majors {
            let stored = self.majors.get(&major.id).map(|m| m.revision).unwrap_or(0);
            if stored != major.revision {
                return Err(format!("major version {} at revision {stored}, expected {}", major.id, major.revision));
            }
        }
        for (id, revision) in &changes.deleted_nodes {
            match self.nodes.get(id) {
                Some(node) if node.revision == *revision => {}
                _ => return Err(format!("node {id} changed or vanished before delete")),
            }
        }
        // A deleted node's stored dependents must all be rewritten or deleted
        // in the same commit; any other one linked to it after the load.
        let rewritten: BTreeSet<NodeId> = changes
            .nodes
            .iter()
            .map(|node| node.id)
            .chain(changes.deleted_nodes.iter().map(|(id, _)| *id))
            .collect();
        for (id, _) in &changes.deleted_nodes {
            if let Some(parent) = self.links.dependents(*id).into_iter().find(|p| !rewritten.contains(p)) {
                return Err(format!("node {parent} linked to {id} before delete"));
            }
        }
        let deleted: BTreeSet<NodeId> = changes.deleted_nodes.iter().map(|(id, _)| *id).collect();
        for node in &changes.nodes {
            for child in node.graph_children() {
                let live = self.nodes.contains_key(&child) || changes.nodes.iter().any(|n| n.id == child);
                if !live || deleted.contains(&child) {
                    return Err(format!("node {} links to {child}, which is gone", node.id));
                }
            }
        }
        for (id, revision) in &changes.deleted_bodies {
            match self.bodies.get(id) {
                Some(body) if body.revision == *revision => {}
                _ => return Err(format!("body {id} changed or vanished before delete")),
            }
        }
        Ok(())
    }

    fn body_of(&self, node: &ArgumentNode) -> Option<&ArgumentBody> {
        self.bodies.get(&node.body_id)
    }
}

/// In-memory content store.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order and a single
/// write lock per commit for atomicity.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    state: RwLock<StoreState>,
}

impl InMemoryContentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.state.read().nodes.len()
    }

    /// Get number of bodies, including history.
    pub fn num_bodies(&self) -> usize {
        self.state.read().bodies.len()
    }

    /// Get all nodes.
    pub fn all_nodes(&self) -> Vec<ArgumentNode> {
        self.state.read().nodes.values().cloned().collect()
    }

    /// Fingerprint of every stored record.
    ///
    /// Two equal fingerprints mean the store content is identical, which is
    /// how tests assert that a failed operation left no trace.
    pub fn fingerprint(&self) -> String {
        let state = self.state.read();
        canonical_hash_hex(&(&state.nodes, &state.bodies, &state.majors))
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    type Error = InMemoryError;

    async fn get_node(&self, id: &NodeId) -> Result<Option<ArgumentNode>, Self::Error> {
        Ok(self.state.read().nodes.get(id).cloned())
    }

    async fn get_nodes(&self, ids: &[NodeId]) -> Result<Vec<ArgumentNode>, Self::Error> {
        let state = self.state.read();
        let wanted: BTreeSet<_> = ids.iter().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| state.nodes.get(id).cloned())
            .collect())
    }

    async fn find_by_stable_id(&self, stable_id: &StableId) -> Result<Option<ArgumentNode>, Self::Error> {
        Ok(self
            .state
            .read()
            .nodes
            .values()
            .find(|node| &node.stable_id == stable_id)
            .cloned())
    }

    async fn get_bodies(&self, ids: &[BodyId]) -> Result<Vec<ArgumentBody>, Self::Error> {
        let state = self.state.read();
        let wanted: BTreeSet<_> = ids.iter().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| state.bodies.get(id).cloned())
            .collect())
    }

    async fn get_major_version(&self, id: &MajorVersionId) -> Result<Option<MajorVersion>, Self::Error> {
        Ok(self.state.read().majors.get(id).cloned())
    }

    async fn load_subgraph(&self, root: &NodeId, max_depth: Option<usize>) -> Result<Vec<ArgumentNode>, Self::Error> {
        let state = self.state.read();
        let mut found: BTreeSet<NodeId> = BTreeSet::new();
        let mut frontier: Vec<(NodeId, usize)> = vec![(*root, 0)];

        // Breadth-first so a node reached by a short path keeps its depth.
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for (id, depth) in frontier {
                if !state.nodes.contains_key(&id) || !found.insert(id) {
                    continue;
                }
                if max_depth.map_or(true, |max| depth < max) {
                    for child in state.links.children(id) {
                        if !found.contains(child) {
                            next.push((*child, depth + 1));
                        }
                    }
                }
            }
            frontier = next;
        }

        Ok(found
            .into_iter()
            .filter_map(|id| state.nodes.get(&id).cloned())
            .collect())
    }

    async fn get_dependents(&self, id: &NodeId) -> Result<Vec<NodeId>, Self::Error> {
        Ok(self.state.read().links.dependents(*id))
    }

    async fn max_minor_version(&self, major: &MajorVersionId) -> Result<Option<i32>, Self::Error> {
        Ok(self
            .state
            .read()
            .bodies
            .values()
            .filter(|body| &body.major_version == major)
            .map(|body| body.minor_version)
            .max())
    }

    async fn root_nodes(&self) -> Result<Vec<NodeId>, Self::Error> {
        let state = self.state.read();
        Ok(state
            .nodes
            .values()
            .filter(|node| node.kind() == NodeKind::Assertion)
            .filter(|node| state.body_of(node).map_or(false, |b| b.is_public))
            .filter(|node| {
                state.links.dependents(node.id).iter().all(|parent| {
                    state.nodes.get(parent).map_or(true, |p| p.kind() != NodeKind::Assertion)
                })
            })
            .map(|node| node.id)
            .collect())
    }

    async fn draft_nodes(&self, author: &AuthorId) -> Result<Vec<NodeId>, Self::Error> {
        let state = self.state.read();
        Ok(state
            .nodes
            .values()
            .filter(|node| {
                state
                    .body_of(node)
                    .map_or(false, |b| !b.is_public && &b.author == author)
            })
            .map(|node| node.id)
            .collect())
    }

    async fn nodes_by_author(&self, author: &AuthorId) -> Result<Vec<NodeId>, Self::Error> {
        let state = self.state.read();
        Ok(state
            .nodes
            .values()
            .filter(|node| {
                state.body_of(node).map_or(false, |b| {
                    b.is_public
                        && state
                            .majors
                            .get(&b.major_version)
                            .map_or(false, |m| &m.author == author)
                })
            })
            .map(|node| node.id)
            .collect())
    }

    async fn nodes_in_major_version(&self, major: &MajorVersionId) -> Result<Vec<NodeId>, Self::Error> {
        let state = self.state.read();
        Ok(state
            .nodes
            .values()
            .filter(|node| state.body_of(node).map_or(false, |b| &b.major_version == major))
            .map(|node| node.id)
            .collect())
    }

    async fn body_history(&self, body: &BodyId, limit: usize) -> Result<Vec<ArgumentBody>, Self::Error> {
        let state = self.state.read();
        let mut history = Vec::new();
        let mut seen = BTreeSet::new();
        let mut cursor = Some(*body);
        while let Some(id) = cursor {
            if history.len() >= limit || !seen.insert(id) {
                break;
            }
            let Some(entry) = state.bodies.get(&id) else {
                break;
            };
            cursor = entry.preceded_by;
            history.push(entry.clone());
        }
        Ok(history)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<CommitOutcome, Self::Error> {
        let mut state = self.state.write();

        if let Err(reason) = state.stored_revisions_match(&changes) {
            tracing::warn!(reason = %reason, "Rejected conflicting commit");
            return Ok(CommitOutcome::Conflict { reason });
        }

        let deleted_bodies: BTreeSet<BodyId> = changes.deleted_bodies.iter().map(|(id, _)| *id).collect();
        for node in &changes.nodes {
            let body_present = changes.bodies.iter().any(|b| b.id == node.body_id)
                || (state.bodies.contains_key(&node.body_id) && !deleted_bodies.contains(&node.body_id));
            if !body_present {
                return Err(InMemoryError::MissingBody { node: node.id, body: node.body_id });
            }
        }

        let records = changes.len();
        let state = &mut *state;

        for (id, _) in changes.deleted_nodes {
            state.nodes.remove(&id);
            state.links.forget(id);
        }
        for (id, _) in changes.deleted_bodies {
            state.bodies.remove(&id);
        }
        for mut major in changes.majors {
            major.revision += 1;
            state.majors.insert(major.id, major);
        }
        for mut body in changes.bodies {
            body.revision += 1;
            state.bodies.insert(body.id, body);
        }
        for mut node in changes.nodes {
            node.revision += 1;
            state.links.set_children(node.id, &node.graph_children());
            state.nodes.insert(node.id, node);
        }

        tracing::debug!(records = records, "Committed change set");
        Ok(CommitOutcome::Committed { records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BodyFields, NodeLinks};
    use chrono::Utc;

    fn draft_triple(author: AuthorId) -> (ChangeSet, NodeId, NodeId) {
        let major = MajorVersion::new(author);
        let source_body = ArgumentBody::draft(BodyFields::new("s", ""), author, major.id, Utc::now());
        let interp_body = ArgumentBody::draft(BodyFields::new("i", ""), author, major.id, Utc::now());
        let source = ArgumentNode::new(NodeKind::Source, source_body.id);
        let mut interp = ArgumentNode::new(NodeKind::Interpretation, interp_body.id);
        interp.links = NodeLinks::Interpretation { source: Some(source.id) };
        let (source_id, interp_id) = (source.id, interp.id);
        let changes = ChangeSet {
            nodes: vec![source, interp],
            bodies: vec![source_body, interp_body],
            majors: vec![major],
            ..Default::default()
        };
        (changes, source_id, interp_id)
    }

    #[tokio::test]
    async fn test_commit_and_read_back() {
        let store = InMemoryContentStore::new();
        let (changes, source, interp) = draft_triple(AuthorId::generate());

        let outcome = store.commit(changes).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed { records: 5 });

        let loaded = store.get_node(&interp).await.unwrap().unwrap();
        assert_eq!(loaded.revision, 1);
        assert_eq!(store.get_dependents(&source).await.unwrap(), vec![interp]);

        let subgraph = store.load_subgraph(&interp, None).await.unwrap();
        assert_eq!(subgraph.len(), 2);
        let shallow = store.load_subgraph(&interp, Some(0)).await.unwrap();
        assert_eq!(shallow.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_revision_conflicts_and_writes_nothing() {
        let store = InMemoryContentStore::new();
        let (changes, _, interp) = draft_triple(AuthorId::generate());
        store.commit(changes.clone()).await.unwrap();
        let before = store.fingerprint();

        // Replaying the same inserts means every record is now stale.
        let outcome = store.commit(changes).await.unwrap();
        assert!(matches!(outcome, CommitOutcome::Conflict { .. }));
        assert_eq!(store.fingerprint(), before);

        let mut node = store.get_node(&interp).await.unwrap().unwrap();
        node.finalized = true;
        let fresh = ChangeSet { nodes: vec![node.clone()], ..Default::default() };
        assert!(matches!(store.commit(fresh).await.unwrap(), CommitOutcome::Committed { .. }));

        // Same revision again: someone else already bumped it.
        let stale = ChangeSet { nodes: vec![node], ..Default::default() };
        assert!(matches!(store.commit(stale).await.unwrap(), CommitOutcome::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_delete_conflicts_with_unseen_dependent() {
        let store = InMemoryContentStore::new();
        let (changes, source, interp) = draft_triple(AuthorId::generate());
        store.commit(changes).await.unwrap();
        let before = store.fingerprint();

        // The interpretation was linked to the source after this delete was planned.
        let delete = ChangeSet { deleted_nodes: vec![(source, 1)], ..Default::default() };
        assert!(matches!(store.commit(delete.clone()).await.unwrap(), CommitOutcome::Conflict { .. }));
        assert_eq!(store.fingerprint(), before);

        let mut stripped = store.get_node(&interp).await.unwrap().unwrap();
        stripped.links = NodeLinks::Interpretation { source: None };
        let delete = ChangeSet { nodes: vec![stripped], ..delete };
        assert!(matches!(store.commit(delete).await.unwrap(), CommitOutcome::Committed { .. }));
        assert!(store.get_dependents(&source).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_link_to_missing_node_conflicts() {
        let store = InMemoryContentStore::new();
        let author = AuthorId::generate();
        let (changes, source, _) = draft_triple(author);
        let major = changes.majors[0].id;
        store.commit(changes).await.unwrap();

        let body = ArgumentBody::draft(BodyFields::new("i2", ""), author, major, Utc::now());
        let mut late = ArgumentNode::new(NodeKind::Interpretation, body.id);
        late.links = NodeLinks::Interpretation { source: Some(NodeId::generate()) };
        let outcome = store
            .commit(ChangeSet { nodes: vec![late], bodies: vec![body], ..Default::default() })
            .await
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Conflict { .. }));
        assert_eq!(store.get_dependents(&source).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_body_is_an_error() {
        let store = InMemoryContentStore::new();
        let node = ArgumentNode::new(NodeKind::Source, BodyId::generate());
        let changes = ChangeSet { nodes: vec![node], ..Default::default() };
        assert!(store.commit(changes).await.is_err());
        assert_eq!(store.num_nodes(), 0);
    }

    #[tokio::test]
    async fn test_body_history_follows_chain() {
        let store = InMemoryContentStore::new();
        let author = AuthorId::generate();
        let major = MajorVersion::new(author);
        let first = ArgumentBody::draft(BodyFields::new("v0", ""), author, major.id, Utc::now());
        let second = first.branch(author, Utc::now());
        let third = second.branch(author, Utc::now());
        let (first_id, third_id) = (first.id, third.id);
        store
            .commit(ChangeSet { bodies: vec![first, second, third], majors: vec![major], ..Default::default() })
            .await
            .unwrap();

        let history = store.body_history(&third_id, 10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].id, first_id);
        assert_eq!(store.body_history(&third_id, 2).await.unwrap().len(), 2);
    }
}
