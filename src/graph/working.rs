//! Per-operation working graph.
//!
//! A `WorkingSet` is the transaction handle of one kernel operation: records
//! are loaded into it from the content store, mutated in memory, and turned
//! into a single [`ChangeSet`] at the end. Nothing reaches the store before
//! that, so an operation that fails part-way leaves no trace.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{KernelResult, NotFound};
use crate::store::ChangeSet;
use crate::types::{
    ArgumentBody, ArgumentNode, BodyId, MajorVersion, MajorVersionId, NodeId, NodeLinks, NodeView,
};
use super::links::LinkIndex;

/// Arena of loaded records plus the derived link index.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    nodes: BTreeMap<NodeId, ArgumentNode>,
    bodies: BTreeMap<BodyId, ArgumentBody>,
    majors: BTreeMap<MajorVersionId, MajorVersion>,
    links: LinkIndex,
    /// Highest minor version per major line as reported by the store.
    max_minor: BTreeMap<MajorVersionId, Option<i32>>,
    dirty_nodes: BTreeSet<NodeId>,
    dirty_bodies: BTreeSet<BodyId>,
    dirty_majors: BTreeSet<MajorVersionId>,
    /// Deleted records with the revision they were loaded at.
    deleted_nodes: BTreeMap<NodeId, u64>,
    deleted_bodies: BTreeMap<BodyId, u64>,
    now: DateTime<Utc>,
}

impl WorkingSet {
    /// Create an empty working set stamped with `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            nodes: BTreeMap::new(),
            bodies: BTreeMap::new(),
            majors: BTreeMap::new(),
            links: LinkIndex::new(),
            max_minor: BTreeMap::new(),
            dirty_nodes: BTreeSet::new(),
            dirty_bodies: BTreeSet::new(),
            dirty_majors: BTreeSet::new(),
            deleted_nodes: BTreeMap::new(),
            deleted_bodies: BTreeMap::new(),
            now,
        }
    }

    /// Operation timestamp.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    // ── Loading ────────────────────────────────────────────────────────────

    /// Add a record read from the store. Already-loaded records are kept.
    pub fn load_node(&mut self, node: ArgumentNode) {
        if self.nodes.contains_key(&node.id) || self.deleted_nodes.contains_key(&node.id) {
            return;
        }
        self.links.set_children(node.id, &node.graph_children());
        self.nodes.insert(node.id, node);
    }

    /// Add a body read from the store.
    pub fn load_body(&mut self, body: ArgumentBody) {
        if self.deleted_bodies.contains_key(&body.id) {
            return;
        }
        self.bodies.entry(body.id).or_insert(body);
    }

    /// Add a major version read from the store.
    pub fn load_major(&mut self, major: MajorVersion) {
        self.majors.entry(major.id).or_insert(major);
    }

    /// Record the store's answer to "max minor version within this line".
    pub fn record_max_minor(&mut self, major: MajorVersionId, max: Option<i32>) {
        self.max_minor.insert(major, max);
    }

    // ── Creating ───────────────────────────────────────────────────────────

    /// Add a new node record.
    pub fn insert_node(&mut self, node: ArgumentNode) -> NodeId {
        let id = node.id;
        self.links.set_children(id, &node.graph_children());
        self.nodes.insert(id, node);
        self.dirty_nodes.insert(id);
        id
    }

    /// Add a new body record.
    pub fn insert_body(&mut self, body: ArgumentBody) -> BodyId {
        let id = body.id;
        self.bodies.insert(id, body);
        self.dirty_bodies.insert(id);
        id
    }

    /// Add a new major version record.
    pub fn insert_major(&mut self, major: MajorVersion) -> MajorVersionId {
        let id = major.id;
        self.majors.insert(id, major);
        self.dirty_majors.insert(id);
        id
    }

    // ── Reading ────────────────────────────────────────────────────────────

    /// Whether the node is loaded (and not deleted).
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Whether the body is loaded.
    pub fn contains_body(&self, id: BodyId) -> bool {
        self.bodies.contains_key(&id)
    }

    /// Whether the major version is loaded.
    pub fn contains_major(&self, id: MajorVersionId) -> bool {
        self.majors.contains_key(&id)
    }

    /// A loaded node.
    pub fn node(&self, id: NodeId) -> KernelResult<&ArgumentNode> {
        self.nodes.get(&id).ok_or_else(|| NotFound::Node(id).into())
    }

    /// A loaded body.
    pub fn body(&self, id: BodyId) -> KernelResult<&ArgumentBody> {
        self.bodies.get(&id).ok_or_else(|| NotFound::Body(id).into())
    }

    /// The body currently attached to a node.
    pub fn body_of(&self, node: NodeId) -> KernelResult<&ArgumentBody> {
        let body_id = self.node(node)?.body_id;
        self.body(body_id)
    }

    /// A loaded major version.
    pub fn major(&self, id: MajorVersionId) -> KernelResult<&MajorVersion> {
        self.majors.get(&id).ok_or_else(|| NotFound::MajorVersion(id).into())
    }

    /// Ids of every loaded node.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Every loaded node, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &ArgumentNode> {
        self.nodes.values()
    }

    /// Bodies referenced by loaded nodes that are not loaded yet.
    pub fn unloaded_bodies(&self) -> Vec<BodyId> {
        let missing: BTreeSet<BodyId> = self
            .nodes
            .values()
            .map(|node| node.body_id)
            .filter(|id| !self.bodies.contains_key(id))
            .collect();
        missing.into_iter().collect()
    }

    /// Major versions referenced by loaded bodies that are not loaded yet.
    pub fn unloaded_majors(&self) -> Vec<MajorVersionId> {
        let missing: BTreeSet<MajorVersionId> = self
            .bodies
            .values()
            .map(|body| body.major_version)
            .filter(|id| !self.majors.contains_key(id))
            .collect();
        missing.into_iter().collect()
    }

    /// Ordered children of a node, from the link index.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.links.children(node).to_vec()
    }

    /// Loaded nodes that hold an edge to `node`.
    pub fn dependents(&self, node: NodeId) -> Vec<NodeId> {
        self.links.dependents(node)
    }

    /// The link index.
    pub fn links(&self) -> &LinkIndex {
        &self.links
    }

    /// The live draft branched from `node`, if one is loaded.
    pub fn outstanding_draft_of(&self, node: NodeId) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|candidate| candidate.previous_version == Some(node))
            .map(|candidate| candidate.id)
    }

    /// Highest minor version of a line, combining the store's answer with
    /// anything already assigned in this working set.
    pub fn max_minor(&self, major: MajorVersionId) -> Option<i32> {
        let stored = self.max_minor.get(&major).copied().flatten();
        let assigned = self
            .majors
            .get(&major)
            .map(|m| m.latest_minor)
            .filter(|minor| *minor >= 0);
        stored.max(assigned)
    }

    /// Node paired with its body.
    pub fn view(&self, node: NodeId) -> KernelResult<NodeView> {
        let record = self.node(node)?.clone();
        let body = self.body(record.body_id)?.clone();
        Ok(NodeView::new(record, body))
    }

    // ── Mutating ───────────────────────────────────────────────────────────

    /// Mutable access to a node; marks it dirty.
    pub fn node_mut(&mut self, id: NodeId) -> KernelResult<&mut ArgumentNode> {
        let node = self.nodes.get_mut(&id).ok_or(NotFound::Node(id))?;
        self.dirty_nodes.insert(id);
        Ok(node)
    }

    /// Mutable access to a body; marks it dirty.
    pub fn body_mut(&mut self, id: BodyId) -> KernelResult<&mut ArgumentBody> {
        let body = self.bodies.get_mut(&id).ok_or(NotFound::Body(id))?;
        self.dirty_bodies.insert(id);
        Ok(body)
    }

    /// Mutable access to the body attached to a node; marks it dirty.
    pub fn body_of_mut(&mut self, node: NodeId) -> KernelResult<&mut ArgumentBody> {
        let body_id = self.node(node)?.body_id;
        self.body_mut(body_id)
    }

    /// Mutable access to a major version; marks it dirty.
    pub fn major_mut(&mut self, id: MajorVersionId) -> KernelResult<&mut MajorVersion> {
        let major = self.majors.get_mut(&id).ok_or(NotFound::MajorVersion(id))?;
        self.dirty_majors.insert(id);
        Ok(major)
    }

    /// Replace a node's children, keeping record and index in step.
    pub fn set_children(&mut self, node: NodeId, children: &[NodeId]) -> KernelResult<()> {
        let kind = self.node(node)?.kind();
        let links = NodeLinks::from_children(kind, children);
        self.links.set_children(node, &links.graph_children());
        self.node_mut(node)?.links = links;
        Ok(())
    }

    /// Point `parent` at `new` wherever it pointed at `old`.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> KernelResult<bool> {
        self.node(parent)?;
        if !self.links.replace_child(parent, old, new) {
            return Ok(false);
        }
        self.sync_links(parent)?;
        Ok(true)
    }

    /// Delete a node record and purge it from the link index.
    ///
    /// Loaded dependents lose their edge to it.
    pub fn delete_node(&mut self, id: NodeId) -> KernelResult<ArgumentNode> {
        let node = self.nodes.remove(&id).ok_or(NotFound::Node(id))?;
        let dependents = self.links.dependents(id);
        self.links.forget(id);
        for parent in dependents {
            self.sync_links(parent)?;
        }
        self.dirty_nodes.remove(&id);
        if !node.is_new() {
            self.deleted_nodes.insert(id, node.revision);
        }
        Ok(node)
    }

    /// Delete a body record.
    pub fn delete_body(&mut self, id: BodyId) -> KernelResult<ArgumentBody> {
        let body = self.bodies.remove(&id).ok_or(NotFound::Body(id))?;
        self.dirty_bodies.remove(&id);
        if body.revision != 0 {
            self.deleted_bodies.insert(id, body.revision);
        }
        Ok(body)
    }

    /// Rewrite a node's persisted links from the index.
    fn sync_links(&mut self, node: NodeId) -> KernelResult<()> {
        let children = self.links.children(node).to_vec();
        let kind = self.node(node)?.kind();
        self.node_mut(node)?.links = NodeLinks::from_children(kind, &children);
        Ok(())
    }

    // ── Committing ─────────────────────────────────────────────────────────

    /// Whether anything would be written.
    pub fn is_dirty(&self) -> bool {
        !(self.dirty_nodes.is_empty()
            && self.dirty_bodies.is_empty()
            && self.dirty_majors.is_empty()
            && self.deleted_nodes.is_empty()
            && self.deleted_bodies.is_empty())
    }

    /// Collect every pending write into one change set.
    pub fn change_set(&self) -> ChangeSet {
        ChangeSet {
            nodes: self
                .dirty_nodes
                .iter()
                .filter_map(|id| self.nodes.get(id).cloned())
                .collect(),
            bodies: self
                .dirty_bodies
                .iter()
                .filter_map(|id| self.bodies.get(id).cloned())
                .collect(),
            majors: self
                .dirty_majors
                .iter()
                .filter_map(|id| self.majors.get(id).cloned())
                .collect(),
            deleted_nodes: self.deleted_nodes.iter().map(|(id, rev)| (*id, *rev)).collect(),
            deleted_bodies: self.deleted_bodies.iter().map(|(id, rev)| (*id, *rev)).collect(),
        }
    }
}
