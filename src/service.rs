//! The external operation surface.
//!
//! Every mutating call follows the same shape:
//!
//! 1. Load every record the operation can touch into a fresh [`WorkingSet`]
//! 2. Run the [`VersionManager`] over it synchronously
//! 3. Commit the resulting change set in one conditional store call
//!
//! A failure in step 2 discards the working set, so the store is left exactly
//! as it was. A conflict in step 3 surfaces as [`KernelError::Conflict`].

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult, NotFound, RuleViolation};
use crate::graph::WorkingSet;
use crate::store::{CommitOutcome, ContentStore};
use crate::types::{
    ArgumentBody, AssertionInput, AuthorId, BodyFields, Edge, EdgeType, EditResult, GraphView,
    InterpretationInput, MajorVersionId, NodeId, NodeKind, NodeView, SourceInput, StableId,
};
use crate::version::VersionManager;

/// Argument graph operations over a content store.
pub struct ArgumentService<S: ContentStore> {
    store: Arc<S>,
    config: KernelConfig,
}

impl<S: ContentStore + 'static> ArgumentService<S> {
    /// Create a service over `store`.
    pub fn new(store: Arc<S>, config: KernelConfig) -> Self {
        Self { store, config }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    // ── Creating and editing ───────────────────────────────────────────────

    /// Create an assertion draft supported by the given nodes.
    pub async fn create_assertion(&self, author: AuthorId, input: AssertionInput) -> KernelResult<NodeView> {
        self.create(author, NodeKind::Assertion, input.fields(), &input.supporting).await
    }

    /// Create an interpretation draft of an optional source.
    pub async fn create_interpretation(&self, author: AuthorId, input: InterpretationInput) -> KernelResult<NodeView> {
        self.create(author, NodeKind::Interpretation, input.fields(), &input.children()).await
    }

    /// Create a source draft.
    pub async fn create_source(&self, author: AuthorId, input: SourceInput) -> KernelResult<NodeView> {
        self.create(author, NodeKind::Source, input.fields(), &[]).await
    }

    async fn create(
        &self,
        author: AuthorId,
        kind: NodeKind,
        fields: BodyFields,
        children: &[NodeId],
    ) -> KernelResult<NodeView> {
        let mut ws = WorkingSet::new(Utc::now());
        self.load_nodes(&mut ws, children).await?;
        self.load_bodies(&mut ws).await?;

        let node_id = VersionManager::new(&mut ws, author).create(kind, fields, children)?;
        self.commit(&ws, "create").await?;

        tracing::info!(node_id = %node_id, kind = %kind, author = %author, "Created draft");
        self.get_node(node_id).await
    }

    /// Replace the content and support of an assertion draft.
    pub async fn edit_assertion(&self, author: AuthorId, node_id: NodeId, input: AssertionInput) -> KernelResult<NodeView> {
        self.edit(author, node_id, NodeKind::Assertion, input.fields(), Some(input.supporting.as_slice()))
            .await
    }

    /// Replace the content and source of an interpretation draft.
    pub async fn edit_interpretation(
        &self,
        author: AuthorId,
        node_id: NodeId,
        input: InterpretationInput,
    ) -> KernelResult<NodeView> {
        self.edit(author, node_id, NodeKind::Interpretation, input.fields(), Some(input.children().as_slice()))
            .await
    }

    /// Replace the content of a source draft.
    pub async fn edit_source(&self, author: AuthorId, node_id: NodeId, input: SourceInput) -> KernelResult<NodeView> {
        self.edit(author, node_id, NodeKind::Source, input.fields(), None).await
    }

    async fn edit(
        &self,
        author: AuthorId,
        node_id: NodeId,
        expected: NodeKind,
        fields: BodyFields,
        children: Option<&[NodeId]>,
    ) -> KernelResult<NodeView> {
        let mut ws = WorkingSet::new(Utc::now());
        self.load_nodes(&mut ws, &[node_id]).await?;

        let actual = ws.node(node_id)?.kind();
        if actual != expected {
            return Err(RuleViolation::WrongKind { node: node_id, expected, actual }.into());
        }

        // Cycle checks walk down from every proposed child.
        for child in children.unwrap_or_default() {
            self.load_nodes(&mut ws, &[*child]).await?;
            self.load_subgraph(&mut ws, *child, None).await?;
        }
        self.load_bodies(&mut ws).await?;
        self.load_majors(&mut ws).await?;

        VersionManager::new(&mut ws, author).edit(node_id, fields, children)?;
        self.commit(&ws, "edit").await?;

        tracing::info!(node_id = %node_id, author = %author, "Edited draft");
        self.get_node(node_id).await
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// Branch a private draft off a published node, propagated up to `root_id`.
    pub async fn make_draft(&self, author: AuthorId, node_id: NodeId, root_id: NodeId) -> KernelResult<EditResult> {
        let mut ws = WorkingSet::new(Utc::now());
        self.load_nodes(&mut ws, &[root_id, node_id]).await?;
        self.load_subgraph(&mut ws, root_id, None).await?;
        self.load_bodies(&mut ws).await?;

        let (draft, propagation) = VersionManager::new(&mut ws, author).make_draft(node_id, root_id)?;
        self.commit(&ws, "make_draft").await?;

        tracing::info!(
            node_id = %node_id,
            draft_id = %draft,
            root_id = %root_id,
            effective_root = %propagation.root_id,
            copied = propagation.copied.len(),
            author = %author,
            "Made draft"
        );

        Ok(EditResult {
            draft: self.get_node(draft).await?,
            root_id: propagation.root_id,
            graph: self.get_graph(propagation.root_id, Some(author)).await?,
        })
    }

    /// Publish a draft (and every unpublished draft under it).
    ///
    /// Returns the published node, which keeps the id of the previous version
    /// when the draft was merged into one.
    pub async fn publish(&self, author: AuthorId, node_id: NodeId) -> KernelResult<NodeView> {
        let mut ws = WorkingSet::new(Utc::now());
        self.load_for_publish(&mut ws, node_id).await?;

        let result = VersionManager::new(&mut ws, author).publish(node_id)?;
        self.commit(&ws, "publish").await?;

        tracing::info!(node_id = %node_id, result = %result, author = %author, "Published node");
        self.get_node(result).await
    }

    /// Publish a draft and return the graph rooted at the published node.
    pub async fn publish_node(&self, author: AuthorId, node_id: NodeId) -> KernelResult<GraphView> {
        let published = self.publish(author, node_id).await?;
        self.get_graph(published.id(), Some(author)).await
    }

    /// Delete an unpublished draft.
    pub async fn discard_draft(&self, author: AuthorId, node_id: NodeId) -> KernelResult<()> {
        let mut ws = WorkingSet::new(Utc::now());
        self.load_nodes(&mut ws, &[node_id]).await?;
        self.load_dependents(&mut ws, node_id).await?;
        if let Some(previous) = ws.node(node_id)?.previous_version {
            self.load_nodes(&mut ws, &[previous]).await?;
        }
        self.load_bodies(&mut ws).await?;

        VersionManager::new(&mut ws, author).discard(node_id)?;
        self.commit(&ws, "discard").await?;

        tracing::info!(node_id = %node_id, author = %author, "Discarded draft");
        Ok(())
    }

    // ── Reading ────────────────────────────────────────────────────────────

    /// A node with its current body.
    pub async fn get_node(&self, node_id: NodeId) -> KernelResult<NodeView> {
        let node = self
            .store
            .get_node(&node_id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or(NotFound::Node(node_id))?;
        let body = self
            .store
            .get_bodies(&[node.body_id])
            .await
            .map_err(KernelError::from_store)?
            .into_iter()
            .next()
            .ok_or(NotFound::Body(node.body_id))?;
        Ok(NodeView::new(node, body))
    }

    /// A node by its public handle.
    pub async fn get_node_by_stable_id(&self, stable_id: &StableId) -> KernelResult<NodeView> {
        let node = self
            .store
            .find_by_stable_id(stable_id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or_else(|| NotFound::StableId(stable_id.clone()))?;
        self.get_node(node.id).await
    }

    /// The neighbourhood of `root_id` down to the configured depth.
    ///
    /// Consumers are the root's dependents that are public or drafts of
    /// `viewer`.
    pub async fn get_graph(&self, root_id: NodeId, viewer: Option<AuthorId>) -> KernelResult<GraphView> {
        let mut ws = WorkingSet::new(Utc::now());
        self.load_nodes(&mut ws, &[root_id]).await?;
        self.load_subgraph(&mut ws, root_id, Some(self.config.graph_depth)).await?;
        self.load_bodies(&mut ws).await?;

        let dependents = self.store.get_dependents(&root_id).await.map_err(KernelError::from_store)?;
        let consumers = self
            .views(dependents)
            .await?
            .into_iter()
            .filter(|view| view.body.is_public || Some(view.body.author) == viewer)
            .collect();

        let graph = graph_view(&ws, root_id, consumers)?;
        tracing::debug!(
            root_id = %root_id,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            consumers = graph.consumers.len(),
            "Built graph view"
        );
        Ok(graph)
    }

    /// Published assertions that no assertion builds on.
    pub async fn get_root_nodes(&self) -> KernelResult<Vec<NodeView>> {
        let ids = self.store.root_nodes().await.map_err(KernelError::from_store)?;
        self.views(ids).await
    }

    /// Every unpublished draft of `author`.
    pub async fn get_draft_nodes(&self, author: AuthorId) -> KernelResult<Vec<NodeView>> {
        let ids = self.store.draft_nodes(&author).await.map_err(KernelError::from_store)?;
        self.views(ids).await
    }

    /// Published nodes in content lines started by `author`.
    pub async fn get_nodes_published_by_author(&self, author: AuthorId) -> KernelResult<Vec<NodeView>> {
        let ids = self.store.nodes_by_author(&author).await.map_err(KernelError::from_store)?;
        self.views(ids).await
    }

    /// Live nodes whose body belongs to `major`.
    pub async fn get_nodes_in_major_version(&self, major: MajorVersionId) -> KernelResult<Vec<NodeView>> {
        let ids = self
            .store
            .nodes_in_major_version(&major)
            .await
            .map_err(KernelError::from_store)?;
        self.views(ids).await
    }

    /// The node's body and the bodies it was branched from, newest first.
    pub async fn get_edit_history(&self, node_id: NodeId) -> KernelResult<Vec<ArgumentBody>> {
        let node = self
            .store
            .get_node(&node_id)
            .await
            .map_err(KernelError::from_store)?
            .ok_or(NotFound::Node(node_id))?;
        self.store
            .body_history(&node.body_id, self.config.history_limit)
            .await
            .map_err(KernelError::from_store)
    }

    // ── Loading ────────────────────────────────────────────────────────────

    /// Everything a publish of `node_id` can touch.
    ///
    /// That is the whole subtree, the previous versions of drafts in it, every
    /// dependent of those drafts (merge redirects them), all bodies and lines,
    /// and the highest minor version of each line being published into.
    async fn load_for_publish(&self, ws: &mut WorkingSet, node_id: NodeId) -> KernelResult<()> {
        self.load_nodes(ws, &[node_id]).await?;
        self.load_subgraph(ws, node_id, None).await?;
        self.load_bodies(ws).await?;

        let drafts: Vec<(NodeId, Option<NodeId>)> = ws
            .nodes()
            .filter(|node| ws.body(node.body_id).map_or(false, |body| !body.is_public))
            .map(|node| (node.id, node.previous_version))
            .collect();

        for (draft, previous) in &drafts {
            if let Some(previous) = previous {
                self.load_nodes(ws, &[*previous]).await?;
                self.load_dependents(ws, *draft).await?;
            }
        }
        self.load_bodies(ws).await?;
        self.load_majors(ws).await?;

        let lines: BTreeSet<MajorVersionId> = drafts
            .iter()
            .filter_map(|(draft, _)| ws.body_of(*draft).ok().map(|body| body.major_version))
            .collect();
        for line in lines {
            let max = self
                .store
                .max_minor_version(&line)
                .await
                .map_err(KernelError::from_store)?;
            ws.record_max_minor(line, max);
        }
        Ok(())
    }

    /// Load nodes by id; every id must resolve.
    async fn load_nodes(&self, ws: &mut WorkingSet, ids: &[NodeId]) -> KernelResult<()> {
        let wanted: Vec<NodeId> = ids.iter().copied().filter(|id| !ws.contains_node(*id)).collect();
        if wanted.is_empty() {
            return Ok(());
        }
        let found = self.store.get_nodes(&wanted).await.map_err(KernelError::from_store)?;
        if let Some(missing) = wanted.iter().find(|id| !found.iter().any(|node| node.id == **id)) {
            return Err(NotFound::Node(*missing).into());
        }
        for node in found {
            ws.load_node(node);
        }
        Ok(())
    }

    async fn load_subgraph(&self, ws: &mut WorkingSet, root: NodeId, depth: Option<usize>) -> KernelResult<()> {
        let nodes = self
            .store
            .load_subgraph(&root, depth)
            .await
            .map_err(KernelError::from_store)?;
        for node in nodes {
            ws.load_node(node);
        }
        Ok(())
    }

    async fn load_dependents(&self, ws: &mut WorkingSet, node_id: NodeId) -> KernelResult<()> {
        let dependents = self
            .store
            .get_dependents(&node_id)
            .await
            .map_err(KernelError::from_store)?;
        self.load_nodes(ws, &dependents).await
    }

    async fn load_bodies(&self, ws: &mut WorkingSet) -> KernelResult<()> {
        let missing = ws.unloaded_bodies();
        if missing.is_empty() {
            return Ok(());
        }
        let bodies = self.store.get_bodies(&missing).await.map_err(KernelError::from_store)?;
        for body in bodies {
            ws.load_body(body);
        }
        match ws.unloaded_bodies().first() {
            Some(missing) => Err(NotFound::Body(*missing).into()),
            None => Ok(()),
        }
    }

    async fn load_majors(&self, ws: &mut WorkingSet) -> KernelResult<()> {
        for id in ws.unloaded_majors() {
            let major = self
                .store
                .get_major_version(&id)
                .await
                .map_err(KernelError::from_store)?
                .ok_or(NotFound::MajorVersion(id))?;
            ws.load_major(major);
        }
        Ok(())
    }

    /// Pair nodes with their bodies, skipping ids that vanished.
    async fn views(&self, ids: Vec<NodeId>) -> KernelResult<Vec<NodeView>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let nodes = self.store.get_nodes(&ids).await.map_err(KernelError::from_store)?;
        let body_ids: Vec<_> = nodes.iter().map(|node| node.body_id).collect();
        let bodies = self.store.get_bodies(&body_ids).await.map_err(KernelError::from_store)?;

        Ok(nodes
            .into_iter()
            .filter_map(|node| {
                let body = bodies.iter().find(|body| body.id == node.body_id)?.clone();
                Some(NodeView::new(node, body))
            })
            .collect())
    }

    /// Commit the working set's pending writes.
    async fn commit(&self, ws: &WorkingSet, operation: &'static str) -> KernelResult<()> {
        let changes = ws.change_set();
        if changes.is_empty() {
            return Ok(());
        }

        match self.store.commit(changes).await.map_err(KernelError::from_store)? {
            CommitOutcome::Committed { records } => {
                tracing::debug!(operation, records, "Committed operation");
                Ok(())
            }
            CommitOutcome::Conflict { reason } => {
                tracing::warn!(operation, reason = %reason, "Operation lost a concurrent write");
                Err(KernelError::Conflict(reason))
            }
        }
    }
}

/// Render the loaded nodes of `ws` as a view around `root_id`.
fn graph_view(ws: &WorkingSet, root_id: NodeId, consumers: Vec<NodeView>) -> KernelResult<GraphView> {
    let mut nodes = Vec::new();
    let mut edges = BTreeSet::new();

    for id in ws.node_ids() {
        let kind = ws.node(id)?.kind();
        if let Some(edge_type) = EdgeType::for_parent(kind) {
            for child in ws.children(id) {
                if ws.contains_node(child) {
                    edges.insert(Edge::new(id, child, edge_type));
                }
            }
        }
        nodes.push(ws.view(id)?);
    }

    Ok(GraphView {
        nodes,
        edges,
        root_id,
        consumers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryContentStore;

    fn service() -> ArgumentService<InMemoryContentStore> {
        ArgumentService::new(Arc::new(InMemoryContentStore::new()), KernelConfig::default())
    }

    #[tokio::test]
    async fn test_missing_node_is_not_found() {
        let service = service();
        let id = NodeId::generate();
        let err = service.get_node(id).await.unwrap_err();
        assert!(matches!(err, KernelError::NotFound(NotFound::Node(missing)) if missing == id));

        let err = service.get_graph(id, None).await.unwrap_err();
        assert!(matches!(err, KernelError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_edit_checks_kind() {
        let service = service();
        let author = AuthorId::generate();
        let source = service
            .create_source(author, SourceInput::new("s", "https://example.org"))
            .await
            .unwrap();

        let err = service
            .edit_assertion(author, source.id(), AssertionInput::new("a", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err.rule(), Some(RuleViolation::WrongKind { .. })));
    }

    #[tokio::test]
    async fn test_graph_view_edges() {
        let service = service();
        let author = AuthorId::generate();
        let s = service.create_source(author, SourceInput::new("s", "u")).await.unwrap();
        let i = service
            .create_interpretation(author, InterpretationInput::new("i", Some(s.id())))
            .await
            .unwrap();

        let graph = service.get_graph(i.id(), Some(author)).await.unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(
            graph.edges.iter().cloned().collect::<Vec<_>>(),
            vec![Edge::new(i.id(), s.id(), EdgeType::Interprets)]
        );

        let consumers = service.get_graph(s.id(), Some(author)).await.unwrap().consumers;
        assert_eq!(consumers.len(), 1);
        let hidden = service.get_graph(s.id(), None).await.unwrap().consumers;
        assert!(hidden.is_empty());
    }
}
