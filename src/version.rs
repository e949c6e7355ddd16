//! Draft creation, branching, publishing and discarding.
//!
//! The version manager works on a loaded [`WorkingSet`] on behalf of one
//! acting author. It never touches the store: the caller commits the working
//! set's change set once the whole operation succeeded.
//!
//! ## Publish
//!
//! 1. The author must own the draft; finalized or public content is refused
//! 2. Non-source nodes must be grounded
//! 3. Unpublished children are published first, depth first
//! 4. A draft of a published node is merged into that node: edges and body
//!    move over, dependents of the draft are redirected, the draft is deleted
//! 5. The body gets the next minor version of its line and becomes public
//! 6. The result is marked finalized

use std::collections::BTreeSet;

use crate::error::{KernelError, KernelResult, RuleViolation};
use crate::graph::{branch_draft, check_grounding, propagate_to_root, reaches, Propagation, WorkingSet};
use crate::types::{
    next_minor_version, ArgumentBody, ArgumentNode, AuthorId, BodyFields, MajorVersion, NodeId, NodeKind,
    NodeLinks, DRAFT_MINOR_VERSION,
};

/// Lifecycle operations for one acting author over a working set.
pub struct VersionManager<'a> {
    ws: &'a mut WorkingSet,
    author: AuthorId,
}

impl<'a> VersionManager<'a> {
    /// Act as `author` on `ws`.
    pub fn new(ws: &'a mut WorkingSet, author: AuthorId) -> Self {
        Self { ws, author }
    }

    /// The acting author.
    pub fn author(&self) -> AuthorId {
        self.author
    }

    /// Create a fresh draft in a new major version.
    ///
    /// Children must be loaded.
    pub fn create(&mut self, kind: NodeKind, fields: BodyFields, children: &[NodeId]) -> KernelResult<NodeId> {
        let now = self.ws.now();
        let major = self.ws.insert_major(MajorVersion::new(self.author));
        let body = self.ws.insert_body(ArgumentBody::draft(fields, self.author, major, now));
        let node = ArgumentNode::new(kind, body);
        let node_id = node.id;

        self.validate_links(node_id, kind, children)?;
        self.ws.insert_node(node);
        self.ws.set_children(node_id, children)?;
        self.record_edge_owners(node_id)?;

        tracing::debug!(node_id = %node_id, kind = %kind, author = %self.author, "Created draft");
        Ok(node_id)
    }

    /// Replace the fields and links of one of the author's drafts.
    ///
    /// `children` of `None` keeps the current links.
    pub fn edit(&mut self, node_id: NodeId, fields: BodyFields, children: Option<&[NodeId]>) -> KernelResult<()> {
        let kind = self.ws.node(node_id)?.kind();
        self.check_editable(node_id)?;

        if let Some(children) = children {
            self.validate_links(node_id, kind, children)?;
            self.ws.set_children(node_id, children)?;
            self.record_edge_owners(node_id)?;
        }

        let now = self.ws.now();
        let body = self.ws.body_of_mut(node_id)?;
        body.fields = fields;
        body.date_edited = now;

        tracing::debug!(node_id = %node_id, author = %self.author, "Edited draft");
        Ok(())
    }

    /// Branch a draft off a published node and propagate it up to `root`.
    ///
    /// Returns the new draft and what the propagation did.
    pub fn make_draft(&mut self, node_id: NodeId, root: NodeId) -> KernelResult<(NodeId, Propagation)> {
        let draft = branch_draft(self.ws, node_id, self.author)?;
        let propagation = propagate_to_root(self.ws, self.author, node_id, draft, root)?;
        Ok((draft, propagation))
    }

    /// Publish a draft and every unpublished draft it builds on.
    ///
    /// Returns the id of the published node, which is the previous version
    /// when the draft was merged into it.
    pub fn publish(&mut self, node_id: NodeId) -> KernelResult<NodeId> {
        let mut in_progress = BTreeSet::new();
        self.publish_inner(node_id, &mut in_progress)
    }

    fn publish_inner(&mut self, node_id: NodeId, in_progress: &mut BTreeSet<NodeId>) -> KernelResult<NodeId> {
        let node = self.ws.node(node_id)?.clone();
        let body = self.ws.body(node.body_id)?;

        if body.author != self.author {
            return Err(KernelError::NotAuthorized { node: node_id, author: self.author });
        }
        if node.finalized || body.is_public {
            return Err(RuleViolation::AlreadyFinalized(node_id).into());
        }
        if node.kind() != NodeKind::Source {
            check_grounding(self.ws, node_id)?.into_result()?;
        }

        in_progress.insert(node_id);
        for child in node.links.cascade_targets() {
            if in_progress.contains(&child) || self.ws.body_of(child)?.is_public {
                continue;
            }
            self.publish_inner(child, in_progress)?;
        }

        let result = match node.previous_version {
            Some(previous) if self.ws.contains_node(previous) && !self.ws.node(previous)?.finalized => {
                self.merge_into_previous(node_id, previous)?
            }
            _ => node_id,
        };

        self.assign_version(result)?;
        self.ws.node_mut(result)?.finalized = true;

        tracing::debug!(
            node_id = %node_id,
            result = %result,
            merged = result != node_id,
            "Published node"
        );
        Ok(result)
    }

    /// Fold a draft into the published node it was branched from.
    fn merge_into_previous(&mut self, draft: NodeId, previous: NodeId) -> KernelResult<NodeId> {
        let children = self.ws.children(draft);
        let body_id = self.ws.node(draft)?.body_id;

        // Links validated against the draft may still close a loop through
        // the node it replaces.
        if let Some(child) = children
            .iter()
            .find(|child| **child == previous || reaches(self.ws, **child, previous))
        {
            return Err(RuleViolation::Cycle { parent: previous, child: *child }.into());
        }

        self.ws.set_children(previous, &children)?;
        self.ws.node_mut(previous)?.body_id = body_id;

        for dependent in self.ws.dependents(draft) {
            self.ws.replace_child(dependent, draft, previous)?;
        }
        self.ws.delete_node(draft)?;

        Ok(previous)
    }

    /// Give the node's body its minor version and make it public.
    fn assign_version(&mut self, node_id: NodeId) -> KernelResult<()> {
        let body_id = self.ws.node(node_id)?.body_id;
        let (major_id, minor) = {
            let body = self.ws.body(body_id)?;
            (body.major_version, body.minor_version)
        };

        let minor = if minor == DRAFT_MINOR_VERSION {
            next_minor_version(self.ws.max_minor(major_id))
        } else {
            minor
        };

        // Always dirties the line record, even when the minor came from the store.
        let major = self.ws.major_mut(major_id)?;
        major.latest_minor = major.latest_minor.max(minor);

        let now = self.ws.now();
        let body = self.ws.body_mut(body_id)?;
        body.minor_version = minor;
        body.is_public = true;
        body.date_edited = now;
        Ok(())
    }

    /// Delete one of the author's drafts.
    ///
    /// Drafts that pointed at it fall back to its previous version, or lose the
    /// edge if there is none. The previous version becomes finalized again.
    pub fn discard(&mut self, node_id: NodeId) -> KernelResult<()> {
        let node = self.ws.node(node_id)?.clone();
        let body = self.ws.body(node.body_id)?;

        if body.is_public {
            return Err(RuleViolation::NotADraft(node_id).into());
        }
        if body.author != self.author {
            return Err(KernelError::NotAuthorized { node: node_id, author: self.author });
        }

        let dependents = self.ws.dependents(node_id);
        for dependent in &dependents {
            if self.ws.body_of(*dependent)?.is_public {
                return Err(RuleViolation::PublishedDependent { draft: node_id, dependent: *dependent }.into());
            }
        }

        let previous = node.previous_version.filter(|id| self.ws.contains_node(*id));
        if let Some(previous) = previous {
            for dependent in &dependents {
                self.ws.replace_child(*dependent, node_id, previous)?;
            }
        }

        self.ws.delete_node(node_id)?;
        self.ws.delete_body(node.body_id)?;

        if let Some(previous) = previous {
            if self.ws.body_of(previous)?.is_public {
                self.ws.node_mut(previous)?.finalized = true;
            }
        }

        tracing::debug!(
            node_id = %node_id,
            restored = ?previous,
            redirected = dependents.len(),
            "Discarded draft"
        );
        Ok(())
    }

    fn check_editable(&self, node_id: NodeId) -> KernelResult<()> {
        let body = self.ws.body_of(node_id)?;
        if body.is_public {
            return Err(RuleViolation::PublishedImmutable(node_id).into());
        }
        if body.author != self.author {
            return Err(KernelError::NotAuthorized { node: node_id, author: self.author });
        }
        if !body.is_editable {
            return Err(RuleViolation::NotEditable(node_id).into());
        }
        Ok(())
    }

    /// Check every proposed child of `parent` before linking.
    ///
    /// A draft and the node it was branched from count as one node for cycle
    /// detection, since publishing moves the draft's links onto it.
    fn validate_links(&self, parent: NodeId, kind: NodeKind, children: &[NodeId]) -> KernelResult<()> {
        let links = NodeLinks::empty(kind);
        let previous = self.ws.node(parent).ok().and_then(|node| node.previous_version);

        if kind == NodeKind::Interpretation && children.len() > 1 {
            let extra = children[1];
            let child_kind = self.ws.node(extra)?.kind();
            return Err(RuleViolation::InvalidLink { parent: kind, child: extra, child_kind }.into());
        }

        for child in children {
            let child_kind = self.ws.node(*child)?.kind();
            if kind == NodeKind::Assertion && child_kind == NodeKind::Source {
                return Err(RuleViolation::AssertionLinksSource(*child).into());
            }
            if !links.accepts_child(child_kind) {
                return Err(RuleViolation::InvalidLink { parent: kind, child: *child, child_kind }.into());
            }

            let child_body = self.ws.body_of(*child)?;
            if !child_body.is_public && child_body.author != self.author {
                return Err(RuleViolation::ForeignDraftLink(*child).into());
            }

            let closes_loop = |target: NodeId| *child == target || reaches(self.ws, *child, target);
            if closes_loop(parent) || previous.map_or(false, closes_loop) {
                return Err(RuleViolation::Cycle { parent, child: *child }.into());
            }
        }
        Ok(())
    }

    /// Record the lines the author linked in on the node's own line.
    fn record_edge_owners(&mut self, node_id: NodeId) -> KernelResult<()> {
        let major_id = self.ws.body_of(node_id)?.major_version;
        let lines = self
            .ws
            .children(node_id)
            .into_iter()
            .map(|child| self.ws.body_of(child).map(|b| b.major_version))
            .collect::<KernelResult<Vec<_>>>()?;

        let mut major = self.ws.major(major_id)?.clone();
        if major.merge_edge_owners(self.author, lines) {
            *self.ws.major_mut(major_id)? = major;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotFound;
    use chrono::Utc;

    fn fields(title: &str) -> BodyFields {
        BodyFields::new(title, "")
    }

    /// Source, interpretation and assertion drafts chained S <- I <- A.
    fn draft_chain(ws: &mut WorkingSet, author: AuthorId) -> (NodeId, NodeId, NodeId) {
        let mut vm = VersionManager::new(ws, author);
        let s = vm.create(NodeKind::Source, fields("s").with_url("https://example.org"), &[]).unwrap();
        let i = vm.create(NodeKind::Interpretation, fields("i"), &[s]).unwrap();
        let a = vm.create(NodeKind::Assertion, fields("a"), &[i]).unwrap();
        (s, i, a)
    }

    #[test]
    fn test_create_is_draft() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let (_, _, a) = draft_chain(&mut ws, author);

        let body = ws.body_of(a).unwrap();
        assert!(body.is_draft());
        assert_eq!(body.minor_version, DRAFT_MINOR_VERSION);
        assert!(!ws.node(a).unwrap().finalized);
    }

    #[test]
    fn test_publish_cascades() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let (s, i, a) = draft_chain(&mut ws, author);

        let result = VersionManager::new(&mut ws, author).publish(a).unwrap();

        assert_eq!(result, a);
        for id in [s, i, a] {
            let body = ws.body_of(id).unwrap();
            assert!(body.is_public);
            assert_eq!(body.minor_version, 0);
            assert!(ws.node(id).unwrap().finalized);
        }
    }

    #[test]
    fn test_publish_twice_fails() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let (_, _, a) = draft_chain(&mut ws, author);
        let mut vm = VersionManager::new(&mut ws, author);
        vm.publish(a).unwrap();

        let err = vm.publish(a).unwrap_err();
        assert_eq!(err.rule(), Some(&RuleViolation::AlreadyFinalized(a)));
    }

    #[test]
    fn test_ungrounded_publish_fails() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let mut vm = VersionManager::new(&mut ws, author);
        let i = vm.create(NodeKind::Interpretation, fields("i"), &[]).unwrap();
        let a = vm.create(NodeKind::Assertion, fields("a"), &[i]).unwrap();

        let err = vm.publish(a).unwrap_err();
        assert_eq!(err.rule(), Some(&RuleViolation::Ungrounded { root: a, offending: vec![i] }));
        assert!(!ws.body_of(i).unwrap().is_public);
    }

    #[test]
    fn test_publish_requires_owner() {
        let mut ws = WorkingSet::new(Utc::now());
        let (_, _, a) = draft_chain(&mut ws, AuthorId::generate());
        let err = VersionManager::new(&mut ws, AuthorId::generate()).publish(a).unwrap_err();
        assert!(matches!(err, KernelError::NotAuthorized { .. }));
    }

    #[test]
    fn test_merge_publish_keeps_identity_and_bumps_minor() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let (_, _, a) = draft_chain(&mut ws, author);
        let stable = ws.node(a).unwrap().stable_id.clone();
        let mut vm = VersionManager::new(&mut ws, author);
        vm.publish(a).unwrap();

        let (draft, propagation) = vm.make_draft(a, a).unwrap();
        assert_eq!(propagation.root_id, draft);
        vm.edit(draft, fields("a, revised"), None).unwrap();
        let result = vm.publish(draft).unwrap();

        assert_eq!(result, a);
        assert!(!ws.contains_node(draft));
        let node = ws.node(a).unwrap();
        assert_eq!(node.stable_id, stable);
        assert!(node.finalized);
        let body = ws.body_of(a).unwrap();
        assert_eq!(body.fields.title, "a, revised");
        assert_eq!(body.minor_version, 1);
        assert!(body.preceded_by.is_some());
    }

    #[test]
    fn test_merge_redirects_dependents() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let (s, i, a) = draft_chain(&mut ws, author);
        let mut vm = VersionManager::new(&mut ws, author);
        vm.publish(a).unwrap();

        // Drafting the source from root A copies I and A as well.
        let (draft_s, propagation) = vm.make_draft(s, a).unwrap();
        let draft_i = propagation.copied[&i];
        assert_eq!(vm.ws.children(draft_i), vec![draft_s]);

        vm.publish(draft_s).unwrap();
        assert!(!vm.ws.contains_node(draft_s));
        assert_eq!(vm.ws.children(draft_i), vec![s]);
        assert!(vm.ws.links().is_consistent());
    }

    #[test]
    fn test_minor_versions_follow_line_maximum() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let (s, _, _) = draft_chain(&mut ws, author);
        let major = ws.body_of(s).unwrap().major_version;
        ws.record_max_minor(major, Some(2));

        VersionManager::new(&mut ws, author).publish(s).unwrap();

        assert_eq!(ws.body_of(s).unwrap().minor_version, 3);
        assert_eq!(ws.major(major).unwrap().latest_minor, 3);
    }

    #[test]
    fn test_edit_rules() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let (s, i, a) = draft_chain(&mut ws, author);

        let err = VersionManager::new(&mut ws, AuthorId::generate())
            .edit(a, fields("x"), None)
            .unwrap_err();
        assert!(matches!(err, KernelError::NotAuthorized { .. }));

        let mut vm = VersionManager::new(&mut ws, author);
        let err = vm.edit(a, fields("x"), Some(&[s][..])).unwrap_err();
        assert_eq!(err.rule(), Some(&RuleViolation::AssertionLinksSource(s)));

        let err = vm.edit(i, fields("x"), Some(&[a][..])).unwrap_err();
        assert!(matches!(err.rule(), Some(RuleViolation::InvalidLink { .. })));

        vm.publish(a).unwrap();
        let err = vm.edit(a, fields("x"), None).unwrap_err();
        assert_eq!(err.rule(), Some(&RuleViolation::PublishedImmutable(a)));
    }

    #[test]
    fn test_cycle_is_refused() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let (_, i, a) = draft_chain(&mut ws, author);
        let mut vm = VersionManager::new(&mut ws, author);
        let b = vm.create(NodeKind::Assertion, fields("b"), &[a]).unwrap();

        let err = vm.edit(a, fields("a"), Some(&[i, b][..])).unwrap_err();
        assert_eq!(err.rule(), Some(&RuleViolation::Cycle { parent: a, child: b }));
        let err = vm.edit(a, fields("a"), Some(&[a][..])).unwrap_err();
        assert_eq!(err.rule(), Some(&RuleViolation::Cycle { parent: a, child: a }));
    }

    #[test]
    fn test_draft_cannot_link_back_to_its_previous_version() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let (_, i, a) = draft_chain(&mut ws, author);
        let mut vm = VersionManager::new(&mut ws, author);
        vm.publish(a).unwrap();

        let (draft_a, _) = vm.make_draft(a, a).unwrap();
        let b = vm.create(NodeKind::Assertion, fields("b"), &[a]).unwrap();

        let err = vm.edit(draft_a, fields("a"), Some(&[i, b][..])).unwrap_err();
        assert_eq!(err.rule(), Some(&RuleViolation::Cycle { parent: draft_a, child: b }));
        let err = vm.edit(draft_a, fields("a"), Some(&[a][..])).unwrap_err();
        assert_eq!(err.rule(), Some(&RuleViolation::Cycle { parent: draft_a, child: a }));
    }

    #[test]
    fn test_merge_refuses_loop_through_previous_version() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let (_, i, a) = draft_chain(&mut ws, author);
        let mut vm = VersionManager::new(&mut ws, author);
        vm.publish(a).unwrap();

        // A' -> C passes, and C -> B -> A passes, but merging A' gives A -> C -> B -> A.
        let (draft_a, _) = vm.make_draft(a, a).unwrap();
        let c = vm.create(NodeKind::Assertion, fields("c"), &[i]).unwrap();
        vm.edit(draft_a, fields("a"), Some(&[i, c][..])).unwrap();
        let b = vm.create(NodeKind::Assertion, fields("b"), &[a]).unwrap();
        vm.edit(c, fields("c"), Some(&[i, b][..])).unwrap();

        let err = vm.publish(draft_a).unwrap_err();
        assert_eq!(err.rule(), Some(&RuleViolation::Cycle { parent: a, child: c }));
        assert_eq!(vm.ws.children(a), vec![i]);
    }

    #[test]
    fn test_interpretation_takes_one_source() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let mut vm = VersionManager::new(&mut ws, author);
        let s1 = vm.create(NodeKind::Source, fields("s1").with_url("https://a.example"), &[]).unwrap();
        let s2 = vm.create(NodeKind::Source, fields("s2").with_url("https://b.example"), &[]).unwrap();

        let err = vm.create(NodeKind::Interpretation, fields("i"), &[s1, s2]).unwrap_err();
        assert_eq!(
            err.rule(),
            Some(&RuleViolation::InvalidLink { parent: NodeKind::Interpretation, child: s2, child_kind: NodeKind::Source })
        );

        let i = vm.create(NodeKind::Interpretation, fields("i"), &[s1]).unwrap();
        let err = vm.edit(i, fields("i"), Some(&[s1, s2][..])).unwrap_err();
        assert!(matches!(err.rule(), Some(RuleViolation::InvalidLink { .. })));
        assert_eq!(vm.ws.children(i), vec![s1]);
    }

    #[test]
    fn test_foreign_draft_link_is_refused() {
        let mut ws = WorkingSet::new(Utc::now());
        let (_, i, _) = draft_chain(&mut ws, AuthorId::generate());
        let err = VersionManager::new(&mut ws, AuthorId::generate())
            .create(NodeKind::Assertion, fields("b"), &[i])
            .unwrap_err();
        assert_eq!(err.rule(), Some(&RuleViolation::ForeignDraftLink(i)));
    }

    #[test]
    fn test_edge_owners_recorded() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let (_, i, a) = draft_chain(&mut ws, author);
        let line_a = ws.body_of(a).unwrap().major_version;
        let line_i = ws.body_of(i).unwrap().major_version;
        assert!(ws.major(line_a).unwrap().edge_owners[&author].contains(&line_i));
    }

    #[test]
    fn test_discard_restores_previous_version() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let (s, i, a) = draft_chain(&mut ws, author);
        let mut vm = VersionManager::new(&mut ws, author);
        vm.publish(a).unwrap();

        let (draft_s, propagation) = vm.make_draft(s, a).unwrap();
        let draft_i = propagation.copied[&i];
        assert!(!vm.ws.node(s).unwrap().finalized);

        let err = VersionManager::new(vm.ws, AuthorId::generate()).discard(draft_s).unwrap_err();
        assert!(matches!(err, KernelError::NotAuthorized { .. }));

        vm.discard(draft_s).unwrap();
        assert!(matches!(vm.ws.node(draft_s), Err(KernelError::NotFound(NotFound::Node(_)))));
        assert_eq!(vm.ws.children(draft_i), vec![s]);
        assert!(vm.ws.node(s).unwrap().finalized);

        let err = vm.discard(s).unwrap_err();
        assert_eq!(err.rule(), Some(&RuleViolation::NotADraft(s)));
    }

    #[test]
    fn test_discard_fresh_draft_strips_edges() {
        let mut ws = WorkingSet::new(Utc::now());
        let author = AuthorId::generate();
        let (_, i, a) = draft_chain(&mut ws, author);
        VersionManager::new(&mut ws, author).discard(i).unwrap();
        assert!(ws.children(a).is_empty());
        assert!(ws.node(a).unwrap().graph_children().is_empty());
    }
}
