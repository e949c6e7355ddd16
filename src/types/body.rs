//! Versioned content payloads and the major-version lines they belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::ids::{AuthorId, BodyId, MajorVersionId};

/// Minor version carried by every draft body until it is published.
pub const DRAFT_MINOR_VERSION: i32 = -1;

/// Content fields an author may set on a draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyFields {
    /// Headline.
    pub title: String,
    /// Short hedge or scope qualifier shown beside the title.
    pub qualifier: String,
    /// Free text. Empty for sources.
    pub text: String,
    /// Location of the cited material. Sources only.
    pub url: Option<String>,
}

impl BodyFields {
    /// Fields with a title and text.
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// Set the qualifier.
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = qualifier.into();
        self
    }

    /// Set the url.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// The versioned content of a node.
///
/// A node owns exactly one body at a time and a body is never attached to two
/// live nodes. `is_public == false` with `minor_version == -1` is a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentBody {
    /// Record identifier.
    pub id: BodyId,
    /// Author-editable fields.
    pub fields: BodyFields,
    /// Authoring identity; the only one allowed to touch the draft.
    pub author: AuthorId,
    /// Content line this revision belongs to.
    pub major_version: MajorVersionId,
    /// Revision counter within the major version, -1 while a draft.
    pub minor_version: i32,
    /// Visible to everyone.
    pub is_public: bool,
    /// Whether drafts may branch off this content at all.
    pub is_editable: bool,
    /// Creation time.
    pub date_created: DateTime<Utc>,
    /// Last edit, or publish time once published.
    pub date_edited: DateTime<Utc>,
    /// The body this one was branched from (edit-history chain).
    pub preceded_by: Option<BodyId>,
    /// Conditional-write counter, maintained by the content store.
    pub revision: u64,
}

impl ArgumentBody {
    /// Create a fresh draft body in `major_version`.
    pub fn draft(fields: BodyFields, author: AuthorId, major_version: MajorVersionId, now: DateTime<Utc>) -> Self {
        Self {
            id: BodyId::generate(),
            fields,
            author,
            major_version,
            minor_version: DRAFT_MINOR_VERSION,
            is_public: false,
            is_editable: true,
            date_created: now,
            date_edited: now,
            preceded_by: None,
            revision: 0,
        }
    }

    /// Draft copy of this body owned by `author`, preceded by this body.
    pub fn branch(&self, author: AuthorId, now: DateTime<Utc>) -> Self {
        let mut body = Self::draft(self.fields.clone(), author, self.major_version, now);
        body.is_editable = self.is_editable;
        body.preceded_by = Some(self.id);
        body
    }

    /// Draft state: private and unnumbered.
    pub fn is_draft(&self) -> bool {
        !self.is_public && self.minor_version == DRAFT_MINOR_VERSION
    }

    /// `major.minor`, or `major.draft` for drafts.
    pub fn version_string(&self, major: &MajorVersion) -> String {
        if self.minor_version < 0 {
            format!("{}.draft", major.version_number)
        } else {
            format!("{}.{}", major.version_number, self.minor_version)
        }
    }
}

/// A content line spanning all minor revisions of "the same" content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MajorVersion {
    /// Record identifier.
    pub id: MajorVersionId,
    /// Human-facing major number.
    pub version_number: u32,
    /// Author who started the line.
    pub author: AuthorId,
    /// Highest published minor version, -1 before the first publish.
    pub latest_minor: i32,
    /// Content lines each author linked in as support.
    pub edge_owners: BTreeMap<AuthorId, BTreeSet<MajorVersionId>>,
    /// Conditional-write counter, maintained by the content store.
    pub revision: u64,
}

impl MajorVersion {
    /// Start a new line at major version 1.
    pub fn new(author: AuthorId) -> Self {
        Self {
            id: MajorVersionId::generate(),
            version_number: 1,
            author,
            latest_minor: DRAFT_MINOR_VERSION,
            edge_owners: BTreeMap::new(),
            revision: 0,
        }
    }

    /// Record that `author` linked the given lines in as support.
    ///
    /// Returns true if anything new was recorded.
    pub fn merge_edge_owners<I>(&mut self, author: AuthorId, lines: I) -> bool
    where
        I: IntoIterator<Item = MajorVersionId>,
    {
        let own_line = self.id;
        let owned = self.edge_owners.entry(author).or_default();
        let before = owned.len();
        owned.extend(lines.into_iter().filter(|line| *line != own_line));
        let changed = owned.len() != before;
        if owned.is_empty() {
            self.edge_owners.remove(&author);
        }
        changed
    }
}

/// Next minor version given the highest one already published, if any.
pub fn next_minor_version(max_published: Option<i32>) -> i32 {
    match max_published {
        Some(max) if max >= 0 => max + 1,
        _ => 0,
    }
}
