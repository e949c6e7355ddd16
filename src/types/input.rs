//! Author-supplied content for creating and editing drafts.

use serde::{Deserialize, Serialize};

use super::body::BodyFields;
use super::ids::NodeId;

/// Content of an assertion draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionInput {
    /// Headline claim.
    pub title: String,
    /// Scope qualifier.
    pub qualifier: String,
    /// Elaboration.
    pub text: String,
    /// Supporting assertions or interpretations, in display order.
    pub supporting: Vec<NodeId>,
}

impl AssertionInput {
    /// Assertion with a title and supporting children.
    pub fn new(title: impl Into<String>, supporting: Vec<NodeId>) -> Self {
        Self {
            title: title.into(),
            supporting,
            ..Default::default()
        }
    }

    /// The body fields.
    pub fn fields(&self) -> BodyFields {
        BodyFields::new(self.title.clone(), self.text.clone()).with_qualifier(self.qualifier.clone())
    }
}

/// Content of an interpretation draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpretationInput {
    /// Headline gloss.
    pub title: String,
    /// Scope qualifier.
    pub qualifier: String,
    /// Elaboration.
    pub text: String,
    /// The interpreted source.
    pub source: Option<NodeId>,
}

impl InterpretationInput {
    /// Interpretation with a title and source.
    pub fn new(title: impl Into<String>, source: Option<NodeId>) -> Self {
        Self {
            title: title.into(),
            source,
            ..Default::default()
        }
    }

    /// The body fields.
    pub fn fields(&self) -> BodyFields {
        BodyFields::new(self.title.clone(), self.text.clone()).with_qualifier(self.qualifier.clone())
    }

    /// The source link as a child list.
    pub fn children(&self) -> Vec<NodeId> {
        self.source.into_iter().collect()
    }
}

/// Content of a source draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInput {
    /// Citation title.
    pub title: String,
    /// Scope qualifier.
    pub qualifier: String,
    /// Where the material lives.
    pub url: Option<String>,
}

impl SourceInput {
    /// Source with a title and url.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// The body fields.
    pub fn fields(&self) -> BodyFields {
        BodyFields {
            title: self.title.clone(),
            qualifier: self.qualifier.clone(),
            text: String::new(),
            url: self.url.clone(),
        }
    }
}
