//! Core types for the argument graph.

pub mod ids;
pub mod node;
pub mod body;
pub mod edge;
pub mod graph;
pub mod input;

pub use ids::{NodeId, BodyId, MajorVersionId, AuthorId, StableId};
pub use node::{ArgumentNode, NodeKind, NodeLinks};
pub use body::{ArgumentBody, BodyFields, MajorVersion, DRAFT_MINOR_VERSION, next_minor_version};
pub use edge::{Edge, EdgeType};
pub use graph::{NodeView, GraphView, EditResult};
pub use input::{AssertionInput, InterpretationInput, SourceInput};
