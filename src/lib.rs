//! # argument-graph-kernel
//!
//! Versioned argument graphs with private drafts and atomic publish.
//!
//! The kernel keeps a directed graph of assertions, interpretations and
//! sources. Every node can exist as a private draft before it is published,
//! and publishing merges the draft back into the node it superseded.
//!
//! ## Core Contract
//!
//! 1. Published content is never mutated directly; authors branch drafts
//! 2. A draft below a root propagates copy-on-write up to that root
//! 3. Publish is grounded, cascades through unpublished children, and commits
//!    as a single atomic change set
//!
//! ## Architecture
//!
//! ```text
//! ArgumentService → WorkingSet → VersionManager → ChangeSet → ContentStore
//!                                     ↓                      (Postgres or Memory)
//!                      LinkIndex / grounding / propagation
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Node and edge ordering is canonical (by id, then position)
//! - Same store content → identical fingerprint
//! - A failed operation writes nothing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod error;
pub mod config;
pub mod canonical;
pub mod graph;
pub mod store;
pub mod version;
pub mod service;
pub mod telemetry;

// Re-exports
pub use types::{
    ArgumentBody, ArgumentNode, AssertionInput, AuthorId, BodyFields, BodyId, Edge, EdgeType,
    EditResult, GraphView, InterpretationInput, MajorVersion, MajorVersionId, NodeId, NodeKind,
    NodeLinks, NodeView, SourceInput, StableId, DRAFT_MINOR_VERSION,
};
pub use error::{KernelError, KernelResult, NotFound, RuleViolation};
pub use config::KernelConfig;
pub use graph::{GroundingReport, LinkIndex, Propagation, WorkingSet};
pub use store::{ChangeSet, CommitOutcome, ContentStore, InMemoryContentStore};
#[cfg(feature = "postgres")]
pub use store::{PostgresConfig, PostgresContentStore};
pub use version::VersionManager;
pub use service::ArgumentService;
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};

/// Schema version for all persisted kernel types.
/// Increment on breaking changes to any record type.
pub const ARGUMENT_KERNEL_SCHEMA_VERSION: &str = "1.0.0";
