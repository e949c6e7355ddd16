//! In-memory graph machinery used inside a single operation.

pub mod links;
pub mod working;
pub mod grounding;
pub mod propagate;

pub use links::LinkIndex;
pub use working::WorkingSet;
pub use grounding::{check_grounding, is_grounded, reaches, GroundingReport};
pub use propagate::{branch_draft, path_to, propagate_to_root, Propagation};
