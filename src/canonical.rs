//! Canonical serialization for graph fingerprints.
//!
//! Fingerprints let callers and tests compare two states of the graph without
//! walking them field by field: equal fingerprints mean equal records.
//!
//! ## Determinism
//!
//! - Struct fields serialize in declaration order
//! - Maps in hashed data are `BTreeMap`/`BTreeSet`, never `HashMap`
//! - Vec order is preserved, so child order is part of the fingerprint

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes.
///
/// Every type in this crate serializes infallibly (no non-string map keys, no
/// custom serializers that can fail), so an error here is a programming bug.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("canonical serialization failed")
}

/// Compute the canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// Compute the canonical hash as a 16-digit hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeId, NodeKind, NodeLinks};

    #[test]
    fn test_determinism() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        let links = NodeLinks::from_children(NodeKind::Assertion, &[a, b]);

        assert_eq!(canonical_hash(&links), canonical_hash(&links.clone()));
        assert_eq!(canonical_hash_hex(&links).len(), 16);
    }

    #[test]
    fn test_child_order_changes_hash() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        let forward = NodeLinks::from_children(NodeKind::Assertion, &[a, b]);
        let reversed = NodeLinks::from_children(NodeKind::Assertion, &[b, a]);

        assert_ne!(canonical_hash(&forward), canonical_hash(&reversed));
    }
}
