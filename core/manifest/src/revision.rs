//! Per-device revision vectors for causal ordering.
//!
//! Revision vectors replace clock synchronization: each device counts its
//! own writes, and comparing two vectors tells whether one state causally
//! precedes the other or the two diverged concurrently.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use vaultsync_common::DeviceId;

/// Outcome of comparing two revision vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrder {
    /// Identical vectors.
    Equal,
    /// Self happened strictly before other.
    Before,
    /// Self happened strictly after other.
    After,
    /// Each side has increments the other has not seen.
    Concurrent,
}

/// Mapping from device id to that device's local sequence number.
///
/// Invariant: a device only ever increments its own slot. A missing slot
/// is equivalent to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionVector(BTreeMap<DeviceId, u64>);

impl RevisionVector {
    /// Create an empty vector (no writes observed from any device).
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the counter for a device (zero if unseen).
    pub fn get(&self, device: &DeviceId) -> u64 {
        self.0.get(device).copied().unwrap_or(0)
    }

    /// Record a write by `device` at sequence `seq`.
    ///
    /// Counters are monotonic: a lower sequence than already recorded is
    /// ignored.
    pub fn record(&mut self, device: &DeviceId, seq: u64) {
        let slot = self.0.entry(device.clone()).or_insert(0);
        if seq > *slot {
            *slot = seq;
        }
    }

    /// Element-wise maximum of two vectors.
    pub fn merge_max(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (device, seq) in &other.0 {
            merged.record(device, *seq);
        }
        merged
    }

    /// Whether this vector has seen everything `other` has.
    pub fn dominates(&self, other: &Self) -> bool {
        other.0.iter().all(|(device, seq)| self.get(device) >= *seq)
    }

    /// Causal comparison of two vectors.
    pub fn compare(&self, other: &Self) -> CausalOrder {
        let forward = self.dominates(other);
        let backward = other.dominates(self);

        match (forward, backward) {
            (true, true) => CausalOrder::Equal,
            (true, false) => CausalOrder::After,
            (false, true) => CausalOrder::Before,
            (false, false) => CausalOrder::Concurrent,
        }
    }

    /// Iterate over (device, sequence) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, u64)> {
        self.0.iter().map(|(d, s)| (d, *s))
    }

    /// Whether the vector records no writes at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str) -> DeviceId {
        DeviceId::new(name).unwrap()
    }

    fn vector(pairs: &[(&str, u64)]) -> RevisionVector {
        let mut v = RevisionVector::new();
        for (name, seq) in pairs {
            v.record(&device(name), *seq);
        }
        v
    }

    #[test]
    fn test_missing_slot_is_zero() {
        let v = RevisionVector::new();
        assert_eq!(v.get(&device("a")), 0);
        assert!(v.is_empty());
    }

    #[test]
    fn test_record_is_monotonic() {
        let mut v = RevisionVector::new();
        v.record(&device("a"), 5);
        v.record(&device("a"), 3);
        assert_eq!(v.get(&device("a")), 5);
    }

    #[test]
    fn test_compare_equal() {
        let a = vector(&[("x", 1), ("y", 2)]);
        let b = vector(&[("x", 1), ("y", 2)]);
        assert_eq!(a.compare(&b), CausalOrder::Equal);
    }

    #[test]
    fn test_compare_ordered() {
        let earlier = vector(&[("x", 1)]);
        let later = vector(&[("x", 2), ("y", 1)]);

        assert_eq!(earlier.compare(&later), CausalOrder::Before);
        assert_eq!(later.compare(&earlier), CausalOrder::After);
    }

    #[test]
    fn test_compare_concurrent() {
        let a = vector(&[("x", 2), ("y", 1)]);
        let b = vector(&[("x", 1), ("y", 2)]);

        assert_eq!(a.compare(&b), CausalOrder::Concurrent);
        assert_eq!(b.compare(&a), CausalOrder::Concurrent);
    }

    #[test]
    fn test_empty_vector_before_any() {
        let empty = RevisionVector::new();
        let written = vector(&[("x", 1)]);

        assert_eq!(empty.compare(&written), CausalOrder::Before);
        assert_eq!(written.compare(&empty), CausalOrder::After);
    }

    #[test]
    fn test_merge_max() {
        let a = vector(&[("x", 2), ("y", 1)]);
        let b = vector(&[("x", 1), ("y", 3), ("z", 1)]);

        let merged = a.merge_max(&b);
        assert_eq!(merged, vector(&[("x", 2), ("y", 3), ("z", 1)]));

        // Merge dominates both inputs
        assert!(merged.dominates(&a));
        assert!(merged.dominates(&b));
    }

    #[test]
    fn test_serde_roundtrip() {
        let v = vector(&[("x", 2), ("y", 7)]);
        let json = serde_json::to_string(&v).unwrap();
        let restored: RevisionVector = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, v);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_vector() -> impl Strategy<Value = RevisionVector> {
            proptest::collection::btree_map("[a-d]", 0u64..100, 0..4).prop_map(|map| {
                let mut v = RevisionVector::new();
                for (name, seq) in map {
                    v.record(&device(&name), seq);
                }
                v
            })
        }

        proptest! {
            #[test]
            fn prop_merge_dominates_both(a in arb_vector(), b in arb_vector()) {
                let merged = a.merge_max(&b);
                prop_assert!(merged.dominates(&a));
                prop_assert!(merged.dominates(&b));
            }

            #[test]
            fn prop_merge_commutes(a in arb_vector(), b in arb_vector()) {
                prop_assert_eq!(a.merge_max(&b), b.merge_max(&a));
            }

            #[test]
            fn prop_compare_antisymmetric(a in arb_vector(), b in arb_vector()) {
                let expected = match a.compare(&b) {
                    CausalOrder::Before => CausalOrder::After,
                    CausalOrder::After => CausalOrder::Before,
                    other => other,
                };
                prop_assert_eq!(b.compare(&a), expected);
            }
        }
    }
}
