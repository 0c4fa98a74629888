//! The versioned manifest: the source of truth for what exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entry::SecretEntry;
use crate::revision::RevisionVector;
use vaultsync_common::{ContentHash, DeviceId, Error, Result, SecretPath};

/// Record of a concurrent modification that could not be auto-merged.
///
/// Conflicts are data, not errors: they live in the manifest and are
/// reported as part of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictMarker {
    /// The contested logical path.
    pub path: SecretPath,
    /// Hash retained at the original path.
    pub local_hash: ContentHash,
    /// Hash of the losing side's content.
    pub remote_hash: ContentHash,
    /// Device whose version was moved aside (or whose deletion lost).
    pub remote_device: DeviceId,
    /// Where the losing content was materialized; `None` when the losing
    /// side was a tombstone and had no content to keep.
    pub renamed_path: Option<SecretPath>,
    /// When the conflict was detected.
    pub detected_at: DateTime<Utc>,
}

/// Mapping from logical path to the current `SecretEntry`, plus the full
/// revision vector summarizing all devices' latest known writes.
///
/// Invariant: every path maps to exactly one entry. The manifest itself is
/// an immutable, content-addressed value; it is only ever replaced whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    entries: BTreeMap<SecretPath, SecretEntry>,
    /// Latest known sequence number per device across all entries.
    pub revision: RevisionVector,
    /// Unresolved conflicts awaiting user attention.
    pub conflicts: Vec<ConflictMarker>,
}

impl Manifest {
    /// Create an empty manifest (an unborn vault).
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the entry at a path, tombstones included.
    pub fn get(&self, path: &SecretPath) -> Option<&SecretEntry> {
        self.entries.get(path)
    }

    /// Insert or replace the entry at a path, folding the entry's causal
    /// knowledge into the manifest summary vector.
    pub fn upsert(&mut self, path: SecretPath, entry: SecretEntry) {
        self.revision = self.revision.merge_max(&entry.revision);
        self.entries.insert(path, entry);
    }

    /// Remove a conflict marker for a path, if present.
    pub fn clear_conflict(&mut self, path: &SecretPath) {
        self.conflicts.retain(|marker| marker.path != *path);
    }

    /// Record an unresolved conflict, replacing any prior marker for the
    /// same path.
    pub fn record_conflict(&mut self, marker: ConflictMarker) {
        self.clear_conflict(&marker.path);
        self.conflicts.push(marker);
    }

    /// Iterate over all entries, tombstones included.
    pub fn entries(&self) -> impl Iterator<Item = (&SecretPath, &SecretEntry)> {
        self.entries.iter()
    }

    /// Iterate over live (non-tombstone) entries.
    pub fn live_entries(&self) -> impl Iterator<Item = (&SecretPath, &SecretEntry)> {
        self.entries.iter().filter(|(_, e)| !e.tombstone)
    }

    /// Number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All paths present on either of two manifests.
    pub fn union_paths<'a>(&'a self, other: &'a Manifest) -> Vec<&'a SecretPath> {
        let mut paths: Vec<&SecretPath> = self.entries.keys().collect();
        for path in other.entries.keys() {
            if !self.entries.contains_key(path) {
                paths.push(path);
            }
        }
        paths.sort();
        paths
    }

    /// Serialize to bytes for sealing and storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultsync_common::HASH_LENGTH;

    fn hash(byte: u8) -> ContentHash {
        ContentHash::from_bytes([byte; HASH_LENGTH])
    }

    fn entry(device: &str, seq: u64, byte: u8) -> SecretEntry {
        SecretEntry::new(
            hash(byte),
            4,
            DeviceId::new(device).unwrap(),
            seq,
            &RevisionVector::new(),
        )
    }

    #[test]
    fn test_upsert_updates_summary_vector() {
        let mut manifest = Manifest::new();
        let laptop = DeviceId::new("laptop").unwrap();

        manifest.upsert(SecretPath::parse("a").unwrap(), entry("laptop", 3, 1));

        assert_eq!(manifest.revision.get(&laptop), 3);
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_live_entries_skip_tombstones() {
        let mut manifest = Manifest::new();
        let live = entry("laptop", 1, 1);
        let tomb = SecretEntry::tombstone_of(&live, DeviceId::new("laptop").unwrap(), 2);

        manifest.upsert(SecretPath::parse("keep").unwrap(), live);
        manifest.upsert(SecretPath::parse("gone").unwrap(), tomb);

        let live_paths: Vec<String> = manifest
            .live_entries()
            .map(|(p, _)| p.to_string())
            .collect();
        assert_eq!(live_paths, vec!["keep".to_string()]);
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn test_union_paths() {
        let mut a = Manifest::new();
        let mut b = Manifest::new();
        a.upsert(SecretPath::parse("only-a").unwrap(), entry("x", 1, 1));
        a.upsert(SecretPath::parse("shared").unwrap(), entry("x", 2, 2));
        b.upsert(SecretPath::parse("shared").unwrap(), entry("y", 1, 3));
        b.upsert(SecretPath::parse("only-b").unwrap(), entry("y", 2, 4));

        let paths: Vec<String> = a.union_paths(&b).iter().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["only-a", "only-b", "shared"]);
    }

    #[test]
    fn test_conflict_marker_replacement() {
        let mut manifest = Manifest::new();
        let path = SecretPath::parse("contested").unwrap();

        let marker = |remote: u8| ConflictMarker {
            path: path.clone(),
            local_hash: hash(1),
            remote_hash: hash(remote),
            remote_device: DeviceId::new("phone").unwrap(),
            renamed_path: None,
            detected_at: Utc::now(),
        };

        manifest.record_conflict(marker(2));
        manifest.record_conflict(marker(3));
        assert_eq!(manifest.conflicts.len(), 1);
        assert_eq!(manifest.conflicts[0].remote_hash, hash(3));

        manifest.clear_conflict(&path);
        assert!(manifest.conflicts.is_empty());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let mut manifest = Manifest::new();
        manifest.upsert(SecretPath::parse("a/b").unwrap(), entry("laptop", 1, 5));

        let bytes = manifest.to_bytes().unwrap();
        let restored = Manifest::from_bytes(&bytes).unwrap();
        assert_eq!(restored, manifest);
    }
}
