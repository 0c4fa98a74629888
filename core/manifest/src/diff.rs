//! Entry-by-entry diffing between two manifests.

use crate::entry::SecretEntry;
use crate::manifest::Manifest;
use crate::revision::CausalOrder;
use vaultsync_common::SecretPath;

/// Classification of one path's divergence between local and remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffClass {
    /// Same entry on both sides; nothing to do.
    Unchanged,
    /// Local write the remote has not seen; keep local and propagate.
    LocalAhead,
    /// Remote write the local side has not seen; adopt remote.
    RemoteAhead,
    /// Vectors are incomparable; hand to the conflict resolver. A
    /// tombstone racing an edit lands here too: a deletion never silently
    /// wins against a concurrent modification.
    Concurrent,
}

/// One row of a manifest diff: a path and what each side knows about it.
#[derive(Debug, Clone)]
pub struct DiffRow<'a> {
    pub path: &'a SecretPath,
    pub local: Option<&'a SecretEntry>,
    pub remote: Option<&'a SecretEntry>,
}

impl<'a> DiffRow<'a> {
    /// Classify this row using revision-vector comparison.
    pub fn classify(&self) -> DiffClass {
        match (self.local, self.remote) {
            // Presence on one side only means the other side has not yet
            // seen the write: deletions leave tombstones, so absence is
            // never a deletion in disguise.
            (Some(_), None) => DiffClass::LocalAhead,
            (None, Some(_)) => DiffClass::RemoteAhead,
            (None, None) => DiffClass::Unchanged,
            (Some(local), Some(remote)) => match local.revision.compare(&remote.revision) {
                CausalOrder::After => DiffClass::LocalAhead,
                CausalOrder::Before => DiffClass::RemoteAhead,
                CausalOrder::Equal => {
                    if local == remote {
                        DiffClass::Unchanged
                    } else {
                        // Equal vectors with different content cannot be
                        // produced by well-behaved devices; trust neither.
                        DiffClass::Concurrent
                    }
                }
                CausalOrder::Concurrent => DiffClass::Concurrent,
            },
        }
    }
}

/// Produce one row per path present in either manifest.
///
/// Classification is symmetric: swapping the arguments turns every
/// `LocalAhead` into `RemoteAhead` and vice versa, and never yields
/// both-ahead.
pub fn diff<'a>(local: &'a Manifest, remote: &'a Manifest) -> Vec<DiffRow<'a>> {
    local
        .union_paths(remote)
        .into_iter()
        .map(|path| DiffRow {
            path,
            local: local.get(path),
            remote: remote.get(path),
        })
        .collect()
}
