//! Manifest entries: one immutable version of one secret.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::revision::RevisionVector;
use vaultsync_common::{ContentHash, DeviceId};

/// The current version of a secret at a logical path.
///
/// Immutable once written: a new version is a new `SecretEntry` value,
/// never an in-place mutation. Tombstones retain the content hash so a
/// deletion keeps its causal history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEntry {
    /// Hash of the sealed blob holding this version's content.
    pub content_hash: ContentHash,
    /// Plaintext size in bytes.
    pub size: u64,
    /// Wall-clock modification time on the writing device (informational;
    /// causality comes from the revision vector, never from clocks).
    pub modified: DateTime<Utc>,
    /// The writing device's local sequence number for this write.
    pub sequence: u64,
    /// Device that wrote this version.
    pub device: DeviceId,
    /// True when this path was deleted; the hash is retained for causality.
    pub tombstone: bool,
    /// Causal knowledge at the time of the write.
    pub revision: RevisionVector,
}

impl SecretEntry {
    /// Create a new live entry written by `device` at sequence `sequence`.
    ///
    /// `base` is the writer's causal knowledge before the write; the
    /// entry's vector is `base` with the writer's own slot bumped.
    pub fn new(
        content_hash: ContentHash,
        size: u64,
        device: DeviceId,
        sequence: u64,
        base: &RevisionVector,
    ) -> Self {
        let mut revision = base.clone();
        revision.record(&device, sequence);

        Self {
            content_hash,
            size,
            modified: Utc::now(),
            sequence,
            device,
            tombstone: false,
            revision,
        }
    }

    /// Create a tombstone superseding `prior`, written by `device`.
    ///
    /// The prior content hash is retained so the deletion carries its
    /// causal history.
    pub fn tombstone_of(prior: &SecretEntry, device: DeviceId, sequence: u64) -> Self {
        let mut revision = prior.revision.clone();
        revision.record(&device, sequence);

        Self {
            content_hash: prior.content_hash,
            size: 0,
            modified: Utc::now(),
            sequence,
            device,
            tombstone: true,
            revision,
        }
    }
}
