//! Deterministic resolution of concurrent modifications.
//!
//! No last-writer-wins: wall clocks never pick a winner. Identical
//! concurrent writes collapse to one entry; differing writes keep both,
//! with the losing side materialized under a derived conflict path.

use chrono::{DateTime, Utc};
use tracing::debug;

use vaultsync_common::{Result, SecretPath};
use vaultsync_manifest::{ConflictMarker, SecretEntry};

/// Outcome of resolving one concurrent row.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Both sides are reconciled into a single entry at the original path.
    AutoMerge {
        /// Entry whose vector dominates both parents.
        merged: SecretEntry,
    },
    /// Neither side is discarded.
    KeepBoth {
        /// Entry retained at the original path; its vector dominates both
        /// parents so the resolution propagates without re-conflicting.
        retained: SecretEntry,
        /// The losing version under its derived conflict path, or `None`
        /// when the losing side was a deletion with nothing to keep.
        renamed: Option<(SecretPath, SecretEntry)>,
        /// Marker recorded in the manifest for user attention.
        marker: ConflictMarker,
    },
}

/// Resolve a concurrent modification of `path`.
///
/// `contents_match` reports whether the two live plaintexts are identical
/// (the caller decrypts and compares; hashes alone cannot tell, since
/// independent seals of the same plaintext produce different ciphertext).
/// It is ignored when either side is a tombstone.
///
/// The merged vector is always the pairwise maximum of both parents, with
/// no extra increment: any device resolving the same pair produces the
/// same vector, so racing resolvers converge instead of ping-ponging.
pub fn resolve(
    path: &SecretPath,
    local: &SecretEntry,
    remote: &SecretEntry,
    contents_match: bool,
    detected_at: DateTime<Utc>,
) -> Result<Resolution> {
    let merged_revision = local.revision.merge_max(&remote.revision);

    match (local.tombstone, remote.tombstone) {
        // Both deleted: the deletions agree, collapse to one tombstone.
        (true, true) => {
            let mut merged = min_hash_side(local, remote).clone();
            merged.revision = merged_revision;
            Ok(Resolution::AutoMerge { merged })
        }
        // An edit races a deletion: the edit survives at the path and the
        // conflict is surfaced, but there is no content to rename.
        (true, false) | (false, true) => {
            let (survivor, deleter) = if local.tombstone {
                (remote, local)
            } else {
                (local, remote)
            };
            debug!(path = %path, deleter = %deleter.device, "edit survives concurrent deletion");

            let mut retained = survivor.clone();
            retained.revision = merged_revision;

            let marker = ConflictMarker {
                path: path.clone(),
                local_hash: survivor.content_hash,
                remote_hash: deleter.content_hash,
                remote_device: deleter.device.clone(),
                renamed_path: None,
                detected_at,
            };

            Ok(Resolution::KeepBoth {
                retained,
                renamed: None,
                marker,
            })
        }
        (false, false) if contents_match => {
            // Same plaintext written independently on two devices. Keep one
            // entry; the lower hash wins so every resolver picks the same
            // blob.
            let mut merged = min_hash_side(local, remote).clone();
            merged.revision = merged_revision;
            debug!(path = %path, "identical concurrent writes auto-merged");
            Ok(Resolution::AutoMerge { merged })
        }
        (false, false) => {
            // Differing content. Local keeps the path; the remote version
            // moves to a derived conflict path where it is one-sided and
            // propagates normally.
            let renamed_path = conflict_path(path, remote)?;
            debug!(path = %path, renamed = %renamed_path, "concurrent edits kept both");

            let mut retained = local.clone();
            retained.revision = merged_revision;

            let marker = ConflictMarker {
                path: path.clone(),
                local_hash: local.content_hash,
                remote_hash: remote.content_hash,
                remote_device: remote.device.clone(),
                renamed_path: Some(renamed_path.clone()),
                detected_at,
            };

            Ok(Resolution::KeepBoth {
                retained,
                renamed: Some((renamed_path, remote.clone())),
                marker,
            })
        }
    }
}

fn min_hash_side<'a>(a: &'a SecretEntry, b: &'a SecretEntry) -> &'a SecretEntry {
    if a.content_hash <= b.content_hash {
        a
    } else {
        b
    }
}

/// Derive the path for a losing conflict version:
/// `{stem}.conflict-{device-prefix}-{timestamp}{ext}` next to the
/// original. Built only from the losing entry's own device id and write
/// time, so re-running the resolver derives the same path.
fn conflict_path(path: &SecretPath, loser: &SecretEntry) -> Result<SecretPath> {
    let name = path.name();
    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    };

    // Device ids are free-form; keep only path-safe characters so the
    // derived name always parses.
    let prefix: String = loser
        .device
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(8)
        .collect();

    path.with_name(&format!(
        "{}.conflict-{}-{}{}",
        stem,
        prefix,
        loser.modified.format("%Y%m%d%H%M%S"),
        ext
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vaultsync_common::{ContentHash, DeviceId, HASH_LENGTH};
    use vaultsync_manifest::RevisionVector;

    fn hash(byte: u8) -> ContentHash {
        ContentHash::from_bytes([byte; HASH_LENGTH])
    }

    fn path(s: &str) -> SecretPath {
        SecretPath::parse(s).unwrap()
    }

    fn when() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap()
    }

    fn concurrent_pair() -> (SecretEntry, SecretEntry) {
        let base = SecretEntry::new(
            hash(1),
            4,
            DeviceId::new("laptop-alpha").unwrap(),
            1,
            &RevisionVector::new(),
        );
        let local = SecretEntry::new(
            hash(2),
            4,
            DeviceId::new("laptop-alpha").unwrap(),
            2,
            &base.revision,
        );
        let mut remote = SecretEntry::new(
            hash(9),
            4,
            DeviceId::new("phone-beta").unwrap(),
            1,
            &base.revision,
        );
        // Pin the write time so derived conflict paths are predictable.
        remote.modified = when();
        (local, remote)
    }

    #[test]
    fn test_identical_contents_auto_merge() {
        let (local, remote) = concurrent_pair();
        let p = path("api.key");

        let resolution = resolve(&p, &local, &remote, true, when()).unwrap();
        match resolution {
            Resolution::AutoMerge { merged } => {
                // Lower hash wins deterministically.
                assert_eq!(merged.content_hash, hash(2));
                assert!(merged.revision.dominates(&local.revision));
                assert!(merged.revision.dominates(&remote.revision));
            }
            other => panic!("expected auto-merge, got {:?}", other),
        }
    }

    #[test]
    fn test_auto_merge_is_symmetric() {
        let (local, remote) = concurrent_pair();
        let p = path("api.key");

        let a = resolve(&p, &local, &remote, true, when()).unwrap();
        let b = resolve(&p, &remote, &local, true, when()).unwrap();

        match (a, b) {
            (Resolution::AutoMerge { merged: ma }, Resolution::AutoMerge { merged: mb }) => {
                assert_eq!(ma.content_hash, mb.content_hash);
                assert_eq!(ma.revision, mb.revision);
            }
            other => panic!("expected auto-merge on both sides, got {:?}", other),
        }
    }

    #[test]
    fn test_differing_contents_keep_both() {
        let (local, remote) = concurrent_pair();
        let p = path("prod/api.key");

        let resolution = resolve(&p, &local, &remote, false, when()).unwrap();
        match resolution {
            Resolution::KeepBoth {
                retained,
                renamed,
                marker,
            } => {
                assert_eq!(retained.content_hash, local.content_hash);
                assert!(retained.revision.dominates(&remote.revision));

                let (renamed_path, renamed_entry) = renamed.expect("losing side has content");
                assert_eq!(
                    renamed_path.to_string(),
                    "prod/api.conflict-phone-be-20240301123045.key"
                );
                assert_eq!(renamed_entry.content_hash, remote.content_hash);
                // The renamed entry keeps its own vector so it propagates
                // as a one-sided write at the new path.
                assert_eq!(renamed_entry.revision, remote.revision);

                assert_eq!(marker.path, p);
                assert_eq!(marker.renamed_path, Some(renamed_path));
                assert_eq!(marker.remote_device.as_str(), "phone-beta");
            }
            other => panic!("expected keep-both, got {:?}", other),
        }
    }

    #[test]
    fn test_conflict_path_without_extension() {
        let (local, remote) = concurrent_pair();
        let p = path("token");

        let resolution = resolve(&p, &local, &remote, false, when()).unwrap();
        match resolution {
            Resolution::KeepBoth { renamed, .. } => {
                let (renamed_path, _) = renamed.unwrap();
                assert_eq!(
                    renamed_path.to_string(),
                    "token.conflict-phone-be-20240301123045"
                );
            }
            other => panic!("expected keep-both, got {:?}", other),
        }
    }

    #[test]
    fn test_conflict_path_strips_unsafe_device_characters() {
        let (local, mut remote) = concurrent_pair();
        remote.device = DeviceId::new("us/east/laptop").unwrap();
        let p = path("token");

        let resolution = resolve(&p, &local, &remote, false, when()).unwrap();
        match resolution {
            Resolution::KeepBoth { renamed, .. } => {
                let (renamed_path, _) = renamed.unwrap();
                // Separators in the device id must not leak into the name.
                assert_eq!(
                    renamed_path.to_string(),
                    "token.conflict-useastla-20240301123045"
                );
            }
            other => panic!("expected keep-both, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_vs_edit_keeps_edit() {
        let (local, remote) = concurrent_pair();
        let tomb = SecretEntry::tombstone_of(&local, local.device.clone(), 3);
        let p = path("doomed");

        let resolution = resolve(&p, &tomb, &remote, false, when()).unwrap();
        match resolution {
            Resolution::KeepBoth {
                retained,
                renamed,
                marker,
            } => {
                assert!(!retained.tombstone);
                assert_eq!(retained.content_hash, remote.content_hash);
                assert!(retained.revision.dominates(&tomb.revision));
                assert!(renamed.is_none());
                assert!(marker.renamed_path.is_none());
                assert_eq!(marker.remote_device, tomb.device);
            }
            other => panic!("expected keep-both, got {:?}", other),
        }
    }

    #[test]
    fn test_double_delete_merges() {
        let (local, remote) = concurrent_pair();
        let tomb_a = SecretEntry::tombstone_of(&local, local.device.clone(), 3);
        let tomb_b = SecretEntry::tombstone_of(&remote, remote.device.clone(), 2);

        let resolution = resolve(&path("gone"), &tomb_a, &tomb_b, false, when()).unwrap();
        match resolution {
            Resolution::AutoMerge { merged } => {
                assert!(merged.tombstone);
                assert!(merged.revision.dominates(&tomb_a.revision));
                assert!(merged.revision.dominates(&tomb_b.revision));
            }
            other => panic!("expected auto-merge, got {:?}", other),
        }
    }

    #[test]
    fn test_resolution_converges_on_repeat() {
        // Resolving the pair twice (as two racing devices would) yields
        // entries with equal vectors, so the second resolver adopts the
        // first's publish instead of re-conflicting.
        let (local, remote) = concurrent_pair();
        let p = path("s");

        let first = resolve(&p, &local, &remote, false, when()).unwrap();
        let second = resolve(&p, &remote, &local, false, when()).unwrap();

        let (ra, rb) = match (first, second) {
            (Resolution::KeepBoth { retained: a, .. }, Resolution::KeepBoth { retained: b, .. }) => {
                (a, b)
            }
            other => panic!("expected keep-both on both sides, got {:?}", other),
        };
        assert_eq!(ra.revision, rb.revision);
    }
}
