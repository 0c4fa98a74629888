//! Machine-readable summary of a sync run.

use serde::{Deserialize, Serialize};

use vaultsync_common::{ContentHash, DeviceId, SecretPath};
use vaultsync_manifest::ConflictMarker;

/// One unresolved conflict, as reported to the caller.
///
/// Conflicts are part of a successful report, never errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictSummary {
    /// The contested path; the retained content lives here.
    pub path: SecretPath,
    /// Device whose concurrent version lost the path.
    pub conflicting_device: DeviceId,
    /// Where the losing content was materialized (`None` when the losing
    /// side was a deletion).
    pub renamed_path: Option<SecretPath>,
}

impl From<&ConflictMarker> for ConflictSummary {
    fn from(marker: &ConflictMarker) -> Self {
        Self {
            path: marker.path.clone(),
            conflicting_device: marker.remote_device.clone(),
            renamed_path: marker.renamed_path.clone(),
        }
    }
}

/// Result of one sync run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Entries only this device had; now visible to the vault.
    pub pushed: usize,
    /// Entries adopted from the remote manifest.
    pub pulled: usize,
    /// Concurrent but identical writes collapsed to one entry.
    pub auto_merged: usize,
    /// Paths already identical on both sides.
    pub unchanged: usize,
    /// Conflicts surfaced during this run.
    pub conflicts: Vec<ConflictSummary>,
    /// Whether a new manifest was published (false for an up-to-date vault
    /// and for dry runs).
    pub published: bool,
    /// The manifest head after this run.
    pub head: Option<ContentHash>,
    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: u64,
}

impl SyncReport {
    /// Whether the run changed nothing anywhere.
    pub fn is_noop(&self) -> bool {
        self.pushed == 0 && self.pulled == 0 && self.auto_merged == 0 && self.conflicts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_to_json() {
        let report = SyncReport {
            pushed: 2,
            pulled: 1,
            ..Default::default()
        };

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"pushed\":2"));

        let restored: SyncReport = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.pushed, 2);
        assert_eq!(restored.pulled, 1);
        assert!(!restored.published);
    }

    #[test]
    fn test_is_noop() {
        assert!(SyncReport::default().is_noop());
        let busy = SyncReport {
            pulled: 1,
            ..Default::default()
        };
        assert!(!busy.is_noop());
    }
}
