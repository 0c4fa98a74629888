//! The vault facade: local secret operations over a shared store.
//!
//! Local operations (`add`, `read`, `remove`, `list`) touch only the
//! device's working manifest and the blob layer; nothing becomes visible
//! to other devices until `sync` publishes a new manifest head.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use vaultsync_common::{ContentHash, DeviceId, Error, Result, SecretPath, SensitiveBytes};
use vaultsync_crypto::{open, seal, VaultKey};
use vaultsync_manifest::{LocalState, Manifest, ManifestStore, SecretEntry};
use vaultsync_store::{BlobStore, ObjectStore, DEFAULT_OP_TIMEOUT};

use crate::report::ConflictSummary;

/// Tunables for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum retry attempts for a sync run on transient failure.
    pub max_retries: u32,
    /// Deadline applied to each store operation.
    pub op_timeout: Duration,
    /// Compute and report the sync outcome without writing anything.
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            op_timeout: DEFAULT_OP_TIMEOUT,
            dry_run: false,
        }
    }
}

/// Snapshot of a vault's state for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct VaultStatus {
    /// This device's identity.
    pub device: DeviceId,
    /// This device's local write counter.
    pub sequence: u64,
    /// Hash of the last manifest this device accepted.
    pub local_head: Option<ContentHash>,
    /// Hash of the latest published manifest in the store.
    pub remote_head: Option<ContentHash>,
    /// Live entries in the working manifest.
    pub live_entries: usize,
    /// Deleted entries still carried for causal history.
    pub tombstones: usize,
    /// Unresolved conflicts awaiting attention.
    pub conflicts: Vec<ConflictSummary>,
    /// Whether the local head matches the published head.
    pub in_sync: bool,
}

/// One device's handle to a shared, encrypted vault.
pub struct Vault {
    pub(crate) manifests: ManifestStore,
    pub(crate) state: LocalState,
    pub(crate) key: VaultKey,
    pub(crate) manifest: Manifest,
    pub(crate) config: SyncConfig,
}

impl Vault {
    /// Open a vault over the given store, loading the device's working
    /// manifest from local state.
    pub async fn open_with(
        store: Arc<dyn ObjectStore>,
        state: LocalState,
        key: VaultKey,
        config: SyncConfig,
    ) -> Result<Self> {
        let blobs = BlobStore::new(store.clone()).with_timeout(config.op_timeout);
        let manifests = ManifestStore::new(blobs, store);
        let manifest = state.load_manifest(&key).await?;

        Ok(Self {
            manifests,
            state,
            key,
            manifest,
            config,
        })
    }

    /// This device's identity.
    pub fn device_id(&self) -> &DeviceId {
        &self.state.device.device_id
    }

    /// The working manifest (local view, possibly unpublished).
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The sync configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Mutable access to the sync configuration.
    pub fn config_mut(&mut self) -> &mut SyncConfig {
        &mut self.config
    }

    /// Add or overwrite a secret at a logical path.
    ///
    /// The plaintext is sealed, stored as a blob, and recorded in the
    /// working manifest with this device's next sequence number. Writing
    /// to a conflicted path clears its marker: the user has decided.
    pub async fn add(&mut self, path: SecretPath, plaintext: &[u8]) -> Result<ContentHash> {
        let sealed = seal(&self.key, plaintext)?;
        let hash = self.manifests.blobs().put(sealed).await?;

        let sequence = self.state.next_sequence().await?;
        let base = self
            .manifest
            .get(&path)
            .map(|prior| prior.revision.clone())
            .unwrap_or_default();

        let entry = SecretEntry::new(
            hash,
            plaintext.len() as u64,
            self.device_id().clone(),
            sequence,
            &base,
        );

        debug!(path = %path, blob = %hash, sequence, "secret added");
        self.manifest.clear_conflict(&path);
        self.manifest.upsert(path, entry);
        self.state.save_manifest(&self.manifest, &self.key).await?;
        Ok(hash)
    }

    /// Read and decrypt the secret at a path.
    ///
    /// # Errors
    /// - `Error::NotFound` if the path is absent or deleted
    pub async fn read(&self, path: &SecretPath) -> Result<SensitiveBytes> {
        let entry = self.live_entry(path)?;
        let sealed = self.manifests.blobs().get(&entry.content_hash).await?;
        Ok(SensitiveBytes::new(open(&self.key, &sealed)?))
    }

    /// Delete the secret at a path, leaving a tombstone so the deletion
    /// propagates with its causal history.
    pub async fn remove(&mut self, path: &SecretPath) -> Result<()> {
        let prior = self.live_entry(path)?.clone();
        let sequence = self.state.next_sequence().await?;
        let tomb = SecretEntry::tombstone_of(&prior, self.device_id().clone(), sequence);

        debug!(path = %path, sequence, "secret removed");
        self.manifest.clear_conflict(path);
        self.manifest.upsert(path.clone(), tomb);
        self.state.save_manifest(&self.manifest, &self.key).await
    }

    /// List live secrets in the working manifest.
    pub fn list(&self) -> Vec<(SecretPath, SecretEntry)> {
        self.manifest
            .live_entries()
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect()
    }

    /// Report local and remote state without modifying anything.
    pub async fn status(&self) -> Result<VaultStatus> {
        let remote_head = self.manifests.fetch_head().await?;
        let live = self.manifest.live_entries().count();

        Ok(VaultStatus {
            device: self.device_id().clone(),
            sequence: self.state.device.sequence,
            local_head: self.state.device.head,
            remote_head,
            live_entries: live,
            tombstones: self.manifest.len() - live,
            conflicts: self
                .manifest
                .conflicts
                .iter()
                .map(ConflictSummary::from)
                .collect(),
            in_sync: self.state.device.head == remote_head && remote_head.is_some()
                || self.state.device.head.is_none()
                    && remote_head.is_none()
                    && self.manifest.is_empty(),
        })
    }

    fn live_entry(&self, path: &SecretPath) -> Result<&SecretEntry> {
        match self.manifest.get(path) {
            Some(entry) if !entry.tombstone => Ok(entry),
            _ => Err(Error::NotFound(format!("No secret at '{}'", path))),
        }
    }
}
