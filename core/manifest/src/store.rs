//! Sealed, content-addressed manifest persistence.

use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::manifest::Manifest;
use vaultsync_common::{ContentHash, Error, Result};
use vaultsync_crypto::{open, seal, VaultKey};
use vaultsync_store::{BlobStore, ObjectStore, MANIFEST_POINTER};

/// Loads and publishes manifests through the content store.
///
/// A manifest is serialized, sealed with the vault key, and stored like
/// any other blob; the `manifest.head` pointer names the current version.
/// Publishing is a blob write plus a single compare-and-swap, so a
/// concurrent reader sees either the old manifest or the new one, never a
/// partial state.
pub struct ManifestStore {
    blobs: BlobStore,
    store: Arc<dyn ObjectStore>,
}

impl ManifestStore {
    /// Create a manifest store sharing the given backend.
    pub fn new(blobs: BlobStore, store: Arc<dyn ObjectStore>) -> Self {
        Self { blobs, store }
    }

    /// Access the shared blob layer.
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Pointer calls get the same deadline as blob calls; a stalled
    /// transport must fail the sync run, not hang it.
    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let deadline = self.blobs.op_timeout();
        tokio::time::timeout(deadline, fut)
            .await
            .map_err(|_| Error::Timeout(format!("{} exceeded {:?}", what, deadline)))?
    }

    /// Read the hash of the latest published manifest, if any.
    pub async fn fetch_head(&self) -> Result<Option<ContentHash>> {
        match self
            .bounded("get_pointer", self.store.get_pointer(MANIFEST_POINTER))
            .await?
        {
            Some(value) => Ok(Some(ContentHash::parse(&value)?)),
            None => Ok(None),
        }
    }

    /// Load and open the manifest stored under `hash`.
    ///
    /// # Errors
    /// - `Error::NotFound` if the manifest blob is missing (corruption)
    /// - `Error::AuthenticationFailed` on tampering or wrong key
    pub async fn load(&self, hash: &ContentHash, key: &VaultKey) -> Result<Manifest> {
        let sealed = self.blobs.get(hash).await?;
        let plaintext = open(key, &sealed)?;
        Manifest::from_bytes(&plaintext)
    }

    /// Seal a manifest and store it as a blob without touching the head
    /// pointer. An unreferenced manifest blob is harmless garbage.
    pub async fn store(&self, manifest: &Manifest, key: &VaultKey) -> Result<ContentHash> {
        let sealed = seal(key, &manifest.to_bytes()?)?;
        self.blobs.put(sealed).await
    }

    /// Advance the head pointer from `expected_head` to `new_head`.
    ///
    /// # Errors
    /// - `Error::ConcurrentPublish` if another device advanced the pointer
    ///   first; the prior head remains visible to all readers
    pub async fn advance_head(
        &self,
        expected_head: Option<&ContentHash>,
        new_head: &ContentHash,
    ) -> Result<()> {
        let expected = expected_head.map(|h| h.to_hex());
        self.bounded(
            "compare_and_swap_pointer",
            self.store.compare_and_swap_pointer(
                MANIFEST_POINTER,
                expected.as_deref(),
                &new_head.to_hex(),
            ),
        )
        .await?;

        debug!(head = %new_head, "manifest head advanced");
        Ok(())
    }

    /// Seal and store a manifest, then advance the head pointer from
    /// `expected_head` to the new manifest's hash.
    pub async fn publish(
        &self,
        manifest: &Manifest,
        key: &VaultKey,
        expected_head: Option<&ContentHash>,
    ) -> Result<ContentHash> {
        let hash = self.store(manifest, key).await?;
        self.advance_head(expected_head, &hash).await?;
        Ok(hash)
    }
}
