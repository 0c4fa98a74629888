//! Content-addressed blob storage over an object store.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::object::ObjectStore;
use vaultsync_common::{ContentHash, Error, Result, HASH_LENGTH};

/// Key prefix for blob objects.
const BLOB_PREFIX: &str = "blobs";

/// Default per-operation deadline for store calls.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Compute the content hash of a byte sequence (Blake2b-256).
///
/// Callers hash ciphertext, never plaintext, so the store can address and
/// deduplicate blobs without key material.
pub fn content_hash(bytes: &[u8]) -> ContentHash {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(bytes);
    let digest = hasher.finalize();

    let mut hash = [0u8; HASH_LENGTH];
    hash.copy_from_slice(&digest);
    ContentHash::from_bytes(hash)
}

/// Content-addressed, write-once blob layer.
///
/// Blobs are keyed by the hash of their own bytes and never mutated or
/// deleted here; garbage collection of unreferenced blobs is an external
/// policy. Every store call is bounded by the configured timeout.
pub struct BlobStore {
    store: Arc<dyn ObjectStore>,
    op_timeout: Duration,
}

impl BlobStore {
    /// Create a blob store over the given backend.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Set the per-operation deadline for store calls.
    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Access the underlying object store.
    pub fn backend(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// The per-operation deadline applied to store calls.
    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    fn blob_key(hash: &ContentHash) -> String {
        format!("{}/{}", BLOB_PREFIX, hash)
    }

    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| Error::Timeout(format!("{} exceeded {:?}", what, self.op_timeout)))?
    }

    /// Store a blob, returning its content hash.
    ///
    /// Idempotent: putting identical bytes twice returns the same hash and
    /// performs at most one physical write.
    pub async fn put(&self, bytes: Vec<u8>) -> Result<ContentHash> {
        let hash = content_hash(&bytes);
        let key = Self::blob_key(&hash);

        if self.bounded("object_exists", self.store.object_exists(&key)).await? {
            debug!(blob = %hash, "blob already stored, skipping write");
            return Ok(hash);
        }

        self.bounded("put_object", self.store.put_object(&key, bytes))
            .await?;
        debug!(blob = %hash, "blob stored");
        Ok(hash)
    }

    /// Fetch a blob by content hash.
    ///
    /// # Errors
    /// - `Error::NotFound` naming the hash if the blob is missing
    /// - `Error::Storage` if the stored bytes do not match their hash
    ///   (store corruption)
    pub async fn get(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        let key = Self::blob_key(hash);
        let bytes = self
            .bounded("get_object", self.store.get_object(&key))
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => Error::NotFound(format!("Blob not found: {}", hash)),
                other => other,
            })?;

        let actual = content_hash(&bytes);
        if actual != *hash {
            return Err(Error::Storage(format!(
                "Blob {} failed digest verification (got {})",
                hash, actual
            )));
        }

        Ok(bytes)
    }

    /// Whether a blob exists in the store.
    pub async fn contains(&self, hash: &ContentHash) -> Result<bool> {
        let key = Self::blob_key(hash);
        self.bounded("object_exists", self.store.object_exists(&key))
            .await
    }

    /// List all stored blob hashes.
    pub async fn list(&self) -> Result<Vec<ContentHash>> {
        let prefix = format!("{}/", BLOB_PREFIX);
        let keys = self
            .bounded("list_objects", self.store.list_objects(&prefix))
            .await?;

        keys.iter()
            .map(|key| {
                let hex = key.trim_start_matches(&prefix);
                ContentHash::parse(hex)
                    .map_err(|_| Error::Storage(format!("Malformed blob key: {}", key)))
            })
            .collect()
    }
}
