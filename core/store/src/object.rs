//! Object store trait definition.

use async_trait::async_trait;

use vaultsync_common::Result;

/// Name of the pointer that tracks the latest published manifest.
pub const MANIFEST_POINTER: &str = "manifest.head";

/// Byte-oriented object store backing a vault.
///
/// This is the only dependency on infrastructure outside the sync core;
/// any blob or key/value backend satisfying this contract is acceptable.
/// Objects are opaque ciphertext from the store's perspective. Pointers
/// are small named values with a compare-and-swap update, used for the
/// manifest head.
///
/// All operations are async. Implementations must provide their own
/// authentication and durability guarantees.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get the backend name (e.g., "memory", "local").
    fn name(&self) -> &str;

    /// Store bytes under a key, overwriting any prior value.
    ///
    /// # Postconditions
    /// - A subsequent `get_object(key)` returns exactly `bytes`
    ///
    /// # Errors
    /// - Network/I/O errors
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Fetch the bytes stored under a key.
    ///
    /// # Errors
    /// - `Error::NotFound` if no object exists under `key`
    /// - Network/I/O errors
    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    /// Whether an object exists under a key.
    async fn object_exists(&self, key: &str) -> Result<bool>;

    /// List all object keys with the given prefix.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;

    /// Read the current value of a named pointer.
    ///
    /// Returns `None` if the pointer has never been published.
    async fn get_pointer(&self, name: &str) -> Result<Option<String>>;

    /// Atomically advance a named pointer from an expected prior value.
    ///
    /// `expected` of `None` means the pointer must not yet exist. Exactly
    /// one concurrent caller with the same `expected` value succeeds.
    ///
    /// # Errors
    /// - `Error::ConcurrentPublish` if the current value differs from
    ///   `expected` (the pointer moved underneath the caller)
    async fn compare_and_swap_pointer(
        &self,
        name: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<()>;
}
