//! The vault descriptor: shared bootstrap data stored next to the blobs.
//!
//! The descriptor holds everything a new device needs to derive the vault
//! key from the shared passphrase: KDF parameters, the salt, and a sealed
//! check value that fails authentication under a wrong passphrase before
//! any manifest is touched. It contains no secret material itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use vaultsync_common::{Error, Result};
use vaultsync_crypto::{derive_key, open, seal, KdfParams, Salt, VaultKey};
use vaultsync_store::ObjectStore;

const DESCRIPTOR_KEY: &str = "vault.json";
const CHECK_PLAINTEXT: &[u8] = b"vault-sync key check";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultDescriptor {
    pub kdf: KdfParams,
    pub salt: Salt,
    /// `CHECK_PLAINTEXT` sealed with the vault key; opening it proves the
    /// passphrase without exposing anything.
    check: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl VaultDescriptor {
    /// Create a descriptor for a fresh vault, deriving and returning its key.
    pub fn create(passphrase: &[u8], kdf: KdfParams) -> Result<(Self, VaultKey)> {
        let salt = Salt::generate();
        let key = derive_key(passphrase, &salt, &kdf)?;
        let check = seal(&key, CHECK_PLAINTEXT)?;

        Ok((
            Self {
                kdf,
                salt,
                check,
                created_at: Utc::now(),
            },
            key,
        ))
    }

    /// Derive the vault key from a passphrase, verifying it against the
    /// sealed check value.
    ///
    /// # Errors
    /// - `Error::AuthenticationFailed` on a wrong passphrase
    pub fn unlock(&self, passphrase: &[u8]) -> Result<VaultKey> {
        let key = derive_key(passphrase, &self.salt, &self.kdf)?;
        open(&key, &self.check)?;
        Ok(key)
    }

    /// Write the descriptor to the store. Fails if one already exists:
    /// a vault is initialized exactly once.
    pub async fn publish(&self, store: &Arc<dyn ObjectStore>) -> Result<()> {
        if store.object_exists(DESCRIPTOR_KEY).await? {
            return Err(Error::AlreadyExists(
                "Store already holds a vault descriptor".to_string(),
            ));
        }
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        store.put_object(DESCRIPTOR_KEY, bytes).await
    }

    /// Load the descriptor from the store.
    ///
    /// # Errors
    /// - `Error::NotFound` if the store was never initialized
    pub async fn fetch(store: &Arc<dyn ObjectStore>) -> Result<Self> {
        let bytes = store.get_object(DESCRIPTOR_KEY).await.map_err(|e| match e {
            Error::NotFound(_) => {
                Error::NotFound("No vault in this store; run 'init' first".to_string())
            }
            other => other,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}
