//! Persisted local device state.
//!
//! Two files live in the state directory and survive process restarts:
//! `device.json`, the device id plus its sequence counter and the hash of
//! the last manifest this device accepted (no secret material, stored as
//! plain JSON), and `manifest.sealed`, the local working manifest sealed
//! with the vault key. Both are written via a temp file and atomic rename
//! so a crash mid-write never leaves a torn state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::manifest::Manifest;
use vaultsync_common::{ContentHash, DeviceId, Error, Result};
use vaultsync_crypto::{open, seal, VaultKey};

const DEVICE_FILENAME: &str = "device.json";
const MANIFEST_FILENAME: &str = "manifest.sealed";

/// Durable per-device sync state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    /// This device's stable identity.
    pub device_id: DeviceId,
    /// This device's local write counter. Only this device increments it.
    pub sequence: u64,
    /// Hash of the last manifest this device accepted (its local head).
    pub head: Option<ContentHash>,
}

/// Handle to the state directory holding device state and the local
/// working manifest.
pub struct LocalState {
    dir: PathBuf,
    pub device: DeviceState,
}

impl LocalState {
    /// Enroll a new device: create the state directory and its initial
    /// state file.
    ///
    /// # Errors
    /// - `Error::AlreadyExists` if the directory already holds device state
    pub async fn create(dir: impl AsRef<Path>, device_id: DeviceId) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let device_path = dir.join(DEVICE_FILENAME);
        if device_path.exists() {
            return Err(Error::AlreadyExists(format!(
                "Device state already present in {}",
                dir.display()
            )));
        }
        fs::create_dir_all(&dir).await?;

        let state = Self {
            dir,
            device: DeviceState {
                device_id,
                sequence: 0,
                head: None,
            },
        };
        state.save().await?;
        Ok(state)
    }

    /// Load existing device state from a state directory.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let device_path = dir.join(DEVICE_FILENAME);

        let content = match fs::read_to_string(&device_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "No device state in {}",
                    dir.display()
                )));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let device: DeviceState =
            serde_json::from_str(&content).map_err(|e| Error::Serialization(e.to_string()))?;

        Ok(Self { dir, device })
    }

    /// Persist the device state.
    pub async fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.device)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        write_atomic(&self.dir.join(DEVICE_FILENAME), json.as_bytes()).await
    }

    /// Allocate the next local sequence number and persist it before
    /// returning, so a crash never reuses a sequence.
    pub async fn next_sequence(&mut self) -> Result<u64> {
        self.device.sequence += 1;
        self.save().await?;
        Ok(self.device.sequence)
    }

    /// Record a newly accepted manifest head and persist it.
    pub async fn set_head(&mut self, head: ContentHash) -> Result<()> {
        self.device.head = Some(head);
        self.save().await
    }

    /// Load the local working manifest, or an empty manifest if none has
    /// been written yet.
    pub async fn load_manifest(&self, key: &VaultKey) -> Result<Manifest> {
        let path = self.dir.join(MANIFEST_FILENAME);
        let sealed = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Manifest::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let plaintext = open(key, &sealed)?;
        Manifest::from_bytes(&plaintext)
    }

    /// Seal and persist the local working manifest atomically.
    pub async fn save_manifest(&self, manifest: &Manifest, key: &VaultKey) -> Result<()> {
        let sealed = seal(key, &manifest.to_bytes()?)?;
        write_atomic(&self.dir.join(MANIFEST_FILENAME), &sealed).await
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
