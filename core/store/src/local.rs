//! Local filesystem object store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use crate::object::ObjectStore;
use vaultsync_common::{Error, Result};

/// Directory-backed object store.
///
/// Objects live as files under the root directory, keyed by their
/// slash-separated object key. Pointers live under `pointers/` and are
/// updated via a temp file plus atomic rename. Compare-and-swap is
/// serialized by an in-process mutex; one process per store directory is
/// assumed (the shared-store deployment uses a remote backend).
pub struct LocalStore {
    root: PathBuf,
    cas_lock: Mutex<()>,
}

impl LocalStore {
    /// Create a local store rooted at the given directory.
    ///
    /// The root directory is created if it does not exist.
    ///
    /// # Errors
    /// - Invalid path or permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Sync create for constructor
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        Ok(Self {
            root,
            cas_lock: Mutex::new(()),
        })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for component in key.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(Error::InvalidInput(format!(
                    "Invalid object key: '{}'",
                    key
                )));
            }
            path.push(component);
        }
        Ok(path)
    }

    fn pointer_path(&self, name: &str) -> Result<PathBuf> {
        self.object_path(&format!("pointers/{}", name))
    }

    /// Write bytes to `path` atomically via a temp file and rename.
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.object_path(key)?;
        self.write_atomic(&path, &bytes).await
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Object not found: {}", key)))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        Ok(self.object_path(key)?.is_file())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        // Keys are flat within a prefix directory (e.g. "blobs/").
        let dir = self.object_path(prefix.trim_end_matches('/'))?;
        let mut keys = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(Error::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.ends_with(".tmp") {
                    continue;
                }
                keys.push(format!("{}/{}", prefix.trim_end_matches('/'), name));
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn get_pointer(&self, name: &str) -> Result<Option<String>> {
        let path = self.pointer_path(name)?;
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn compare_and_swap_pointer(
        &self,
        name: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<()> {
        let _guard = self.cas_lock.lock().await;

        let current = self.get_pointer(name).await?;
        if current.as_deref() != expected {
            return Err(Error::ConcurrentPublish {
                pointer: name.to_string(),
            });
        }

        let path = self.pointer_path(name)?;
        self.write_atomic(&path, new.as_bytes()).await
    }
}
