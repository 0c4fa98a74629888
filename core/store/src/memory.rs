//! In-memory object store for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::object::ObjectStore;
use vaultsync_common::{Error, Result};

/// In-memory object store.
///
/// Useful for testing and development. All data is stored in memory and
/// lost on drop. Tracks the number of physical object writes so tests can
/// observe blob-layer idempotence.
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    pointers: Arc<Mutex<HashMap<String, String>>>,
    write_count: AtomicUsize,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            pointers: Arc::new(Mutex::new(HashMap::new())),
            write_count: AtomicUsize::new(0),
        }
    }

    /// Number of physical `put_object` writes performed.
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.write_count.fetch_add(1, Ordering::SeqCst);
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", key)))
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        Ok(self
            .objects
            .read()
            .expect("lock poisoned")
            .contains_key(key))
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read().expect("lock poisoned");
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn get_pointer(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .pointers
            .lock()
            .expect("lock poisoned")
            .get(name)
            .cloned())
    }

    async fn compare_and_swap_pointer(
        &self,
        name: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<()> {
        let mut pointers = self.pointers.lock().expect("lock poisoned");
        let current = pointers.get(name).map(|s| s.as_str());

        if current != expected {
            return Err(Error::ConcurrentPublish {
                pointer: name.to_string(),
            });
        }

        pointers.insert(name.to_string(), new.to_string());
        Ok(())
    }
}
