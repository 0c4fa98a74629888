//! Two devices syncing through one shared store.

use std::sync::Arc;
use tempfile::TempDir;

use vaultsync_common::{DeviceId, Error, Result, SecretPath};
use vaultsync_crypto::{VaultKey, KEY_LENGTH};
use vaultsync_manifest::LocalState;
use vaultsync_store::{MemoryStore, ObjectStore};
use vaultsync_sync::{SyncConfig, Vault};

fn key() -> VaultKey {
    VaultKey::from_bytes([11u8; KEY_LENGTH])
}

fn path(s: &str) -> SecretPath {
    SecretPath::parse(s).unwrap()
}

async fn device(store: &Arc<MemoryStore>, name: &str) -> (TempDir, Vault) {
    let dir = TempDir::new().unwrap();
    let state = LocalState::create(dir.path(), DeviceId::new(name).unwrap())
        .await
        .unwrap();
    let backend: Arc<dyn ObjectStore> = store.clone();
    let vault = Vault::open_with(backend, state, key(), SyncConfig::default())
        .await
        .unwrap();
    (dir, vault)
}

#[tokio::test]
async fn secret_propagates_between_devices() {
    let store = Arc::new(MemoryStore::new());
    let (_da, mut alice) = device(&store, "alice").await;
    let (_db, mut bob) = device(&store, "bob").await;

    alice.add(path("prod/db"), b"hunter2").await.unwrap();
    let report = alice.sync().await.unwrap();
    assert_eq!(report.pushed, 1);
    assert!(report.published);

    let report = bob.sync().await.unwrap();
    assert_eq!(report.pulled, 1);
    // Adopting without local changes is a fast-forward, not a publish
    assert!(!report.published);

    assert_eq!(bob.read(&path("prod/db")).await.unwrap().as_bytes(), b"hunter2");
}

#[tokio::test]
async fn deletion_propagates_as_tombstone() {
    let store = Arc::new(MemoryStore::new());
    let (_da, mut alice) = device(&store, "alice").await;
    let (_db, mut bob) = device(&store, "bob").await;

    alice.add(path("doomed"), b"x").await.unwrap();
    alice.sync().await.unwrap();
    bob.sync().await.unwrap();

    bob.remove(&path("doomed")).await.unwrap();
    bob.sync().await.unwrap();

    alice.sync().await.unwrap();
    assert!(matches!(
        alice.read(&path("doomed")).await,
        Err(Error::NotFound(_))
    ));
    assert!(alice.list().is_empty());
}

#[tokio::test]
async fn identical_concurrent_writes_auto_merge() {
    let store = Arc::new(MemoryStore::new());
    let (_da, mut alice) = device(&store, "alice").await;
    let (_db, mut bob) = device(&store, "bob").await;

    // Same plaintext written independently; the sealed blobs differ
    // because each seal draws a fresh nonce.
    alice.add(path("shared"), b"same value").await.unwrap();
    bob.add(path("shared"), b"same value").await.unwrap();

    alice.sync().await.unwrap();
    let report = bob.sync().await.unwrap();
    assert_eq!(report.auto_merged, 1);
    assert!(report.conflicts.is_empty());

    alice.sync().await.unwrap();
    assert_eq!(
        alice.read(&path("shared")).await.unwrap().as_bytes(),
        b"same value"
    );
    // One entry, no conflict copy
    assert_eq!(alice.list().len(), 1);
    assert!(alice.manifest().conflicts.is_empty());
}

#[tokio::test]
async fn differing_concurrent_writes_keep_both() {
    let store = Arc::new(MemoryStore::new());
    let (_da, mut alice) = device(&store, "alice").await;
    let (_db, mut bob) = device(&store, "bob").await;

    alice.add(path("note"), b"from alice").await.unwrap();
    bob.add(path("note"), b"from bob").await.unwrap();

    alice.sync().await.unwrap();
    let report = bob.sync().await.unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].path, path("note"));
    let renamed = report.conflicts[0]
        .renamed_path
        .clone()
        .expect("losing side had content");
    assert!(renamed.name().starts_with("note.conflict-alice"));

    // Both versions are retrievable on the resolving device
    assert_eq!(bob.read(&path("note")).await.unwrap().as_bytes(), b"from bob");
    assert_eq!(bob.read(&renamed).await.unwrap().as_bytes(), b"from alice");

    // The resolution and the marker propagate back
    alice.sync().await.unwrap();
    assert_eq!(
        alice.read(&path("note")).await.unwrap().as_bytes(),
        b"from bob"
    );
    assert_eq!(
        alice.read(&renamed).await.unwrap().as_bytes(),
        b"from alice"
    );
    assert_eq!(alice.manifest().conflicts.len(), 1);
}

#[tokio::test]
async fn delete_vs_edit_keeps_the_edit() {
    let store = Arc::new(MemoryStore::new());
    let (_da, mut alice) = device(&store, "alice").await;
    let (_db, mut bob) = device(&store, "bob").await;

    alice.add(path("contested"), b"v1").await.unwrap();
    alice.sync().await.unwrap();
    bob.sync().await.unwrap();

    alice.remove(&path("contested")).await.unwrap();
    bob.add(path("contested"), b"v2").await.unwrap();

    alice.sync().await.unwrap();
    let report = bob.sync().await.unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert!(report.conflicts[0].renamed_path.is_none());

    // The deletion did not win
    assert_eq!(
        bob.read(&path("contested")).await.unwrap().as_bytes(),
        b"v2"
    );
    alice.sync().await.unwrap();
    assert_eq!(
        alice.read(&path("contested")).await.unwrap().as_bytes(),
        b"v2"
    );
}

#[tokio::test]
async fn stale_publish_retries_and_converges() {
    let store = Arc::new(MemoryStore::new());
    let (_da, mut alice) = device(&store, "alice").await;
    let (_db, mut bob) = device(&store, "bob").await;

    alice.add(path("a"), b"1").await.unwrap();
    bob.add(path("b"), b"2").await.unwrap();

    // Race both full cycles; whichever loses the head swap retries against
    // the winner's manifest.
    let (ra, rb) = tokio::join!(alice.sync_with_retry(), bob.sync_with_retry());
    ra.unwrap();
    rb.unwrap();

    // One more round each to adopt whatever the other published last
    alice.sync().await.unwrap();
    bob.sync().await.unwrap();

    for vault in [&alice, &bob] {
        assert_eq!(vault.read(&path("a")).await.unwrap().as_bytes(), b"1");
        assert_eq!(vault.read(&path("b")).await.unwrap().as_bytes(), b"2");
    }
    assert_eq!(
        alice.status().await.unwrap().remote_head,
        bob.status().await.unwrap().remote_head
    );
}

/// Delegates to an in-memory store but refuses every head swap, as if
/// another device always won the race.
struct RefusedPublishStore {
    inner: MemoryStore,
}

#[async_trait::async_trait]
impl ObjectStore for RefusedPublishStore {
    fn name(&self) -> &str {
        "refused-publish"
    }

    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.inner.put_object(key, bytes).await
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get_object(key).await
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        self.inner.object_exists(key).await
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list_objects(prefix).await
    }

    async fn get_pointer(&self, name: &str) -> Result<Option<String>> {
        self.inner.get_pointer(name).await
    }

    async fn compare_and_swap_pointer(
        &self,
        name: &str,
        _expected: Option<&str>,
        _new: &str,
    ) -> Result<()> {
        Err(Error::ConcurrentPublish {
            pointer: name.to_string(),
        })
    }
}

#[tokio::test]
async fn lost_publish_leaves_local_state_untouched() {
    let backend: Arc<dyn ObjectStore> = Arc::new(RefusedPublishStore {
        inner: MemoryStore::new(),
    });
    let dir = TempDir::new().unwrap();
    let state = LocalState::create(dir.path(), DeviceId::new("alice").unwrap())
        .await
        .unwrap();
    let mut alice = Vault::open_with(backend, state, key(), SyncConfig::default())
        .await
        .unwrap();

    alice.add(path("pending"), b"unpublished").await.unwrap();
    let before = alice.manifest().clone();

    let result = alice.sync().await;
    assert!(matches!(result, Err(Error::ConcurrentPublish { .. })));

    // The working manifest is untouched, in memory and on disk, and the
    // local head never moved; a retry re-runs the whole cycle from here.
    assert_eq!(alice.manifest(), &before);
    let reloaded = LocalState::load(dir.path()).await.unwrap();
    assert_eq!(reloaded.device.head, None);
    assert_eq!(reloaded.load_manifest(&key()).await.unwrap(), before);
}

#[tokio::test]
async fn dry_run_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let (_da, mut alice) = device(&store, "alice").await;

    alice.add(path("pending"), b"x").await.unwrap();
    alice.config_mut().dry_run = true;

    let report = alice.sync().await.unwrap();
    assert_eq!(report.pushed, 1);
    assert!(!report.published);

    // Nothing was published and the local head did not move
    let status = alice.status().await.unwrap();
    assert_eq!(status.remote_head, None);
    assert_eq!(status.local_head, None);
}

#[tokio::test]
async fn second_sync_is_a_noop() {
    let store = Arc::new(MemoryStore::new());
    let (_da, mut alice) = device(&store, "alice").await;

    alice.add(path("s"), b"v").await.unwrap();
    alice.sync().await.unwrap();

    let report = alice.sync().await.unwrap();
    assert!(report.is_noop());
    assert!(!report.published);
    assert_eq!(report.unchanged, 1);
}
