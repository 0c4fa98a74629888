//! The sync cycle: fetch, diff, resolve, write, publish.
//!
//! Publishing uses a single compare-and-swap on the manifest head instead
//! of locks. When two devices race, exactly one swap succeeds; the loser
//! gets `ConcurrentPublish` and re-runs the whole cycle against the
//! winner's manifest.

use chrono::Utc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use vaultsync_common::{Result, SecretPath};
use vaultsync_crypto::open;
use vaultsync_manifest::{diff, ConflictMarker, DiffClass, Manifest, SecretEntry};

use crate::conflict::{resolve, Resolution};
use crate::report::{ConflictSummary, SyncReport};
use crate::retry::RetryConfig;
use crate::vault::Vault;

/// Phase of a sync run, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    Diffing,
    Resolving,
    Writing,
    Publishing,
}

impl Vault {
    /// Run one sync cycle.
    ///
    /// Conflicts are reported in the returned `SyncReport`, never as
    /// errors. In dry-run mode the full cycle is computed but nothing is
    /// written locally or published.
    ///
    /// # Errors
    /// - `Error::ConcurrentPublish` if another device published first;
    ///   safe to retry from the top
    pub async fn sync(&mut self) -> Result<SyncReport> {
        let started = Instant::now();
        let mut report = SyncReport::default();

        debug!(phase = ?SyncPhase::Fetching, "fetching manifest head");
        let remote_head = self.manifests.fetch_head().await?;
        let remote = match &remote_head {
            Some(hash) => self.manifests.load(hash, &self.key).await?,
            None => Manifest::new(),
        };

        debug!(phase = ?SyncPhase::Diffing, local = self.manifest.len(), remote = remote.len());
        let (merged, counts) = {
            let rows = diff(&self.manifest, &remote);
            debug!(phase = ?SyncPhase::Resolving, rows = rows.len());

            let mut merged = Manifest::new();
            let mut counts = Counts::default();

            // Losing conflict copies to materialize after the main pass.
            let mut renamed_entries: Vec<(SecretPath, SecretEntry)> = Vec::new();

            for row in &rows {
                match row.classify() {
                    DiffClass::Unchanged => {
                        if let Some(entry) = row.local {
                            counts.unchanged += 1;
                            carry_marker(&mut merged, &self.manifest, row.path);
                            merged.upsert(row.path.clone(), entry.clone());
                        }
                    }
                    DiffClass::LocalAhead => {
                        let entry = row.local.expect("local side present when ahead");
                        counts.pushed += 1;
                        // The local marker state wins: an absent marker
                        // means the user resolved the conflict here.
                        carry_marker(&mut merged, &self.manifest, row.path);
                        merged.upsert(row.path.clone(), entry.clone());
                    }
                    DiffClass::RemoteAhead => {
                        let entry = row.remote.expect("remote side present when ahead");
                        counts.pulled += 1;
                        carry_marker(&mut merged, &remote, row.path);
                        merged.upsert(row.path.clone(), entry.clone());
                    }
                    DiffClass::Concurrent => {
                        let local = row.local.expect("concurrent rows are two-sided");
                        let rem = row.remote.expect("concurrent rows are two-sided");

                        let contents_match = if local.tombstone || rem.tombstone {
                            false
                        } else {
                            self.plaintexts_match(local, rem).await?
                        };

                        match resolve(row.path, local, rem, contents_match, Utc::now())? {
                            Resolution::AutoMerge { merged: entry } => {
                                counts.auto_merged += 1;
                                merged.upsert(row.path.clone(), entry);
                            }
                            Resolution::KeepBoth {
                                retained,
                                renamed,
                                marker,
                            } => {
                                warn!(path = %row.path, device = %marker.remote_device,
                                      "conflict kept both versions");
                                counts.conflicts.push(ConflictSummary::from(&marker));
                                merged.upsert(row.path.clone(), retained);
                                merged.record_conflict(marker);
                                if let Some(pair) = renamed {
                                    renamed_entries.push(pair);
                                }
                            }
                        }
                    }
                }
            }

            for (path, entry) in renamed_entries {
                merged.upsert(path, entry);
            }

            (merged, counts)
        };

        report.pushed = counts.pushed;
        report.pulled = counts.pulled;
        report.auto_merged = counts.auto_merged;
        report.unchanged = counts.unchanged;
        report.conflicts = counts.conflicts;

        let needs_publish = merged != remote;

        if self.config.dry_run {
            report.head = remote_head;
            report.duration_ms = started.elapsed().as_millis() as u64;
            info!(pushed = report.pushed, pulled = report.pulled,
                  conflicts = report.conflicts.len(), "dry run, nothing written");
            return Ok(report);
        }

        if needs_publish {
            // An unreferenced manifest blob is invisible until the head
            // swap, so writing it first cannot expose a partial state.
            debug!(phase = ?SyncPhase::Writing, "storing merged manifest blob");
            let new_head = self.manifests.store(&merged, &self.key).await?;

            debug!(phase = ?SyncPhase::Publishing, expected = ?remote_head);
            self.manifests
                .advance_head(remote_head.as_ref(), &new_head)
                .await?;

            // Commit locally only after winning the swap: a lost race
            // leaves the working manifest untouched, and the retry
            // re-resolves against the winner's manifest.
            self.manifest = merged;
            self.state.save_manifest(&self.manifest, &self.key).await?;
            self.state.set_head(new_head).await?;
            report.published = true;
            report.head = Some(new_head);
        } else {
            // Nothing to publish; adopt the remote state and fast-forward
            // the local head if the pointer moved.
            debug!(phase = ?SyncPhase::Writing, "persisting working manifest");
            self.manifest = merged;
            self.state.save_manifest(&self.manifest, &self.key).await?;
            if let Some(hash) = remote_head {
                if self.state.device.head != Some(hash) {
                    self.state.set_head(hash).await?;
                }
            }
            report.head = remote_head;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            pushed = report.pushed,
            pulled = report.pulled,
            auto_merged = report.auto_merged,
            conflicts = report.conflicts.len(),
            published = report.published,
            "sync complete"
        );
        Ok(report)
    }

    /// Run `sync`, retrying on transient failures with exponential
    /// backoff. A lost publish race retries the whole cycle, so the next
    /// attempt diffs against the winner's manifest.
    pub async fn sync_with_retry(&mut self) -> Result<SyncReport> {
        let retry = RetryConfig::new(self.config.max_retries);
        let mut attempt = 0;

        loop {
            match self.sync().await {
                Ok(report) => return Ok(report),
                Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                    attempt += 1;
                    let delay = retry.delay_for_attempt(attempt - 1);
                    warn!(attempt, %err, ?delay, "sync attempt failed, retrying");
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Whether two live entries hold the same plaintext.
    ///
    /// Equal hashes mean equal ciphertext and decide immediately; unequal
    /// hashes say nothing (each seal uses a fresh nonce), so both blobs
    /// are fetched in parallel and opened for comparison.
    async fn plaintexts_match(&self, a: &SecretEntry, b: &SecretEntry) -> Result<bool> {
        if a.content_hash == b.content_hash {
            return Ok(true);
        }

        let blobs = self.manifests.blobs();
        let (sealed_a, sealed_b) =
            futures::future::try_join(blobs.get(&a.content_hash), blobs.get(&b.content_hash))
                .await?;

        Ok(open(&self.key, &sealed_a)? == open(&self.key, &sealed_b)?)
    }
}

#[derive(Default)]
struct Counts {
    pushed: usize,
    pulled: usize,
    auto_merged: usize,
    unchanged: usize,
    conflicts: Vec<ConflictSummary>,
}

fn carry_marker(merged: &mut Manifest, source: &Manifest, path: &SecretPath) {
    if let Some(marker) = marker_for(source, path) {
        merged.record_conflict(marker.clone());
    }
}

fn marker_for<'a>(manifest: &'a Manifest, path: &SecretPath) -> Option<&'a ConflictMarker> {
    manifest.conflicts.iter().find(|m| m.path == *path)
}
