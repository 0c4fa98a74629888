//! Manifest engine for vault-sync.
//!
//! This module provides:
//! - Causal ordering via per-device revision vectors
//! - The versioned manifest mapping secret paths to current entries
//! - Entry-by-entry diffing and classification between two manifests
//! - Sealed, content-addressed manifest persistence with an atomic
//!   compare-and-swap pointer
//! - Persisted local device state surviving process restarts
//!
//! # Architecture
//! The manifest is an immutable value: every change produces a new
//! manifest blob and a single pointer update, so concurrent readers never
//! observe a torn state.

pub mod device;
pub mod diff;
pub mod entry;
pub mod manifest;
pub mod revision;
pub mod store;

pub use device::{DeviceState, LocalState};
pub use diff::{diff, DiffClass, DiffRow};
pub use entry::SecretEntry;
pub use manifest::{ConflictMarker, Manifest};
pub use revision::{CausalOrder, RevisionVector};
pub use store::ManifestStore;
