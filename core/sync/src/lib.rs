//! vault-sync engine.
//!
//! This module provides synchronization for a vault shared by multiple
//! devices, including:
//! - The fetch/diff/resolve/publish state machine
//! - Conflict resolution that never silently drops a secret
//! - Retry strategy with exponential backoff for transient failures
//! - Local secret operations (add, read, remove, list)

pub mod conflict;
pub mod engine;
pub mod report;
pub mod retry;
pub mod vault;

pub use conflict::{resolve, Resolution};
pub use engine::SyncPhase;
pub use report::{ConflictSummary, SyncReport};
pub use retry::RetryConfig;
pub use vault::{SyncConfig, Vault, VaultStatus};
