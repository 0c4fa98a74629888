//! Object store abstraction for vault-sync.
//!
//! This module provides a trait-based interface for the byte-oriented
//! object store backing a vault, plus the content-addressed blob layer
//! built on top of it.
//!
//! # Design Principles
//! - Backend isolation: no backend-specific logic in manifest or sync modules
//! - Async operations: all I/O operations are async
//! - Blobs are ciphertext: the store never sees plaintext or key material
//! - Unified error semantics: consistent error types across backends

pub mod blob;
pub mod local;
pub mod memory;
pub mod object;

pub use blob::{content_hash, BlobStore, DEFAULT_OP_TIMEOUT};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use object::{ObjectStore, MANIFEST_POINTER};
