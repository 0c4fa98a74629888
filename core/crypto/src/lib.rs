//! Cryptographic primitives for vault-sync.
//!
//! This module provides:
//! - Key derivation using Argon2id
//! - Authenticated encryption using XChaCha20-Poly1305
//! - Secure key management with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Constant-time operations for sensitive comparisons
//! - `open` fails closed: tampered input never yields partial plaintext

pub mod envelope;
pub mod kdf;
pub mod keys;

pub use envelope::{open, seal};
pub use kdf::{derive_key, verify_passphrase, KdfParams};
pub use keys::{Salt, VaultKey, KEY_LENGTH};
