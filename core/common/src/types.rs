//! Common types used throughout vault-sync.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroize;

/// Stable, vault-unique identifier for an enrolled device.
///
/// A device owns exactly its own slot in every revision vector and only
/// ever increments its own sequence counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a DeviceId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "DeviceId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random device id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A logical secret path within a vault, independent of underlying storage.
///
/// Secret paths name encrypted entries in the manifest, not physical
/// filesystem paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecretPath {
    components: Vec<String>,
}

impl SecretPath {
    /// Create a path from string components.
    ///
    /// # Preconditions
    /// - Components must not contain path separators
    /// - Components must not be empty strings
    /// - At least one component (a secret path names an entry, never a root)
    ///
    /// # Errors
    /// - Returns error if any component is invalid
    pub fn from_components(components: Vec<String>) -> crate::Result<Self> {
        if components.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Secret path cannot be empty".to_string(),
            ));
        }
        for comp in &components {
            if comp.is_empty() {
                return Err(crate::Error::InvalidInput(
                    "Path component cannot be empty".to_string(),
                ));
            }
            if comp.contains('/') || comp.contains('\\') {
                return Err(crate::Error::InvalidInput(
                    "Path component cannot contain separators".to_string(),
                ));
            }
        }
        Ok(Self { components })
    }

    /// Parse a path string into a SecretPath.
    ///
    /// Uses '/' as separator; leading and trailing separators are ignored.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let trimmed = path.trim_start_matches('/').trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(crate::Error::InvalidInput(format!(
                "Invalid secret path: '{}'",
                path
            )));
        }

        let components: Vec<String> = trimmed.split('/').map(String::from).collect();
        Self::from_components(components)
    }

    /// Get the entry name (last component).
    pub fn name(&self) -> &str {
        self.components
            .last()
            .expect("SecretPath always has at least one component")
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Replace the last component, keeping the parent directory.
    ///
    /// Used to derive conflict paths next to the original entry.
    pub fn with_name(&self, name: &str) -> crate::Result<Self> {
        let mut components = self.components.clone();
        components.pop();
        components.push(name.to_string());
        Self::from_components(components)
    }
}

impl fmt::Display for SecretPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("/"))
    }
}

impl Serialize for SecretPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SecretPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SecretPath::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Length of content hashes in bytes (Blake2b-256).
pub const HASH_LENGTH: usize = 32;

/// Digest identifying a stored blob by its (encrypted) content.
///
/// Hashes are computed over ciphertext, so the store never needs key
/// material to address or deduplicate blobs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; HASH_LENGTH]);

impl ContentHash {
    /// Create a hash from raw digest bytes.
    pub fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Render as lowercase hex.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(HASH_LENGTH * 2);
        for b in &self.0 {
            use fmt::Write;
            write!(s, "{:02x}", b).expect("writing to String cannot fail");
        }
        s
    }

    /// Parse a lowercase or uppercase hex digest.
    ///
    /// # Errors
    /// - Returns error on wrong length or non-hex characters
    pub fn parse(hex: &str) -> crate::Result<Self> {
        if hex.len() != HASH_LENGTH * 2 {
            return Err(crate::Error::InvalidInput(format!(
                "Invalid content hash length: expected {}, got {}",
                HASH_LENGTH * 2,
                hex.len()
            )));
        }
        let mut bytes = [0u8; HASH_LENGTH];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let s = std::str::from_utf8(chunk)
                .map_err(|_| crate::Error::InvalidInput("Non-ASCII content hash".to_string()))?;
            bytes[i] = u8::from_str_radix(s, 16).map_err(|_| {
                crate::Error::InvalidInput(format!("Invalid hex in content hash: '{}'", s))
            })?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ContentHash::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}
