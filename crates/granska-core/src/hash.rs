//! SHA-256 hash newtype used by the audit chain and document digests.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 hash (32 bytes)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The documented zero seed: the `previous_hash` of the first audit entry.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Create a hash from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash arbitrary data
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Hash `prefix || data` in one pass (chain links)
    pub fn digest_chained(prefix: &Hash, data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(prefix.0);
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Get hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-char hex string
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(Hash::digest(b"granska"), Hash::digest(b"granska"));
        assert_ne!(Hash::digest(b"granska"), Hash::digest(b"gransk"));
    }

    #[test]
    fn chained_digest_binds_prefix() {
        let prev = Hash::digest(b"prev");
        let a = Hash::digest_chained(&prev, b"payload");
        let b = Hash::digest_chained(&Hash::ZERO, b"payload");
        assert_ne!(a, b);
    }

    #[test]
    fn hex_round_trip() {
        let h = Hash::digest(b"abc");
        assert_eq!(Hash::from_hex(&h.to_hex()), Some(h));
    }
}
