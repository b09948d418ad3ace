//! Plug Hashes
//!
//! A [`PlugHash`] is a SHA-256 digest of everything a plug's value depends
//! on. Two plugs with equal hashes have substitutable values, in the same
//! graph or in different ones, which makes the hash usable as a cache key.

use std::fmt;

use sha2::{Digest, Sha256};

/// A 256-bit content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlugHash([u8; 32]);

impl PlugHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form, 64 characters.
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PlugHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PlugHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlugHash({})", &self.to_hex()[..12])
    }
}

/// Incremental builder for a [`PlugHash`].
///
/// Variable-length fields are length-prefixed so that adjacent strings
/// cannot run together (`"ab" + "c"` differs from `"a" + "bc"`).
#[derive(Clone, Default)]
pub struct PlugHasher {
    inner: Sha256,
}

impl PlugHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_u8(&mut self, value: u8) {
        self.inner.update([value]);
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    pub fn append_len(&mut self, len: usize) {
        self.inner.update((len as u64).to_le_bytes());
    }

    pub fn append_str(&mut self, s: &str) {
        self.append_len(s.len());
        self.inner.update(s.as_bytes());
    }

    pub fn append_hash(&mut self, hash: &PlugHash) {
        self.inner.update(hash.0);
    }

    pub fn finish(self) -> PlugHash {
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&self.inner.finalize());
        PlugHash(buf)
    }
}

impl fmt::Debug for PlugHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlugHasher")
    }
}
