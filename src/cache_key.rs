//! Content-addressed object identity.

use std::fmt;

/// 16-byte content-addressed identifier for a cached object.
///
/// The core never derives this value itself — callers (request canonicalization,
/// typically) hand it in already computed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, zerocopy::FromBytes, zerocopy::IntoBytes, zerocopy::Immutable, zerocopy::KnownLayout)]
#[repr(transparent)]
pub struct CacheKey([u8; 16]);

impl CacheKey {
    /// Wraps a raw 16-byte key.
    pub const fn new(bytes: [u8; 16]) -> Self {
        CacheKey(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey(")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn debug_is_hex() {
        let key = CacheKey::new([0xab; 16]);
        assert_eq!(format!("{key:?}"), format!("CacheKey({})", "ab".repeat(16)));
    }

    #[test]
    fn equality_is_byte_equality() {
        assert_eq!(CacheKey::new([1; 16]), CacheKey::new([1; 16]));
        assert_ne!(CacheKey::new([1; 16]), CacheKey::new([2; 16]));
    }
}
