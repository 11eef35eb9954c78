/*!
 * Stable 32-Byte Object Identity
 *
 * Every persisted object (key, parameter set, key ring) carries an [`Id`]:
 * an opaque 32-byte value produced by digesting caller-supplied bytes or
 * fresh entropy. Equality is byte equality and ordering is lexicographic,
 * which makes [`Id`] directly usable as an ordered map key.
 */

use std::fmt;

use sha2::{Digest, Sha256};

use crate::utils;

/// Opaque, immutable 32-byte identifier.
///
/// # Example
///
/// ```
/// use keyvault::id::Id;
///
/// let a = Id::from_bytes(b"some key material");
/// let b = Id::from_bytes(b"some key material");
/// assert_eq!(a, b);
/// assert_ne!(a, Id::random());
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id([u8; Id::SIZE]);

impl Id {
    /// Serialized size in bytes.
    pub const SIZE: usize = 32;

    /// Construct an id deterministically by digesting the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut id = [0u8; Id::SIZE];
        id.copy_from_slice(&digest);
        Id(id)
    }

    /// Construct a fresh id from the process entropy source.
    pub fn random() -> Self {
        Id::from_bytes(&utils::random_bytes(Id::SIZE))
    }

    /// Construct an id from its exact 32-byte raw form.
    pub fn from_raw(raw: [u8; Id::SIZE]) -> Self {
        Id(raw)
    }

    /// The raw 32 bytes.
    pub fn as_bytes(&self) -> &[u8; Id::SIZE] {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_construction_is_deterministic() {
        assert_eq!(Id::from_bytes(b"abc"), Id::from_bytes(b"abc"));
        assert_ne!(Id::from_bytes(b"abc"), Id::from_bytes(b"abd"));
    }

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(Id::random(), Id::random());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let low = Id::from_raw([0u8; 32]);
        let mut raw = [0u8; 32];
        raw[0] = 1;
        let high = Id::from_raw(raw);
        assert!(low < high);
    }

    #[test]
    fn test_display_is_hex() {
        let id = Id::from_raw([0xab; 32]);
        assert_eq!(id.to_string(), "ab".repeat(32));
    }
}
