use argon2::{Algorithm, Argon2, Params as Argon2Params, Version};
use bytes::BufMut;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::digest::MessageDigest;
use crate::error::{CryptoError, CryptoResult};
use crate::id::Id;
use crate::secure_memory::SecureBytes;
use crate::serializable::{self, ObjectHeader, TYPE_SYMMETRIC_KEY};
use crate::suite::DigestAlgorithm;
use crate::utils;

/// Compile-time maximum length of symmetric key material in bytes.
pub const MAX_SYMMETRIC_KEY_LENGTH: usize = 64;

/// Fixed-capacity secret storage with a write cursor.
///
/// Bytes past the cursor are always zero, and the whole buffer is wiped
/// when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct KeyBuffer {
    bytes: [u8; MAX_SYMMETRIC_KEY_LENGTH],
    len: usize,
}

impl KeyBuffer {
    fn from_slice(data: &[u8]) -> CryptoResult<Self> {
        if data.is_empty() {
            return Err(CryptoError::invalid_argument(
                "key",
                "key material must not be empty",
            ));
        }
        if data.len() > MAX_SYMMETRIC_KEY_LENGTH {
            return Err(CryptoError::invalid_argument(
                "key",
                &format!(
                    "key material exceeds the {} byte maximum",
                    MAX_SYMMETRIC_KEY_LENGTH
                ),
            ));
        }
        let mut bytes = [0u8; MAX_SYMMETRIC_KEY_LENGTH];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self {
            bytes,
            len: data.len(),
        })
    }

    fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// A secret symmetric key.
///
/// The key material lives in fixed, wiped-on-drop storage; `len()` is the
/// number of cryptographically meaningful bytes. The id is the digest of
/// the key material unless a caller supplies one explicitly, so the same
/// secret always resolves to the same identity.
///
/// # Example
///
/// ```
/// use keyvault::keys::SymmetricKey;
///
/// let key = SymmetricKey::from_random(32, "session", "").unwrap();
/// assert_eq!(key.len(), 32);
/// ```
#[derive(Clone)]
pub struct SymmetricKey {
    id: Id,
    name: String,
    description: String,
    key: KeyBuffer,
}

impl SymmetricKey {
    /// Create a key from existing secret bytes.
    ///
    /// The id is derived by digesting the key material.
    pub fn from_bytes(data: &[u8], name: &str, description: &str) -> CryptoResult<Self> {
        let key = KeyBuffer::from_slice(data)?;
        Ok(Self {
            id: Id::from_bytes(data),
            name: name.to_string(),
            description: description.to_string(),
            key,
        })
    }

    /// Create a fresh random key of the given length.
    pub fn from_random(key_length: usize, name: &str, description: &str) -> CryptoResult<Self> {
        if key_length == 0 || key_length > MAX_SYMMETRIC_KEY_LENGTH {
            return Err(CryptoError::invalid_argument(
                "key_length",
                &format!("must be between 1 and {}", MAX_SYMMETRIC_KEY_LENGTH),
            ));
        }
        let random = SecureBytes::from(utils::random_bytes(key_length));
        Self::from_bytes(random.as_bytes(), name, description)
    }

    /// Derive a key from a secret (typically a password) and optional salt
    /// using an iterated digest.
    ///
    /// Each block chains the previous block's digest, the secret, and the
    /// salt, then re-digests `iterations - 1` more times; blocks are
    /// concatenated until `key_length` bytes are produced. This is the
    /// derivation the command-line tools use to build a wrap key from a
    /// password.
    ///
    /// # Arguments
    ///
    /// * `key_length` - Number of key bytes to produce
    /// * `secret` - The secret to stretch
    /// * `salt` - Optional salt mixed into every block
    /// * `digest` - Digest algorithm driving the derivation
    /// * `iterations` - Digest passes per block (must be > 0)
    pub fn from_secret_and_salt(
        key_length: usize,
        secret: &[u8],
        salt: Option<&[u8]>,
        digest: DigestAlgorithm,
        iterations: usize,
        name: &str,
        description: &str,
    ) -> CryptoResult<Self> {
        if secret.is_empty() {
            return Err(CryptoError::invalid_argument(
                "secret",
                "secret must not be empty",
            ));
        }
        if key_length == 0 || key_length > MAX_SYMMETRIC_KEY_LENGTH {
            return Err(CryptoError::invalid_argument(
                "key_length",
                &format!("must be between 1 and {}", MAX_SYMMETRIC_KEY_LENGTH),
            ));
        }
        if iterations == 0 {
            return Err(CryptoError::invalid_argument(
                "iterations",
                "must be greater than zero",
            ));
        }

        let mut md = MessageDigest::new(digest);
        let mut key = SecureBytes::with_capacity(key_length);
        let mut block = SecureBytes::default();
        while key.len() < key_length {
            if !block.is_empty() {
                md.update(block.as_bytes());
            }
            md.update(secret);
            if let Some(salt) = salt {
                if !salt.is_empty() {
                    md.update(salt);
                }
            }
            block = SecureBytes::from(md.finalize());
            for _ in 1..iterations {
                md.update(block.as_bytes());
                block = SecureBytes::from(md.finalize());
            }
            let take = usize::min(key_length - key.len(), block.len());
            key.extend_from_slice(&block.as_bytes()[..take]);
        }
        Self::from_bytes(key.as_bytes(), name, description)
    }

    /// Derive a key from a password with Argon2id.
    ///
    /// Stronger alternative to [`SymmetricKey::from_secret_and_salt`] for
    /// interactive password wrapping; the salt must be at least 8 bytes.
    pub fn from_argon2(
        key_length: usize,
        password: &[u8],
        salt: &[u8],
        memory_cost_kib: u32,
        time_cost: u32,
        parallelism: u32,
        name: &str,
        description: &str,
    ) -> CryptoResult<Self> {
        if key_length == 0 || key_length > MAX_SYMMETRIC_KEY_LENGTH {
            return Err(CryptoError::invalid_argument(
                "key_length",
                &format!("must be between 1 and {}", MAX_SYMMETRIC_KEY_LENGTH),
            ));
        }
        let params = Argon2Params::new(memory_cost_kib, time_cost, parallelism, Some(key_length))
            .map_err(|_| CryptoError::invalid_argument("params", "invalid Argon2 parameters"))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut key = SecureBytes::from(vec![0u8; key_length]);
        argon2
            .hash_password_into(password, salt, key.as_bytes_mut())
            .map_err(|_| CryptoError::primitive_failure("argon2 key derivation"))?;
        Self::from_bytes(key.as_bytes(), name, description)
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The cryptographically meaningful key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.key.as_slice()
    }

    /// Number of meaningful key bytes.
    pub fn len(&self) -> usize {
        self.key.len
    }

    pub fn is_empty(&self) -> bool {
        self.key.len == 0
    }

    pub(crate) fn header(&self) -> ObjectHeader {
        ObjectHeader::new(TYPE_SYMMETRIC_KEY, self.id.clone(), &self.name, &self.description)
    }

    /// Serialized size.
    pub fn encoded_len(&self) -> usize {
        self.header().encoded_len() + 4 + self.key.len
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        self.header().encode(buf);
        buf.put_u32(self.key.len as u32);
        buf.put_slice(self.key.as_slice());
    }

    pub fn decode(buf: &mut &[u8]) -> CryptoResult<Self> {
        let header = ObjectHeader::decode(buf, TYPE_SYMMETRIC_KEY)?;
        let len = serializable::get_u32(buf)? as usize;
        if len == 0 || len > MAX_SYMMETRIC_KEY_LENGTH {
            return Err(CryptoError::serialization_failure(&format!(
                "symmetric key length {} outside 1..={}",
                len, MAX_SYMMETRIC_KEY_LENGTH
            )));
        }
        let mut material = SecureBytes::from(serializable::get_blob_of(buf, len)?);
        let key = KeyBuffer::from_slice(material.as_bytes())?;
        material.clear();
        Ok(Self {
            id: header.id,
            name: header.name,
            description: header.description,
            key,
        })
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.description == other.description
            && utils::constant_time_eq(self.as_bytes(), other.as_bytes())
    }
}

impl Eq for SymmetricKey {}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("len", &self.key.len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_sets_digest_id() {
        let key = SymmetricKey::from_bytes(&[7u8; 32], "k", "").unwrap();
        assert_eq!(key.id(), &Id::from_bytes(&[7u8; 32]));
        assert_eq!(key.len(), 32);
    }

    #[test]
    fn test_rejects_oversize_material() {
        assert!(SymmetricKey::from_bytes(&[0u8; 65], "", "").is_err());
        assert!(SymmetricKey::from_bytes(&[], "", "").is_err());
    }

    #[test]
    fn test_from_random_lengths() {
        for len in [16, 24, 32, 64] {
            let key = SymmetricKey::from_random(len, "", "").unwrap();
            assert_eq!(key.len(), len);
        }
        assert!(SymmetricKey::from_random(0, "", "").is_err());
        assert!(SymmetricKey::from_random(65, "", "").is_err());
    }

    #[test]
    fn test_secret_and_salt_is_deterministic() {
        let a = SymmetricKey::from_secret_and_salt(
            32,
            b"correcthorse",
            Some(b"pepper"),
            DigestAlgorithm::Sha512,
            1,
            "",
            "",
        )
        .unwrap();
        let b = SymmetricKey::from_secret_and_salt(
            32,
            b"correcthorse",
            Some(b"pepper"),
            DigestAlgorithm::Sha512,
            1,
            "",
            "",
        )
        .unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_secret_and_salt_inputs_matter() {
        let base = SymmetricKey::from_secret_and_salt(
            32,
            b"correcthorse",
            Some(b"salt"),
            DigestAlgorithm::Sha256,
            3,
            "",
            "",
        )
        .unwrap();
        let other_secret = SymmetricKey::from_secret_and_salt(
            32,
            b"incorrecthorse",
            Some(b"salt"),
            DigestAlgorithm::Sha256,
            3,
            "",
            "",
        )
        .unwrap();
        let other_iterations = SymmetricKey::from_secret_and_salt(
            32,
            b"correcthorse",
            Some(b"salt"),
            DigestAlgorithm::Sha256,
            4,
            "",
            "",
        )
        .unwrap();
        assert_ne!(base.as_bytes(), other_secret.as_bytes());
        assert_ne!(base.as_bytes(), other_iterations.as_bytes());
    }

    #[test]
    fn test_derivation_longer_than_one_digest_block() {
        // 64-byte key from a 32-byte digest exercises block chaining.
        let key = SymmetricKey::from_secret_and_salt(
            64,
            b"stretch me",
            None,
            DigestAlgorithm::Sha256,
            2,
            "",
            "",
        )
        .unwrap();
        assert_eq!(key.len(), 64);
    }

    #[test]
    fn test_argon2_derivation() {
        let key = SymmetricKey::from_argon2(
            32,
            b"hunter2hunter2",
            b"fixed-salt-bytes",
            8 * 1024,
            1,
            1,
            "wrap",
            "",
        )
        .unwrap();
        let again = SymmetricKey::from_argon2(
            32,
            b"hunter2hunter2",
            b"fixed-salt-bytes",
            8 * 1024,
            1,
            1,
            "wrap",
            "",
        )
        .unwrap();
        assert_eq!(key.as_bytes(), again.as_bytes());
    }

    #[test]
    fn test_wire_round_trip() {
        let key = SymmetricKey::from_random(24, "traffic", "rotated weekly").unwrap();
        let mut wire = Vec::new();
        key.encode(&mut wire);
        assert_eq!(wire.len(), key.encoded_len());

        let mut reader = wire.as_slice();
        let decoded = SymmetricKey::decode(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(decoded.id(), key.id());
        assert_eq!(decoded.name(), "traffic");
        assert_eq!(decoded.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_decode_rejects_bad_length() {
        let key = SymmetricKey::from_random(16, "", "").unwrap();
        let mut wire = Vec::new();
        key.encode(&mut wire);
        // Corrupt the length field that follows the header.
        let len_offset = key.header().encoded_len();
        wire[len_offset..len_offset + 4].copy_from_slice(&200u32.to_be_bytes());
        let mut reader = wire.as_slice();
        assert!(SymmetricKey::decode(&mut reader).is_err());
    }
}
