/*!
 * Message Authentication Codes
 *
 * A [`Mac`] is a reusable sign/verify object over an HMAC or CMAC secret.
 * HMAC uses the suite's digest; CMAC runs AES selected by the secret
 * length. The same instance may be reused for any number of one-shot
 * operations in any order.
 */

use std::sync::Arc;

use cmac::Cmac;
use hmac::{Hmac, Mac as MacTrait};
use sha2::{Sha256, Sha384, Sha512};

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{AsymmetricKey, KeyKind};
use crate::suite::DigestAlgorithm;
use crate::utils;

enum MacAlgorithm {
    Hmac(DigestAlgorithm),
    CmacAes128,
    CmacAes192,
    CmacAes256,
}

/// Reusable MAC bound to a key and digest.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use keyvault::keys::{AsymmetricKey, KeyKind};
/// use keyvault::mac::Mac;
/// use keyvault::suite::DigestAlgorithm;
///
/// let key = Arc::new(AsymmetricKey::generate_mac_key(KeyKind::Hmac, 32, "", "").unwrap());
/// let mac = Mac::new(key, DigestAlgorithm::Sha256).unwrap();
/// let tag = mac.sign_buffer(b"message").unwrap();
/// assert!(mac.verify_buffer(b"message", &tag));
/// assert!(!mac.verify_buffer(b"messagE", &tag));
/// ```
pub struct Mac {
    key: Arc<AsymmetricKey>,
    algorithm: MacAlgorithm,
}

impl Mac {
    /// Create a MAC over an `Hmac` or `Cmac` key.
    ///
    /// The digest selects the HMAC hash; CMAC ignores it and picks the
    /// AES variant from the secret length.
    pub fn new(key: Arc<AsymmetricKey>, digest: DigestAlgorithm) -> CryptoResult<Self> {
        let algorithm = match key.kind() {
            KeyKind::Hmac => {
                if key.as_bytes().is_empty() {
                    return Err(CryptoError::invalid_argument(
                        "key",
                        "HMAC secret must not be empty",
                    ));
                }
                MacAlgorithm::Hmac(digest)
            }
            KeyKind::Cmac => match key.as_bytes().len() {
                16 => MacAlgorithm::CmacAes128,
                24 => MacAlgorithm::CmacAes192,
                32 => MacAlgorithm::CmacAes256,
                other => {
                    return Err(CryptoError::invalid_argument(
                        "key",
                        &format!("CMAC secret of {} bytes is not an AES key length", other),
                    ))
                }
            },
            kind => {
                return Err(CryptoError::invalid_argument(
                    "key",
                    &format!("MAC requires an HMAC or CMAC key, found {}", kind),
                ))
            }
        };
        Ok(Self { key, algorithm })
    }

    /// Build an HMAC directly over symmetric-key bytes.
    ///
    /// Used by the non-AEAD cipher path, which authenticates with the
    /// same secret it encrypts with.
    pub(crate) fn from_raw_hmac(secret: &[u8], digest: DigestAlgorithm) -> CryptoResult<Self> {
        let key = AsymmetricKey::from_material(KeyKind::Hmac, true, secret, "", "")?;
        Mac::new(Arc::new(key), digest)
    }

    /// The key this MAC signs with.
    pub fn key(&self) -> &Arc<AsymmetricKey> {
        &self.key
    }

    /// Tag length in bytes.
    pub fn output_len(&self) -> usize {
        match self.algorithm {
            MacAlgorithm::Hmac(digest) => digest.output_len(),
            MacAlgorithm::CmacAes128 | MacAlgorithm::CmacAes192 | MacAlgorithm::CmacAes256 => 16,
        }
    }

    fn compute(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let secret = self.key.as_bytes();
        macro_rules! one_shot {
            ($mac:ty) => {{
                let mut mac = <$mac>::new_from_slice(secret)
                    .map_err(|_| CryptoError::primitive_failure("mac keying"))?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }};
        }
        Ok(match self.algorithm {
            MacAlgorithm::Hmac(DigestAlgorithm::Sha256) => one_shot!(Hmac<Sha256>),
            MacAlgorithm::Hmac(DigestAlgorithm::Sha384) => one_shot!(Hmac<Sha384>),
            MacAlgorithm::Hmac(DigestAlgorithm::Sha512) => one_shot!(Hmac<Sha512>),
            MacAlgorithm::CmacAes128 => one_shot!(Cmac<aes::Aes128>),
            MacAlgorithm::CmacAes192 => one_shot!(Cmac<aes::Aes192>),
            MacAlgorithm::CmacAes256 => one_shot!(Cmac<aes::Aes256>),
        })
    }

    /// Compute the tag over a buffer.
    pub fn sign_buffer(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        self.compute(data)
    }

    /// Compute the tag over a buffer, writing it directly into `out`.
    ///
    /// Returns the number of tag bytes written. `out` must hold at least
    /// [`Mac::output_len`] bytes.
    pub fn sign_into(&self, data: &[u8], out: &mut [u8]) -> CryptoResult<usize> {
        let tag = self.compute(data)?;
        if out.len() < tag.len() {
            return Err(CryptoError::invalid_argument(
                "out",
                &format!("needs at least {} bytes for the tag", tag.len()),
            ));
        }
        out[..tag.len()].copy_from_slice(&tag);
        Ok(tag.len())
    }

    /// Verify a tag over a buffer in constant time.
    pub fn verify_buffer(&self, data: &[u8], tag: &[u8]) -> bool {
        match self.compute(data) {
            Ok(expected) => utils::constant_time_eq(&expected, tag),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hmac_mac(len: usize, digest: DigestAlgorithm) -> Mac {
        let key = AsymmetricKey::generate_mac_key(KeyKind::Hmac, len, "", "").unwrap();
        Mac::new(Arc::new(key), digest).unwrap()
    }

    #[test]
    fn test_hmac_sign_verify() {
        let mac = hmac_mac(32, DigestAlgorithm::Sha512);
        let tag = mac.sign_buffer(b"payload").unwrap();
        assert_eq!(tag.len(), 64);
        assert!(mac.verify_buffer(b"payload", &tag));
        assert!(!mac.verify_buffer(b"payloae", &tag));
        assert!(!mac.verify_buffer(b"payload", &tag[..63]));
    }

    #[test]
    fn test_cmac_sign_verify() {
        let key = AsymmetricKey::generate_mac_key(KeyKind::Cmac, 32, "", "").unwrap();
        let mac = Mac::new(Arc::new(key), DigestAlgorithm::Sha256).unwrap();
        let tag = mac.sign_buffer(b"payload").unwrap();
        assert_eq!(tag.len(), 16);
        assert!(mac.verify_buffer(b"payload", &tag));
        assert!(!mac.verify_buffer(b"tampered", &tag));
    }

    #[test]
    fn test_reuse_in_any_order() {
        let mac = hmac_mac(16, DigestAlgorithm::Sha256);
        let tag_a = mac.sign_buffer(b"a").unwrap();
        let tag_b = mac.sign_buffer(b"b").unwrap();
        assert!(mac.verify_buffer(b"b", &tag_b));
        assert!(mac.verify_buffer(b"a", &tag_a));
        assert_eq!(mac.sign_buffer(b"a").unwrap(), tag_a);
    }

    #[test]
    fn test_sign_into() {
        let mac = hmac_mac(32, DigestAlgorithm::Sha256);
        let mut out = [0u8; 40];
        let written = mac.sign_into(b"data", &mut out).unwrap();
        assert_eq!(written, 32);
        assert_eq!(&out[..32], mac.sign_buffer(b"data").unwrap().as_slice());

        let mut short = [0u8; 8];
        assert!(mac.sign_into(b"data", &mut short).is_err());
    }

    #[test]
    fn test_rejects_wrong_key_kind() {
        let key = AsymmetricKey::generate(KeyKind::Ed25519, "", "").unwrap();
        assert!(Mac::new(Arc::new(key), DigestAlgorithm::Sha256).is_err());
    }
}
