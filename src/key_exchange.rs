/*!
 * Ephemeral Key Agreement
 *
 * A [`KeyExchange`] wraps a private X25519 key and derives a shared
 * [`SymmetricKey`] with a peer: the raw Diffie-Hellman output is expanded
 * through HKDF keyed on the suite digest, so both sides arrive at
 * identical key material of the requested length.
 */

use std::sync::Arc;

use hkdf::Hkdf;
use sha2::{Sha256, Sha384, Sha512};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519StaticSecret};

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{AsymmetricKey, KeyKind, SymmetricKey, MAX_SYMMETRIC_KEY_LENGTH};
use crate::secure_memory::SecureBytes;
use crate::suite::DigestAlgorithm;

/// X25519 agreement bound to a private key and the suite digest.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use keyvault::key_exchange::KeyExchange;
/// use keyvault::keys::{AsymmetricKey, KeyKind};
/// use keyvault::suite::DigestAlgorithm;
///
/// let alice = Arc::new(AsymmetricKey::generate(KeyKind::X25519, "", "").unwrap());
/// let bob = Arc::new(AsymmetricKey::generate(KeyKind::X25519, "", "").unwrap());
///
/// let alice_kx = KeyExchange::new(alice.clone(), DigestAlgorithm::Sha256).unwrap();
/// let bob_kx = KeyExchange::new(bob.clone(), DigestAlgorithm::Sha256).unwrap();
///
/// let alice_key = alice_kx
///     .derive_shared_symmetric_key(&bob.public_key("", "").unwrap(), 32, b"salt", b"session")
///     .unwrap();
/// let bob_key = bob_kx
///     .derive_shared_symmetric_key(&alice.public_key("", "").unwrap(), 32, b"salt", b"session")
///     .unwrap();
/// assert_eq!(alice_key.as_bytes(), bob_key.as_bytes());
/// ```
pub struct KeyExchange {
    key: Arc<AsymmetricKey>,
    digest: DigestAlgorithm,
}

impl KeyExchange {
    /// Wrap a private X25519 key.
    pub fn new(key: Arc<AsymmetricKey>, digest: DigestAlgorithm) -> CryptoResult<Self> {
        if key.kind() != KeyKind::X25519 {
            return Err(CryptoError::invalid_argument(
                "key",
                &format!("key exchange requires an X25519 key, found {}", key.kind()),
            ));
        }
        if !key.is_private() {
            return Err(CryptoError::invalid_argument(
                "key",
                "key exchange requires a private key",
            ));
        }
        Ok(Self { key, digest })
    }

    /// The private key driving this exchange.
    pub fn key(&self) -> &Arc<AsymmetricKey> {
        &self.key
    }

    /// The public half to hand to the peer.
    pub fn public_key(&self) -> CryptoResult<AsymmetricKey> {
        self.key.public_key(self.key.name(), self.key.description())
    }

    /// Agree with the peer's public key and expand the shared secret into
    /// a symmetric key of the given length.
    ///
    /// `salt` and `info` must match on both sides; `info` conventionally
    /// labels what the derived key is for.
    pub fn derive_shared_symmetric_key(
        &self,
        peer_public: &AsymmetricKey,
        key_length: usize,
        salt: &[u8],
        info: &[u8],
    ) -> CryptoResult<SymmetricKey> {
        if peer_public.kind() != KeyKind::X25519 {
            return Err(CryptoError::invalid_argument(
                "peer_public",
                "peer key must be X25519",
            ));
        }
        if key_length == 0 || key_length > MAX_SYMMETRIC_KEY_LENGTH {
            return Err(CryptoError::invalid_argument(
                "key_length",
                &format!("must be between 1 and {}", MAX_SYMMETRIC_KEY_LENGTH),
            ));
        }

        let secret: [u8; 32] = self.key.as_bytes().try_into().map_err(|_| {
            CryptoError::invalid_argument("key", "malformed X25519 private key")
        })?;
        let peer: [u8; 32] = peer_public.as_bytes().try_into().map_err(|_| {
            CryptoError::invalid_argument("peer_public", "malformed X25519 public key")
        })?;

        let shared = X25519StaticSecret::from(secret)
            .diffie_hellman(&X25519PublicKey::from(peer));

        let mut okm = SecureBytes::from(vec![0u8; key_length]);
        let salt = if salt.is_empty() { None } else { Some(salt) };
        let expanded = match self.digest {
            DigestAlgorithm::Sha256 => Hkdf::<Sha256>::new(salt, shared.as_bytes())
                .expand(info, okm.as_bytes_mut()),
            DigestAlgorithm::Sha384 => Hkdf::<Sha384>::new(salt, shared.as_bytes())
                .expand(info, okm.as_bytes_mut()),
            DigestAlgorithm::Sha512 => Hkdf::<Sha512>::new(salt, shared.as_bytes())
                .expand(info, okm.as_bytes_mut()),
        };
        expanded.map_err(|_| CryptoError::primitive_failure("hkdf expansion"))?;

        SymmetricKey::from_bytes(okm.as_bytes(), "", "")
    }
}
