/*!
 * Cipher Suites
 *
 * A [`CipherSuite`] names the four algorithm choices of a security
 * context: key exchange, authenticator, bulk cipher, and message digest.
 * The canonical textual form joins the components with `_`, e.g.
 * `ECDHE_ED25519_AES-256-GCM_SHA2-512`. The suite validates that keys and
 * parameters match their intended role and acts as the factory for every
 * derived object (ciphers, MACs, authenticators, key exchanges).
 */

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::authenticator::{Authenticator, Op};
use crate::cipher::Cipher;
use crate::digest::MessageDigest;
use crate::error::{CryptoError, CryptoResult};
use crate::key_exchange::KeyExchange;
use crate::keys::{AsymmetricKey, KeyKind, Params, SymmetricKey};
use crate::mac::Mac;

/// Key-agreement component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeAlgorithm {
    /// Ephemeral elliptic-curve Diffie-Hellman over X25519.
    Ecdhe,
}

impl KeyExchangeAlgorithm {
    const ALL: [KeyExchangeAlgorithm; 1] = [KeyExchangeAlgorithm::Ecdhe];

    fn as_str(self) -> &'static str {
        match self {
            KeyExchangeAlgorithm::Ecdhe => "ECDHE",
        }
    }
}

/// Signature component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticatorAlgorithm {
    /// ECDSA over NIST P-256, hash-then-sign with the suite digest.
    Ecdsa,
    /// Ed25519 over the complete message.
    Ed25519,
}

impl AuthenticatorAlgorithm {
    const ALL: [AuthenticatorAlgorithm; 2] =
        [AuthenticatorAlgorithm::Ecdsa, AuthenticatorAlgorithm::Ed25519];

    fn as_str(self) -> &'static str {
        match self {
            AuthenticatorAlgorithm::Ecdsa => "ECDSA",
            AuthenticatorAlgorithm::Ed25519 => "ED25519",
        }
    }

    /// The key kind this authenticator signs with.
    pub fn key_kind(self) -> KeyKind {
        match self {
            AuthenticatorAlgorithm::Ecdsa => KeyKind::Ec,
            AuthenticatorAlgorithm::Ed25519 => KeyKind::Ed25519,
        }
    }
}

/// Bulk cipher component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetricAlgorithm {
    Aes256Gcm,
    Aes192Gcm,
    Aes128Gcm,
    Aes256Cbc,
    Aes192Cbc,
    Aes128Cbc,
    ChaCha20Poly1305,
}

impl SymmetricAlgorithm {
    const ALL: [SymmetricAlgorithm; 7] = [
        SymmetricAlgorithm::Aes256Gcm,
        SymmetricAlgorithm::Aes192Gcm,
        SymmetricAlgorithm::Aes128Gcm,
        SymmetricAlgorithm::Aes256Cbc,
        SymmetricAlgorithm::Aes192Cbc,
        SymmetricAlgorithm::Aes128Cbc,
        SymmetricAlgorithm::ChaCha20Poly1305,
    ];

    fn as_str(self) -> &'static str {
        match self {
            SymmetricAlgorithm::Aes256Gcm => "AES-256-GCM",
            SymmetricAlgorithm::Aes192Gcm => "AES-192-GCM",
            SymmetricAlgorithm::Aes128Gcm => "AES-128-GCM",
            SymmetricAlgorithm::Aes256Cbc => "AES-256-CBC",
            SymmetricAlgorithm::Aes192Cbc => "AES-192-CBC",
            SymmetricAlgorithm::Aes128Cbc => "AES-128-CBC",
            SymmetricAlgorithm::ChaCha20Poly1305 => "CHACHA20-POLY1305",
        }
    }

    /// Key length in bytes.
    pub fn key_length(self) -> usize {
        match self {
            SymmetricAlgorithm::Aes256Gcm
            | SymmetricAlgorithm::Aes256Cbc
            | SymmetricAlgorithm::ChaCha20Poly1305 => 32,
            SymmetricAlgorithm::Aes192Gcm | SymmetricAlgorithm::Aes192Cbc => 24,
            SymmetricAlgorithm::Aes128Gcm | SymmetricAlgorithm::Aes128Cbc => 16,
        }
    }

    /// IV length in bytes: 96 bits for the AEAD modes, a full block for
    /// CBC.
    pub fn iv_length(self) -> usize {
        match self {
            SymmetricAlgorithm::Aes256Gcm
            | SymmetricAlgorithm::Aes192Gcm
            | SymmetricAlgorithm::Aes128Gcm
            | SymmetricAlgorithm::ChaCha20Poly1305 => 12,
            SymmetricAlgorithm::Aes256Cbc
            | SymmetricAlgorithm::Aes192Cbc
            | SymmetricAlgorithm::Aes128Cbc => 16,
        }
    }

    /// Whether the mode authenticates its own ciphertext.
    pub fn is_aead(self) -> bool {
        !matches!(
            self,
            SymmetricAlgorithm::Aes256Cbc
                | SymmetricAlgorithm::Aes192Cbc
                | SymmetricAlgorithm::Aes128Cbc
        )
    }
}

/// Digest component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    const ALL: [DigestAlgorithm; 3] = [
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
    ];

    fn as_str(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA2-256",
            DigestAlgorithm::Sha384 => "SHA2-384",
            DigestAlgorithm::Sha512 => "SHA2-512",
        }
    }

    /// Digest output length in bytes.
    pub fn output_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }
}

macro_rules! component_text {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = CryptoError;

            fn from_str(s: &str) -> CryptoResult<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| CryptoError::bad_cipher_suite(s))
            }
        }
    };
}

component_text!(KeyExchangeAlgorithm);
component_text!(AuthenticatorAlgorithm);
component_text!(SymmetricAlgorithm);
component_text!(DigestAlgorithm);

/// A four-tuple of algorithm choices with a canonical textual form.
///
/// # Example
///
/// ```
/// use keyvault::suite::CipherSuite;
///
/// let suite: CipherSuite = "ECDHE_ED25519_AES-256-GCM_SHA2-512".parse().unwrap();
/// assert_eq!(suite.to_string(), "ECDHE_ED25519_AES-256-GCM_SHA2-512");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSuite {
    pub key_exchange: KeyExchangeAlgorithm,
    pub authenticator: AuthenticatorAlgorithm,
    pub cipher: SymmetricAlgorithm,
    pub digest: DigestAlgorithm,
}

impl CipherSuite {
    pub fn new(
        key_exchange: KeyExchangeAlgorithm,
        authenticator: AuthenticatorAlgorithm,
        cipher: SymmetricAlgorithm,
        digest: DigestAlgorithm,
    ) -> Self {
        Self {
            key_exchange,
            authenticator,
            cipher,
            digest,
        }
    }

    /// Enumerate every recognized suite combination.
    pub fn cipher_suites() -> Vec<CipherSuite> {
        let mut suites = Vec::new();
        for kx in KeyExchangeAlgorithm::ALL {
            for auth in AuthenticatorAlgorithm::ALL {
                for cipher in SymmetricAlgorithm::ALL {
                    for digest in DigestAlgorithm::ALL {
                        suites.push(CipherSuite::new(kx, auth, cipher, digest));
                    }
                }
            }
        }
        suites
    }

    /// Verify that the given params can seed key-exchange key pairs for
    /// this suite.
    pub fn verify_key_exchange_params(&self, params: &Params) -> bool {
        match self.key_exchange {
            KeyExchangeAlgorithm::Ecdhe => params.kind() == KeyKind::X25519,
        }
    }

    /// Verify that the given key can perform this suite's key exchange.
    pub fn verify_key_exchange_key(&self, key: &AsymmetricKey) -> bool {
        match self.key_exchange {
            KeyExchangeAlgorithm::Ecdhe => key.kind() == KeyKind::X25519,
        }
    }

    /// Verify that the given params can seed authenticator key pairs for
    /// this suite.
    pub fn verify_authenticator_params(&self, params: &Params) -> bool {
        params.kind() == self.authenticator.key_kind()
    }

    /// Verify that the given key can sign or verify under this suite.
    pub fn verify_authenticator_key(&self, key: &AsymmetricKey) -> bool {
        key.kind() == self.authenticator.key_kind()
    }

    /// Verify that the given symmetric key fits this suite's cipher.
    pub fn verify_cipher_key(&self, key: &SymmetricKey) -> bool {
        key.len() == self.cipher.key_length()
    }

    /// Verify that the given key is a MAC secret.
    pub fn verify_mac_key(&self, key: &AsymmetricKey) -> bool {
        matches!(key.kind(), KeyKind::Hmac | KeyKind::Cmac) && !key.as_bytes().is_empty()
    }

    /// Build a [`Cipher`] over the given key using this suite's cipher
    /// and, for the non-AEAD modes, its digest for the external MAC.
    pub fn get_cipher(&self, key: Arc<SymmetricKey>) -> CryptoResult<Cipher> {
        Cipher::new(key, self.cipher, Some(self.digest))
    }

    /// Build a reusable [`Mac`] over the given HMAC/CMAC secret.
    pub fn get_mac(&self, key: Arc<AsymmetricKey>) -> CryptoResult<Mac> {
        Mac::new(key, self.digest)
    }

    /// Build an [`Authenticator`] for the given operation and key.
    pub fn get_authenticator(&self, op: Op, key: Arc<AsymmetricKey>) -> CryptoResult<Authenticator> {
        Authenticator::new(op, key, self.digest)
    }

    /// Build a [`KeyExchange`] around the given private key.
    pub fn get_key_exchange(&self, key: Arc<AsymmetricKey>) -> CryptoResult<KeyExchange> {
        KeyExchange::new(key, self.digest)
    }

    /// Fresh streaming digest for this suite's hash.
    pub fn get_message_digest(&self) -> MessageDigest {
        MessageDigest::new(self.digest)
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.key_exchange, self.authenticator, self.cipher, self.digest
        )
    }
}

impl FromStr for CipherSuite {
    type Err = CryptoError;

    fn from_str(s: &str) -> CryptoResult<Self> {
        let mut parts = s.split('_');
        let (Some(kx), Some(auth), Some(cipher), Some(digest), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(CryptoError::bad_cipher_suite(s));
        };
        Ok(CipherSuite::new(
            kx.parse()?,
            auth.parse()?,
            cipher.parse()?,
            digest.parse()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_text_round_trip() {
        for suite in CipherSuite::cipher_suites() {
            let text = suite.to_string();
            let parsed: CipherSuite = text.parse().unwrap();
            assert_eq!(parsed, suite);
        }
    }

    #[test]
    fn test_enumeration_size() {
        // 1 kx * 2 auth * 7 ciphers * 3 digests
        assert_eq!(CipherSuite::cipher_suites().len(), 42);
    }

    #[test]
    fn test_unknown_components_rejected() {
        for bad in [
            "ECDHE_ED25519_AES-256-GCM",
            "ECDHE_ED25519_AES-256-GCM_SHA2-512_EXTRA",
            "KECCAK_ED25519_AES-256-GCM_SHA2-512",
            "ECDHE_RSA_AES-256-GCM_SHA2-512",
            "ECDHE_ED25519_DES-EDE3_SHA2-512",
            "ECDHE_ED25519_AES-256-GCM_MD5",
            "",
        ] {
            let result: CryptoResult<CipherSuite> = bad.parse();
            assert!(
                matches!(result, Err(CryptoError::BadCipherSuite { .. })),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_cipher_properties() {
        assert_eq!(SymmetricAlgorithm::Aes256Gcm.key_length(), 32);
        assert_eq!(SymmetricAlgorithm::Aes256Gcm.iv_length(), 12);
        assert!(SymmetricAlgorithm::Aes256Gcm.is_aead());

        assert_eq!(SymmetricAlgorithm::Aes192Cbc.key_length(), 24);
        assert_eq!(SymmetricAlgorithm::Aes192Cbc.iv_length(), 16);
        assert!(!SymmetricAlgorithm::Aes192Cbc.is_aead());

        assert_eq!(SymmetricAlgorithm::ChaCha20Poly1305.key_length(), 32);
        assert_eq!(SymmetricAlgorithm::ChaCha20Poly1305.iv_length(), 12);
        assert!(SymmetricAlgorithm::ChaCha20Poly1305.is_aead());
    }

    #[test]
    fn test_key_validation() {
        use crate::keys::SymmetricKey;

        let suite: CipherSuite = "ECDHE_ED25519_AES-128-GCM_SHA2-256".parse().unwrap();
        let right = SymmetricKey::from_random(16, "", "").unwrap();
        let wrong = SymmetricKey::from_random(32, "", "").unwrap();
        assert!(suite.verify_cipher_key(&right));
        assert!(!suite.verify_cipher_key(&wrong));
    }

    #[test]
    fn test_asymmetric_validation() {
        let suite: CipherSuite = "ECDHE_ED25519_AES-256-GCM_SHA2-512".parse().unwrap();

        let kx = AsymmetricKey::generate(KeyKind::X25519, "", "").unwrap();
        let auth = AsymmetricKey::generate(KeyKind::Ed25519, "", "").unwrap();
        let ec = AsymmetricKey::generate(KeyKind::Ec, "", "").unwrap();
        let mac = AsymmetricKey::generate_mac_key(KeyKind::Hmac, 32, "", "").unwrap();

        assert!(suite.verify_key_exchange_key(&kx));
        assert!(!suite.verify_key_exchange_key(&auth));
        assert!(suite.verify_authenticator_key(&auth));
        assert!(!suite.verify_authenticator_key(&ec));
        assert!(suite.verify_mac_key(&mac));
        assert!(!suite.verify_mac_key(&kx));

        let ecdsa_suite: CipherSuite = "ECDHE_ECDSA_AES-256-GCM_SHA2-512".parse().unwrap();
        assert!(ecdsa_suite.verify_authenticator_key(&ec));
        assert!(!ecdsa_suite.verify_authenticator_key(&auth));
    }
}
