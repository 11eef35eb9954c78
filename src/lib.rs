/*!
 * KeyVault Cryptographic Key Management
 *
 * This library implements a hierarchical key ring for storing, organizing
 * and serving cryptographic material, together with the authenticated
 * symmetric cipher the ring uses to protect its own on-disk form.
 *
 * The main building blocks are:
 *
 * - A self-describing ciphertext envelope binding IV, ciphertext, MAC tag
 *   and (framed) the encrypting key's id
 * - A recursive key ring with lifecycle-controlled key categories
 *   (active, retired, master) and memoized derived objects
 * - A cipher-suite abstraction mapping a textual suite identifier onto
 *   concrete algorithm choices, with role validation for every key
 *
 * These are combined so that the same ring secures data on the wire
 * (distribute a ring, authenticate peers, agree on session keys) and data
 * at rest (generate permanent keys, save the ring under a wrap key,
 * reload it to decrypt).
 */

/// Stable 32-byte object identity
pub mod id;

/// Serialization substrate shared by all persisted objects
pub mod serializable;

/// Symmetric keys, asymmetric keys, and key-generation parameters
pub mod keys;

/// Cipher-suite descriptors, validation and factories
pub mod suite;

/// Streaming message digests
pub mod digest;

/// Authenticated symmetric encryption and the ciphertext envelope
pub mod cipher;

/// Reusable HMAC/CMAC objects
pub mod mac;

/// Public-key signing and verification
pub mod authenticator;

/// X25519 key agreement with HKDF expansion
pub mod key_exchange;

/// The hierarchical key ring
pub mod keyring;

/// Common error types for the library
pub mod error;

/// Utilities for cryptographic operations
pub mod utils;

/// Secure memory handling utilities
pub mod secure_memory;

// Re-export main types for convenience
pub use authenticator::{Authenticator, Op};
pub use cipher::{Cipher, CipherStats, FrameHeader};
pub use error::{CryptoError, CryptoResult};
pub use id::Id;
pub use key_exchange::KeyExchange;
pub use keyring::KeyRing;
pub use keys::{AsymmetricKey, KeyKind, Params, SymmetricKey};
pub use mac::Mac;
pub use suite::CipherSuite;

/// Initialize the library.
///
/// No special initialization is currently needed; this function exists to
/// provide a stable API point that can accommodate future requirements of
/// the underlying cryptographic backends.
///
/// # Example
///
/// ```
/// use keyvault::prelude::*;
///
/// fn main() -> Result<(), CryptoError> {
///     init()?;
///     Ok(())
/// }
/// ```
pub fn init() -> Result<(), CryptoError> {
    Ok(())
}

/// Provides a simplified interface to the most commonly used operations.
pub mod prelude {
    pub use crate::authenticator::{
        read_signature_file, write_signature_file, Authenticator, Op,
    };
    pub use crate::cipher::{Cipher, CipherStats, FrameHeader, MAX_PLAINTEXT_LENGTH};
    pub use crate::digest::MessageDigest;
    pub use crate::error::{CryptoError, CryptoResult};
    pub use crate::id::Id;
    pub use crate::init;
    pub use crate::key_exchange::KeyExchange;
    pub use crate::keyring::KeyRing;
    pub use crate::keys::{
        AsymmetricKey, KeyKind, NamedCurve, Params, SymmetricKey, MAX_SYMMETRIC_KEY_LENGTH,
    };
    pub use crate::mac::Mac;
    pub use crate::secure_memory::{with_secure_scope, SecureBytes};
    pub use crate::suite::{
        AuthenticatorAlgorithm, CipherSuite, DigestAlgorithm, KeyExchangeAlgorithm,
        SymmetricAlgorithm,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization() {
        assert!(init().is_ok());
    }

    #[test]
    fn test_prelude_end_to_end() {
        use prelude::*;
        use std::sync::Arc;

        init().unwrap();

        // Build a ring, hand out a cipher for its master key, and push a
        // framed message through it.
        let suite: CipherSuite = "ECDHE_ED25519_AES-256-GCM_SHA2-256".parse().unwrap();
        let mut ring = KeyRing::new(suite, None, "session", "").unwrap();
        let master_id = ring.master_cipher_key().id().clone();

        let cipher = ring.get_cipher(&master_id, false).unwrap().unwrap();
        let framed = cipher.encrypt_and_frame(b"over the wire", b"v1").unwrap();

        // The receiver reads the frame header to find the right key.
        let mut reader = framed.as_slice();
        let frame = FrameHeader::decode(&mut reader).unwrap();
        let receiver_cipher = ring.get_cipher(&frame.key_id, true).unwrap().unwrap();
        let plaintext = receiver_cipher.decrypt(reader, b"v1").unwrap();
        assert_eq!(plaintext, b"over the wire");

        // Sign the same payload with a ring authenticator.
        let signer_key = Arc::new(AsymmetricKey::generate(KeyKind::Ed25519, "", "").unwrap());
        ring.add_authenticator_key(signer_key.clone()).unwrap();
        let signer = ring
            .get_authenticator(Op::Sign, signer_key.id(), false)
            .unwrap()
            .unwrap();
        let verifier = ring
            .get_authenticator(Op::Verify, signer_key.id(), false)
            .unwrap()
            .unwrap();
        let signature = signer.sign_buffer(&plaintext).unwrap();
        assert!(verifier.verify_buffer_signature(&plaintext, &signature).unwrap());
    }
}
