/*!
 * Streaming Message Digest
 *
 * Runtime-dispatch wrapper over the SHA-2 family. The suite names a digest
 * by string; this type carries the concrete hasher and exposes the
 * `init / update / finalize` cycle used by key derivation, authenticators,
 * and identifier construction. After every `finalize` the digest resets to
 * its initial state and may be reused.
 */

use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::suite::DigestAlgorithm;

enum DigestState {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

/// A reusable streaming digest for the suite's hash algorithm.
pub struct MessageDigest {
    algorithm: DigestAlgorithm,
    state: DigestState,
}

impl MessageDigest {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        let state = match algorithm {
            DigestAlgorithm::Sha256 => DigestState::Sha256(Sha256::new()),
            DigestAlgorithm::Sha384 => DigestState::Sha384(Sha384::new()),
            DigestAlgorithm::Sha512 => DigestState::Sha512(Sha512::new()),
        };
        Self { algorithm, state }
    }

    /// The algorithm this digest computes.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Output length in bytes.
    pub fn output_len(&self) -> usize {
        self.algorithm.output_len()
    }

    /// Feed more input into the running digest.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            DigestState::Sha256(h) => h.update(data),
            DigestState::Sha384(h) => h.update(data),
            DigestState::Sha512(h) => h.update(data),
        }
    }

    /// Produce the digest of everything fed since construction or the last
    /// finalize, and reset for reuse.
    pub fn finalize(&mut self) -> Vec<u8> {
        match &mut self.state {
            DigestState::Sha256(h) => h.finalize_reset().to_vec(),
            DigestState::Sha384(h) => h.finalize_reset().to_vec(),
            DigestState::Sha512(h) => h.finalize_reset().to_vec(),
        }
    }

    /// One-shot digest of a buffer.
    pub fn digest(algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
        let mut md = MessageDigest::new(algorithm);
        md.update(data);
        md.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_lengths() {
        assert_eq!(MessageDigest::new(DigestAlgorithm::Sha256).output_len(), 32);
        assert_eq!(MessageDigest::new(DigestAlgorithm::Sha384).output_len(), 48);
        assert_eq!(MessageDigest::new(DigestAlgorithm::Sha512).output_len(), 64);
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut md = MessageDigest::new(DigestAlgorithm::Sha512);
        md.update(b"hello ");
        md.update(b"world");
        let streamed = md.finalize();
        assert_eq!(
            streamed,
            MessageDigest::digest(DigestAlgorithm::Sha512, b"hello world")
        );
    }

    #[test]
    fn test_finalize_resets_state() {
        let mut md = MessageDigest::new(DigestAlgorithm::Sha256);
        md.update(b"first message");
        let first = md.finalize();
        md.update(b"first message");
        assert_eq!(md.finalize(), first);
    }

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc") from FIPS 180-2.
        let digest = MessageDigest::digest(DigestAlgorithm::Sha256, b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
