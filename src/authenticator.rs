/*!
 * Public-Key Authenticators
 *
 * An [`Authenticator`] wraps a signer (for [`Op::Sign`]) or verifier (for
 * [`Op::Verify`]) bound to an asymmetric key and the suite digest, with
 * one-shot operations over buffers and files. Internal state resets after
 * every operation, so one instance may be reused indefinitely in any
 * order.
 *
 * Ed25519 is the special case: the algorithm needs the complete message,
 * so the signer collects all input and emits the signature in one atomic
 * step; file operations read the whole file. ECDSA streams the suite
 * digest over the input and signs the digest (hash-then-sign).
 */

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{
    Signature as Ed25519Signature, Signer as _, SigningKey as Ed25519SigningKey,
    Verifier as _, VerifyingKey as Ed25519VerifyingKey,
};
use p256::ecdsa::{
    signature::{Signer as _, Verifier as _},
    Signature as EcdsaSignature, SigningKey as EcdsaSigningKey, VerifyingKey as EcdsaVerifyingKey,
};

use crate::digest::MessageDigest;
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{AsymmetricKey, KeyKind};
use crate::suite::DigestAlgorithm;

/// File-streaming chunk size.
const FILE_CHUNK_SIZE: usize = 4096;

/// Which operation an [`Authenticator`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Op {
    Sign,
    Verify,
}

/// A reusable signer or verifier.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use keyvault::authenticator::{Authenticator, Op};
/// use keyvault::keys::{AsymmetricKey, KeyKind};
/// use keyvault::suite::DigestAlgorithm;
///
/// let key = Arc::new(AsymmetricKey::generate(KeyKind::Ed25519, "", "").unwrap());
/// let signer = Authenticator::new(Op::Sign, key.clone(), DigestAlgorithm::Sha512).unwrap();
/// let verifier = Authenticator::new(Op::Verify, key, DigestAlgorithm::Sha512).unwrap();
///
/// let signature = signer.sign_buffer(b"message").unwrap();
/// assert!(verifier.verify_buffer_signature(b"message", &signature).unwrap());
/// ```
pub struct Authenticator {
    op: Op,
    key: Arc<AsymmetricKey>,
    digest: DigestAlgorithm,
}

impl Authenticator {
    /// Bind an operation to a key and digest.
    ///
    /// Signing requires a private Ed25519 or EC key; verification accepts
    /// either half (the public key is derived on demand from a private
    /// one).
    pub fn new(op: Op, key: Arc<AsymmetricKey>, digest: DigestAlgorithm) -> CryptoResult<Self> {
        if !matches!(key.kind(), KeyKind::Ed25519 | KeyKind::Ec) {
            return Err(CryptoError::invalid_argument(
                "key",
                &format!("cannot authenticate with a {} key", key.kind()),
            ));
        }
        if op == Op::Sign && !key.is_private() {
            return Err(CryptoError::invalid_argument(
                "key",
                "signing requires a private key",
            ));
        }
        Ok(Self { op, key, digest })
    }

    pub fn op(&self) -> Op {
        self.op
    }

    /// The key this authenticator operates with.
    pub fn key(&self) -> &Arc<AsymmetricKey> {
        &self.key
    }

    /// Sign a buffer, returning the signature bytes.
    pub fn sign_buffer(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        self.require(Op::Sign)?;
        match self.key.kind() {
            KeyKind::Ed25519 => Ok(self.ed25519_signer()?.sign(data).to_bytes().to_vec()),
            KeyKind::Ec => {
                let digest = MessageDigest::digest(self.digest, data);
                self.ecdsa_sign_digest(&digest)
            }
            _ => unreachable!("key kind validated at construction"),
        }
    }

    /// Sign a file's contents, streaming where the algorithm allows.
    pub fn sign_file(&self, path: &Path) -> CryptoResult<Vec<u8>> {
        self.require(Op::Sign)?;
        match self.key.kind() {
            KeyKind::Ed25519 => {
                // Ed25519 signs the complete message in one step.
                let contents = std::fs::read(path)?;
                Ok(self.ed25519_signer()?.sign(&contents).to_bytes().to_vec())
            }
            KeyKind::Ec => {
                let digest = self.digest_file(path)?;
                self.ecdsa_sign_digest(&digest)
            }
            _ => unreachable!("key kind validated at construction"),
        }
    }

    /// Verify a signature over a buffer.
    ///
    /// Returns `Ok(false)` for a well-formed but wrong signature and for a
    /// malformed signature; errors are reserved for unusable keys and I/O.
    pub fn verify_buffer_signature(&self, data: &[u8], signature: &[u8]) -> CryptoResult<bool> {
        self.require(Op::Verify)?;
        match self.key.kind() {
            KeyKind::Ed25519 => {
                let Ok(signature) = Ed25519Signature::from_slice(signature) else {
                    return Ok(false);
                };
                Ok(self
                    .ed25519_verifier()?
                    .verify(data, &signature)
                    .is_ok())
            }
            KeyKind::Ec => {
                let digest = MessageDigest::digest(self.digest, data);
                self.ecdsa_verify_digest(&digest, signature)
            }
            _ => unreachable!("key kind validated at construction"),
        }
    }

    /// Verify a signature over a file's contents.
    pub fn verify_file_signature(&self, path: &Path, signature: &[u8]) -> CryptoResult<bool> {
        self.require(Op::Verify)?;
        match self.key.kind() {
            KeyKind::Ed25519 => {
                let contents = std::fs::read(path)?;
                let Ok(signature) = Ed25519Signature::from_slice(signature) else {
                    return Ok(false);
                };
                Ok(self
                    .ed25519_verifier()?
                    .verify(&contents, &signature)
                    .is_ok())
            }
            KeyKind::Ec => {
                let digest = self.digest_file(path)?;
                self.ecdsa_verify_digest(&digest, signature)
            }
            _ => unreachable!("key kind validated at construction"),
        }
    }

    fn require(&self, op: Op) -> CryptoResult<()> {
        if self.op != op {
            return Err(CryptoError::invalid_argument(
                "op",
                match op {
                    Op::Sign => "this authenticator was constructed for verification",
                    Op::Verify => "this authenticator was constructed for signing",
                },
            ));
        }
        Ok(())
    }

    fn digest_file(&self, path: &Path) -> CryptoResult<Vec<u8>> {
        let mut file = File::open(path)?;
        let mut md = MessageDigest::new(self.digest);
        let mut chunk = [0u8; FILE_CHUNK_SIZE];
        loop {
            let count = file.read(&mut chunk)?;
            if count == 0 {
                break;
            }
            md.update(&chunk[..count]);
        }
        Ok(md.finalize())
    }

    fn ed25519_signer(&self) -> CryptoResult<Ed25519SigningKey> {
        let material: &[u8; 64] = self
            .key
            .as_bytes()
            .try_into()
            .map_err(|_| CryptoError::invalid_argument("key", "malformed Ed25519 private key"))?;
        Ed25519SigningKey::from_keypair_bytes(material)
            .map_err(|_| CryptoError::primitive_failure("ed25519 keying"))
    }

    fn ed25519_verifier(&self) -> CryptoResult<Ed25519VerifyingKey> {
        let material = self.key.as_bytes();
        let public: &[u8; 32] = if self.key.is_private() {
            // Private material is the keypair form; the public point is
            // the trailing 32 bytes.
            material
                .get(32..)
                .and_then(|tail| tail.try_into().ok())
                .ok_or_else(|| {
                    CryptoError::invalid_argument("key", "malformed Ed25519 private key")
                })?
        } else {
            material.try_into().map_err(|_| {
                CryptoError::invalid_argument("key", "malformed Ed25519 public key")
            })?
        };
        Ed25519VerifyingKey::from_bytes(public)
            .map_err(|_| CryptoError::primitive_failure("ed25519 keying"))
    }

    fn ecdsa_sign_digest(&self, digest: &[u8]) -> CryptoResult<Vec<u8>> {
        let signing = EcdsaSigningKey::from_slice(self.key.as_bytes())
            .map_err(|_| CryptoError::primitive_failure("ecdsa keying"))?;
        let signature: EcdsaSignature = signing.sign(digest);
        Ok(signature.to_bytes().to_vec())
    }

    fn ecdsa_verify_digest(&self, digest: &[u8], signature: &[u8]) -> CryptoResult<bool> {
        let verifying = if self.key.is_private() {
            let signing = EcdsaSigningKey::from_slice(self.key.as_bytes())
                .map_err(|_| CryptoError::primitive_failure("ecdsa keying"))?;
            *signing.verifying_key()
        } else {
            EcdsaVerifyingKey::from_sec1_bytes(self.key.as_bytes())
                .map_err(|_| CryptoError::primitive_failure("ecdsa keying"))?
        };
        let Ok(signature) = EcdsaSignature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(verifying.verify(digest, &signature).is_ok())
    }
}

/// Write signature bytes next to the signed file as `<input>.sig`:
/// base64, wrapped at 64 characters per line.
///
/// Returns the path of the signature file.
pub fn write_signature_file(input: &Path, signature: &[u8]) -> CryptoResult<PathBuf> {
    let mut sig_path = input.as_os_str().to_owned();
    sig_path.push(".sig");
    let sig_path = PathBuf::from(sig_path);

    let encoded = BASE64.encode(signature);
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / 64 + 1);
    for line in encoded.as_bytes().chunks(64) {
        // base64 output is ASCII; every chunk boundary is a char boundary.
        wrapped.push_str(std::str::from_utf8(line).map_err(|_| {
            CryptoError::serialization_failure("base64 produced non-ASCII output")
        })?);
        wrapped.push('\n');
    }
    std::fs::write(&sig_path, wrapped)?;
    Ok(sig_path)
}

/// Read signature bytes from a `.sig` file written by
/// [`write_signature_file`].
pub fn read_signature_file(sig_path: &Path) -> CryptoResult<Vec<u8>> {
    let contents = std::fs::read_to_string(sig_path)?;
    let compact: String = contents.split_whitespace().collect();
    BASE64
        .decode(compact.as_bytes())
        .map_err(|_| CryptoError::serialization_failure("signature file is not valid base64"))
}
