use std::sync::{Arc, Mutex};

use aes::cipher::consts::U12;
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes128Gcm, Aes256Gcm, AesGcm, Nonce,
};
use bytes::BufMut;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chacha20poly1305::ChaCha20Poly1305;

use crate::error::{CryptoError, CryptoResult};
use crate::id::Id;
use crate::keys::SymmetricKey;
use crate::mac::Mac;
use crate::secure_memory::SecureBytes;
use crate::serializable;
use crate::suite::{DigestAlgorithm, SymmetricAlgorithm};
use crate::utils;

type Aes192Gcm = AesGcm<aes::Aes192, U12>;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Serialized size of [`CiphertextHeader`].
pub const CIPHERTEXT_HEADER_SIZE: usize = 2 + 4 + 2;
/// Serialized size of [`FrameHeader`].
pub const FRAME_HEADER_SIZE: usize = Id::SIZE + 4;
/// Largest IV any supported cipher uses.
pub const MAX_IV_LENGTH: usize = 16;
/// Largest block padding any supported cipher can add.
pub const MAX_BLOCK_LENGTH: usize = 16;
/// Largest external MAC any supported digest produces.
pub const MAX_MAC_LENGTH: usize = 64;

/// Largest plaintext a single envelope can carry.
pub const MAX_PLAINTEXT_LENGTH: usize = u32::MAX as usize
    - FRAME_HEADER_SIZE
    - CIPHERTEXT_HEADER_SIZE
    - MAX_IV_LENGTH
    - MAX_BLOCK_LENGTH
    - MAX_MAC_LENGTH;

/// Worst-case unframed envelope size for a plaintext of the given length.
pub fn max_buffer_length(plaintext_length: usize) -> usize {
    CIPHERTEXT_HEADER_SIZE + MAX_IV_LENGTH + plaintext_length + MAX_BLOCK_LENGTH + MAX_MAC_LENGTH
}

/// Length fields of an unframed envelope.
///
/// Wire layout (big-endian):
///
/// ```text
/// | iv_len (u16) | ct_len (u32) | mac_len (u16) | iv | ciphertext | mac |
/// ```
///
/// For AEAD modes the tag is part of the ciphertext and `mac_len` is 0;
/// for CBC the external MAC over `iv || ciphertext` follows and `mac_len`
/// equals the digest length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CiphertextHeader {
    pub iv_length: u16,
    pub ciphertext_length: u32,
    pub mac_length: u16,
}

impl CiphertextHeader {
    /// Bytes of payload following the header.
    pub fn total_length(&self) -> usize {
        self.iv_length as usize + self.ciphertext_length as usize + self.mac_length as usize
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.put_u16(self.iv_length);
        buf.put_u32(self.ciphertext_length);
        buf.put_u16(self.mac_length);
    }

    pub fn decode(buf: &mut &[u8]) -> CryptoResult<Self> {
        let iv_length = serializable::get_u16(buf)
            .map_err(|_| CryptoError::invalid_envelope("truncated ciphertext header"))?;
        let ciphertext_length = serializable::get_u32(buf)
            .map_err(|_| CryptoError::invalid_envelope("truncated ciphertext header"))?;
        let mac_length = serializable::get_u16(buf)
            .map_err(|_| CryptoError::invalid_envelope("truncated ciphertext header"))?;
        Ok(Self {
            iv_length,
            ciphertext_length,
            mac_length,
        })
    }
}

/// Clear-text prefix of a framed envelope: which key encrypted the frame
/// and how long the envelope that follows is.
///
/// Frames serve both the wire (packet framing) and data at rest (each
/// block records which ring key can open it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub key_id: Id,
    pub ciphertext_length: u32,
}

impl FrameHeader {
    /// Serialized size in bytes.
    pub const SIZE: usize = FRAME_HEADER_SIZE;

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.put_slice(self.key_id.as_bytes());
        buf.put_u32(self.ciphertext_length);
    }

    pub fn decode(buf: &mut &[u8]) -> CryptoResult<Self> {
        let key_id = serializable::get_id(buf)
            .map_err(|_| CryptoError::invalid_envelope("truncated frame header"))?;
        let ciphertext_length = serializable::get_u32(buf)
            .map_err(|_| CryptoError::invalid_envelope("truncated frame header"))?;
        Ok(Self {
            key_id,
            ciphertext_length,
        })
    }
}

/// Per-direction usage counters, updated on each successful operation.
///
/// Observable through [`Cipher::encrypt_stats`] / [`Cipher::decrypt_stats`];
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherStats {
    pub use_count: usize,
    pub min_byte_count: usize,
    pub max_byte_count: usize,
    pub total_byte_count: usize,
}

impl CipherStats {
    fn new() -> Self {
        Self {
            use_count: 0,
            min_byte_count: usize::MAX,
            max_byte_count: 0,
            total_byte_count: 0,
        }
    }

    fn update(&mut self, byte_count: usize) {
        self.use_count += 1;
        if self.min_byte_count > byte_count {
            self.min_byte_count = byte_count;
        }
        if self.max_byte_count < byte_count {
            self.max_byte_count = byte_count;
        }
        self.total_byte_count += byte_count;
    }
}

/// Authenticated symmetric encryption producing self-describing envelopes.
///
/// A cipher binds a [`SymmetricKey`] to a bulk algorithm. AEAD modes
/// (GCM, ChaCha20-Poly1305) authenticate associated data and their own
/// ciphertext; the CBC modes refuse associated data and append an HMAC
/// over `iv || ciphertext` computed with the suite digest, verified before
/// any decryption is attempted.
///
/// Every encryption draws a fresh random IV. IV reuse under one key breaks
/// both confidentiality and authenticity, so no API accepts a caller IV.
pub struct Cipher {
    key: Arc<SymmetricKey>,
    algorithm: SymmetricAlgorithm,
    mac: Option<Mac>,
    encrypt_stats: Mutex<CipherStats>,
    decrypt_stats: Mutex<CipherStats>,
}

impl Cipher {
    /// Create a cipher over the given key.
    ///
    /// `digest` is required by the CBC modes for the external MAC and
    /// ignored by the AEAD modes (mirroring how a suite always carries a
    /// digest).
    pub fn new(
        key: Arc<SymmetricKey>,
        algorithm: SymmetricAlgorithm,
        digest: Option<DigestAlgorithm>,
    ) -> CryptoResult<Self> {
        if key.len() != algorithm.key_length() {
            return Err(CryptoError::invalid_argument(
                "key",
                &format!(
                    "{} requires a {} byte key, found {}",
                    algorithm,
                    algorithm.key_length(),
                    key.len()
                ),
            ));
        }
        let mac = if algorithm.is_aead() {
            None
        } else {
            let digest = digest.ok_or_else(|| {
                CryptoError::invalid_argument(
                    "digest",
                    "non-AEAD ciphers require a digest for the external MAC",
                )
            })?;
            Some(Mac::from_raw_hmac(key.as_bytes(), digest)?)
        };
        Ok(Self {
            key,
            algorithm,
            mac,
            encrypt_stats: Mutex::new(CipherStats::new()),
            decrypt_stats: Mutex::new(CipherStats::new()),
        })
    }

    /// The key this cipher encrypts with.
    pub fn key(&self) -> &Arc<SymmetricKey> {
        &self.key
    }

    /// The bulk algorithm in use.
    pub fn algorithm(&self) -> SymmetricAlgorithm {
        self.algorithm
    }

    /// Encryption-direction statistics.
    pub fn encrypt_stats(&self) -> CipherStats {
        *lock(&self.encrypt_stats)
    }

    /// Decryption-direction statistics.
    pub fn decrypt_stats(&self) -> CipherStats {
        *lock(&self.decrypt_stats)
    }

    fn check_plaintext(&self, plaintext: &[u8], associated_data: &[u8]) -> CryptoResult<()> {
        if plaintext.is_empty() {
            return Err(CryptoError::invalid_argument(
                "plaintext",
                "must not be empty",
            ));
        }
        if plaintext.len() > MAX_PLAINTEXT_LENGTH {
            return Err(CryptoError::invalid_argument(
                "plaintext",
                "exceeds the maximum envelope payload",
            ));
        }
        if !associated_data.is_empty() && !self.algorithm.is_aead() {
            // The CBC MAC covers iv || ciphertext only; accepting AD here
            // would leave it unauthenticated.
            return Err(CryptoError::invalid_argument(
                "associated_data",
                "only AEAD ciphers authenticate associated data",
            ));
        }
        Ok(())
    }

    /// Encrypt into an unframed envelope.
    ///
    /// # Arguments
    ///
    /// * `plaintext` - Data to encrypt (non-empty)
    /// * `associated_data` - Authenticated-only bytes; must be empty for
    ///   the CBC modes
    ///
    /// # Returns
    ///
    /// The envelope: `ciphertext header || iv || ciphertext || mac`.
    pub fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> CryptoResult<Vec<u8>> {
        self.check_plaintext(plaintext, associated_data)?;

        let iv_length = self.algorithm.iv_length();
        let mut iv = [0u8; MAX_IV_LENGTH];
        utils::fill_random(&mut iv[..iv_length]);
        let iv = &iv[..iv_length];

        let ciphertext = match self.algorithm {
            SymmetricAlgorithm::Aes128Gcm
            | SymmetricAlgorithm::Aes192Gcm
            | SymmetricAlgorithm::Aes256Gcm
            | SymmetricAlgorithm::ChaCha20Poly1305 => {
                self.aead_seal(iv, plaintext, associated_data)?
            }
            SymmetricAlgorithm::Aes128Cbc
            | SymmetricAlgorithm::Aes192Cbc
            | SymmetricAlgorithm::Aes256Cbc => self.cbc_encrypt(iv, plaintext)?,
        };

        let mac_length = self.mac.as_ref().map_or(0, Mac::output_len);
        let header = CiphertextHeader {
            iv_length: iv_length as u16,
            ciphertext_length: ciphertext.len() as u32,
            mac_length: mac_length as u16,
        };

        let mut envelope =
            Vec::with_capacity(CIPHERTEXT_HEADER_SIZE + header.total_length());
        header.encode(&mut envelope);
        envelope.extend_from_slice(iv);
        envelope.extend_from_slice(&ciphertext);
        if let Some(mac) = &self.mac {
            // The tag is written straight into the envelope, over the
            // iv || ciphertext region that precedes it.
            let body_end = envelope.len();
            envelope.resize(body_end + mac_length, 0);
            let (body, tag_out) = envelope.split_at_mut(body_end);
            mac.sign_into(&body[CIPHERTEXT_HEADER_SIZE..], tag_out)?;
        }

        lock(&self.encrypt_stats).update(plaintext.len());
        Ok(envelope)
    }

    /// Encrypt into a framed envelope: the unframed envelope prefixed with
    /// the key id and the envelope length.
    pub fn encrypt_and_frame(
        &self,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let envelope = self.encrypt(plaintext, associated_data)?;
        let mut framed = Vec::with_capacity(FRAME_HEADER_SIZE + envelope.len());
        FrameHeader {
            key_id: self.key.id().clone(),
            ciphertext_length: envelope.len() as u32,
        }
        .encode(&mut framed);
        framed.extend_from_slice(&envelope);
        Ok(framed)
    }

    fn parse_envelope<'a>(
        &self,
        envelope: &'a [u8],
    ) -> CryptoResult<(CiphertextHeader, &'a [u8], &'a [u8], &'a [u8])> {
        let mut reader = envelope;
        let header = CiphertextHeader::decode(&mut reader)?;
        if header.iv_length as usize != self.algorithm.iv_length() {
            return Err(CryptoError::invalid_envelope("unexpected iv length"));
        }
        let expected_mac = self.mac.as_ref().map_or(0, Mac::output_len);
        if header.mac_length as usize != expected_mac {
            return Err(CryptoError::invalid_envelope("unexpected mac length"));
        }
        if reader.len() != header.total_length() {
            return Err(CryptoError::invalid_envelope(
                "envelope length disagrees with header",
            ));
        }
        let (iv, rest) = reader.split_at(header.iv_length as usize);
        let (ciphertext, mac) = rest.split_at(header.ciphertext_length as usize);
        Ok((header, iv, ciphertext, mac))
    }

    /// Verify and decrypt an unframed envelope.
    ///
    /// The associated data must match what was passed to
    /// [`Cipher::encrypt`]. Authentication failures are indistinguishable
    /// from one another by design.
    pub fn decrypt(&self, envelope: &[u8], associated_data: &[u8]) -> CryptoResult<Vec<u8>> {
        if envelope.is_empty() {
            return Err(CryptoError::invalid_argument(
                "envelope",
                "must not be empty",
            ));
        }
        if !associated_data.is_empty() && !self.algorithm.is_aead() {
            return Err(CryptoError::invalid_argument(
                "associated_data",
                "only AEAD ciphers authenticate associated data",
            ));
        }
        let (header, iv, ciphertext, mac_tag) = self.parse_envelope(envelope)?;

        let plaintext = match &self.mac {
            Some(mac) => {
                // Verify-then-decrypt: nothing is deciphered unless the
                // tag over iv || ciphertext checks out.
                let authenticated =
                    &envelope[CIPHERTEXT_HEADER_SIZE..CIPHERTEXT_HEADER_SIZE + header.iv_length as usize + header.ciphertext_length as usize];
                if !mac.verify_buffer(authenticated, mac_tag) {
                    return Err(CryptoError::AuthFailed);
                }
                self.cbc_decrypt(iv, ciphertext)?
            }
            None => self.aead_open(iv, ciphertext, associated_data)?,
        };

        lock(&self.decrypt_stats)
            .update(header.iv_length as usize + header.ciphertext_length as usize);
        Ok(plaintext)
    }

    /// Decrypt into wiped-on-drop memory, for plaintext that is itself key
    /// material (e.g. a serialized key ring).
    pub fn decrypt_secure(
        &self,
        envelope: &[u8],
        associated_data: &[u8],
    ) -> CryptoResult<SecureBytes> {
        self.decrypt(envelope, associated_data).map(SecureBytes::from)
    }

    fn aead_seal(&self, iv: &[u8], plaintext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        let key = self.key.as_bytes();
        let sealed = match self.algorithm {
            SymmetricAlgorithm::Aes128Gcm => Aes128Gcm::new_from_slice(key)
                .map_err(|_| CryptoError::primitive_failure("aead keying"))?
                .encrypt(Nonce::from_slice(iv), payload),
            SymmetricAlgorithm::Aes192Gcm => Aes192Gcm::new_from_slice(key)
                .map_err(|_| CryptoError::primitive_failure("aead keying"))?
                .encrypt(Nonce::from_slice(iv), payload),
            SymmetricAlgorithm::Aes256Gcm => Aes256Gcm::new_from_slice(key)
                .map_err(|_| CryptoError::primitive_failure("aead keying"))?
                .encrypt(Nonce::from_slice(iv), payload),
            SymmetricAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key)
                .map_err(|_| CryptoError::primitive_failure("aead keying"))?
                .encrypt(Nonce::from_slice(iv), payload),
            _ => unreachable!("aead_seal called for a non-AEAD algorithm"),
        };
        sealed.map_err(|_| CryptoError::primitive_failure("aead encryption"))
    }

    fn aead_open(&self, iv: &[u8], ciphertext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        let key = self.key.as_bytes();
        let opened = match self.algorithm {
            SymmetricAlgorithm::Aes128Gcm => Aes128Gcm::new_from_slice(key)
                .map_err(|_| CryptoError::primitive_failure("aead keying"))?
                .decrypt(Nonce::from_slice(iv), payload),
            SymmetricAlgorithm::Aes192Gcm => Aes192Gcm::new_from_slice(key)
                .map_err(|_| CryptoError::primitive_failure("aead keying"))?
                .decrypt(Nonce::from_slice(iv), payload),
            SymmetricAlgorithm::Aes256Gcm => Aes256Gcm::new_from_slice(key)
                .map_err(|_| CryptoError::primitive_failure("aead keying"))?
                .decrypt(Nonce::from_slice(iv), payload),
            SymmetricAlgorithm::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key)
                .map_err(|_| CryptoError::primitive_failure("aead keying"))?
                .decrypt(Nonce::from_slice(iv), payload),
            _ => unreachable!("aead_open called for a non-AEAD algorithm"),
        };
        opened.map_err(|_| CryptoError::AuthFailed)
    }

    fn cbc_encrypt(&self, iv: &[u8], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let key = self.key.as_bytes();
        let keying = |_| CryptoError::primitive_failure("cbc keying");
        Ok(match self.algorithm {
            SymmetricAlgorithm::Aes128Cbc => Aes128CbcEnc::new_from_slices(key, iv)
                .map_err(keying)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            SymmetricAlgorithm::Aes192Cbc => Aes192CbcEnc::new_from_slices(key, iv)
                .map_err(keying)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            SymmetricAlgorithm::Aes256Cbc => Aes256CbcEnc::new_from_slices(key, iv)
                .map_err(keying)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            _ => unreachable!("cbc_encrypt called for a non-CBC algorithm"),
        })
    }

    fn cbc_decrypt(&self, iv: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        let key = self.key.as_bytes();
        let keying = |_| CryptoError::primitive_failure("cbc keying");
        let opened = match self.algorithm {
            SymmetricAlgorithm::Aes128Cbc => Aes128CbcDec::new_from_slices(key, iv)
                .map_err(keying)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            SymmetricAlgorithm::Aes192Cbc => Aes192CbcDec::new_from_slices(key, iv)
                .map_err(keying)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            SymmetricAlgorithm::Aes256Cbc => Aes256CbcDec::new_from_slices(key, iv)
                .map_err(keying)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            _ => unreachable!("cbc_decrypt called for a non-CBC algorithm"),
        };
        // The MAC already vouched for the ciphertext, so a pad error here
        // still reports as an authentication failure rather than leaking
        // pad structure.
        opened.map_err(|_| CryptoError::AuthFailed)
    }
}

fn lock(stats: &Mutex<CipherStats>) -> std::sync::MutexGuard<'_, CipherStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("key", &self.key.id())
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}
