use bytes::BufMut;
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use p256::ecdsa::SigningKey as EcdsaSigningKey;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519StaticSecret};

use crate::error::{CryptoError, CryptoResult};
use crate::id::Id;
use crate::secure_memory::SecureBytes;
use crate::serializable::{self, ObjectHeader, TYPE_ASYMMETRIC_KEY};
use crate::utils;

/// Algorithm family of an [`AsymmetricKey`].
///
/// The full tag set survives on the wire for interoperability; key
/// generation and the suite validators only accept the families this
/// library backs (`Ec`, `Hmac`, `Cmac`, `Ed25519`, `X25519`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyKind {
    Rsa,
    Dsa,
    Ec,
    Dh,
    Hmac,
    Cmac,
    Ed25519,
    X25519,
}

impl KeyKind {
    fn wire_code(self) -> u8 {
        match self {
            KeyKind::Rsa => 1,
            KeyKind::Dsa => 2,
            KeyKind::Ec => 3,
            KeyKind::Dh => 4,
            KeyKind::Hmac => 5,
            KeyKind::Cmac => 6,
            KeyKind::Ed25519 => 7,
            KeyKind::X25519 => 8,
        }
    }

    fn from_wire_code(code: u8) -> CryptoResult<Self> {
        Ok(match code {
            1 => KeyKind::Rsa,
            2 => KeyKind::Dsa,
            3 => KeyKind::Ec,
            4 => KeyKind::Dh,
            5 => KeyKind::Hmac,
            6 => KeyKind::Cmac,
            7 => KeyKind::Ed25519,
            8 => KeyKind::X25519,
            _ => {
                return Err(CryptoError::serialization_failure(&format!(
                    "unknown key kind code {}",
                    code
                )))
            }
        })
    }
}

impl std::fmt::Display for KeyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KeyKind::Rsa => "RSA",
            KeyKind::Dsa => "DSA",
            KeyKind::Ec => "EC",
            KeyKind::Dh => "DH",
            KeyKind::Hmac => "HMAC",
            KeyKind::Cmac => "CMAC",
            KeyKind::Ed25519 => "Ed25519",
            KeyKind::X25519 => "X25519",
        };
        f.write_str(name)
    }
}

/// A private or public asymmetric key, or a tagged MAC secret.
///
/// The material layout depends on the kind:
/// - `Ed25519` private keys hold the 64-byte keypair form (seed followed
///   by the public point); the trailing 32 bytes *are* the public key and
///   [`AsymmetricKey::public_key`] exposes them without re-deriving.
/// - `X25519` private and public keys are 32 bytes each.
/// - `Ec` (P-256) private keys hold the 32-byte scalar; public keys hold
///   the SEC1 compressed point.
/// - `Hmac`/`Cmac` keys hold the raw MAC secret and are always private.
pub struct AsymmetricKey {
    id: Id,
    name: String,
    description: String,
    kind: KeyKind,
    private: bool,
    material: SecureBytes,
}

impl AsymmetricKey {
    /// Generate a fresh key pair of the given kind.
    ///
    /// Supported kinds: `Ed25519`, `X25519`, `Ec` (P-256). The returned
    /// key is private; obtain the peer half with
    /// [`AsymmetricKey::public_key`].
    pub fn generate(kind: KeyKind, name: &str, description: &str) -> CryptoResult<Self> {
        let material = match kind {
            KeyKind::Ed25519 => {
                let signing = Ed25519SigningKey::generate(&mut OsRng);
                SecureBytes::from(signing.to_keypair_bytes().to_vec())
            }
            KeyKind::X25519 => {
                let secret = X25519StaticSecret::random_from_rng(OsRng);
                SecureBytes::from(secret.to_bytes().to_vec())
            }
            KeyKind::Ec => {
                let signing = EcdsaSigningKey::random(&mut OsRng);
                SecureBytes::from(signing.to_bytes().to_vec())
            }
            _ => {
                return Err(CryptoError::invalid_argument(
                    "kind",
                    &format!("cannot generate a {} key pair", kind),
                ))
            }
        };
        Ok(Self::assemble(kind, true, material, name, description))
    }

    /// Generate a random MAC secret tagged `Hmac` or `Cmac`.
    ///
    /// CMAC secrets must be a valid AES key length (16, 24 or 32 bytes).
    pub fn generate_mac_key(
        kind: KeyKind,
        length: usize,
        name: &str,
        description: &str,
    ) -> CryptoResult<Self> {
        match kind {
            KeyKind::Hmac => {
                if length == 0 {
                    return Err(CryptoError::invalid_argument(
                        "length",
                        "HMAC secret must not be empty",
                    ));
                }
            }
            KeyKind::Cmac => {
                if !matches!(length, 16 | 24 | 32) {
                    return Err(CryptoError::invalid_argument(
                        "length",
                        "CMAC secret must be 16, 24 or 32 bytes",
                    ));
                }
            }
            _ => {
                return Err(CryptoError::invalid_argument(
                    "kind",
                    "MAC keys must be HMAC or CMAC",
                ))
            }
        }
        let material = SecureBytes::from(utils::random_bytes(length));
        Ok(Self::assemble(kind, true, material, name, description))
    }

    /// Wrap existing key material.
    pub fn from_material(
        kind: KeyKind,
        private: bool,
        material: &[u8],
        name: &str,
        description: &str,
    ) -> CryptoResult<Self> {
        if material.is_empty() {
            return Err(CryptoError::invalid_argument(
                "material",
                "key material must not be empty",
            ));
        }
        if matches!(kind, KeyKind::Hmac | KeyKind::Cmac) && !private {
            return Err(CryptoError::invalid_argument(
                "private",
                "MAC secrets have no public half",
            ));
        }
        Ok(Self::assemble(
            kind,
            private,
            SecureBytes::new(material),
            name,
            description,
        ))
    }

    fn assemble(
        kind: KeyKind,
        private: bool,
        material: SecureBytes,
        name: &str,
        description: &str,
    ) -> Self {
        // The id commits to the kind and role as well as the bytes, so a
        // private key and its derived public key never collide.
        let mut preimage = Vec::with_capacity(material.len() + 2);
        preimage.push(kind.wire_code());
        preimage.push(private as u8);
        preimage.extend_from_slice(material.as_bytes());
        let id = Id::from_bytes(&preimage);
        Self {
            id,
            name: name.to_string(),
            description: description.to_string(),
            kind,
            private,
            material,
        }
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

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    /// The raw key material.
    pub fn as_bytes(&self) -> &[u8] {
        self.material.as_bytes()
    }

    /// Derive the public half of this key.
    ///
    /// Never mutates the private key. Calling this on a public key returns
    /// an identical public key; calling it on a MAC secret is an error.
    pub fn public_key(&self, name: &str, description: &str) -> CryptoResult<Self> {
        if !self.private {
            return Ok(Self::assemble(
                self.kind,
                false,
                self.material.clone(),
                name,
                description,
            ));
        }
        let public = match self.kind {
            KeyKind::Ed25519 => {
                let material = self.material.as_bytes();
                if material.len() != 64 {
                    return Err(CryptoError::invalid_argument(
                        "key",
                        "Ed25519 private key material must be 64 bytes",
                    ));
                }
                SecureBytes::new(&material[32..])
            }
            KeyKind::X25519 => {
                let secret = X25519StaticSecret::from(self.material_array::<32>()?);
                SecureBytes::from(X25519PublicKey::from(&secret).as_bytes().to_vec())
            }
            KeyKind::Ec => {
                let signing = EcdsaSigningKey::from_slice(self.material.as_bytes())
                    .map_err(|_| CryptoError::primitive_failure("EC key parsing"))?;
                let point = signing.verifying_key().to_encoded_point(true);
                SecureBytes::new(point.as_bytes())
            }
            KeyKind::Hmac | KeyKind::Cmac => {
                return Err(CryptoError::invalid_argument(
                    "key",
                    "MAC secrets have no public half",
                ))
            }
            _ => {
                return Err(CryptoError::invalid_argument(
                    "key",
                    &format!("cannot derive a public {} key", self.kind),
                ))
            }
        };
        Ok(Self::assemble(self.kind, false, public, name, description))
    }

    fn material_array<const N: usize>(&self) -> CryptoResult<[u8; N]> {
        self.material
            .as_bytes()
            .try_into()
            .map_err(|_| {
                CryptoError::invalid_argument(
                    "key",
                    &format!("expected {} bytes of key material", N),
                )
            })
    }

    pub(crate) fn header(&self) -> ObjectHeader {
        ObjectHeader::new(
            TYPE_ASYMMETRIC_KEY,
            self.id.clone(),
            &self.name,
            &self.description,
        )
    }

    /// Serialized size.
    pub fn encoded_len(&self) -> usize {
        self.header().encoded_len() + 1 + 1 + 4 + self.material.len()
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        self.header().encode(buf);
        buf.put_u8(self.kind.wire_code());
        buf.put_u8(self.private as u8);
        serializable::put_blob(buf, self.material.as_bytes());
    }

    pub fn decode(buf: &mut &[u8]) -> CryptoResult<Self> {
        let header = ObjectHeader::decode(buf, TYPE_ASYMMETRIC_KEY)?;
        let kind = KeyKind::from_wire_code(serializable::get_u8(buf)?)?;
        let private = match serializable::get_u8(buf)? {
            0 => false,
            1 => true,
            other => {
                return Err(CryptoError::serialization_failure(&format!(
                    "invalid private flag {}",
                    other
                )))
            }
        };
        let material = serializable::get_blob(buf)?;
        if material.is_empty() {
            return Err(CryptoError::serialization_failure(
                "asymmetric key material must not be empty",
            ));
        }
        Ok(Self {
            id: header.id,
            name: header.name,
            description: header.description,
            kind,
            private,
            material: SecureBytes::from(material),
        })
    }
}

impl PartialEq for AsymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.description == other.description
            && self.kind == other.kind
            && self.private == other.private
            && utils::constant_time_eq(self.as_bytes(), other.as_bytes())
    }
}

impl Eq for AsymmetricKey {}

impl std::fmt::Debug for AsymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsymmetricKey")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("private", &self.private)
            .finish_non_exhaustive()
    }
}
