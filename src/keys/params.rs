use bytes::BufMut;

use crate::error::{CryptoError, CryptoResult};
use crate::id::Id;
use crate::keys::asymmetric::{AsymmetricKey, KeyKind};
use crate::serializable::{self, ObjectHeader, TYPE_PARAMS};

/// Named curve selector for EC parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedCurve {
    P256,
}

impl NamedCurve {
    fn wire_code(self) -> u8 {
        match self {
            NamedCurve::P256 => 1,
        }
    }

    fn from_wire_code(code: u8) -> CryptoResult<Self> {
        match code {
            1 => Ok(NamedCurve::P256),
            _ => Err(CryptoError::serialization_failure(&format!(
                "unknown named curve code {}",
                code
            ))),
        }
    }
}

/// Immutable algorithm parameters sufficient to generate a key pair.
///
/// Modern curve algorithms carry all their parameters in the algorithm
/// choice itself, so `Params` reduces to a kind tag (plus the curve name
/// for EC). It exists as a first-class ring citizen so that rings can
/// distribute *how* to make keys separately from the keys themselves.
#[derive(Debug, PartialEq, Eq)]
pub struct Params {
    id: Id,
    name: String,
    description: String,
    kind: KeyKind,
    curve: Option<NamedCurve>,
}

impl Params {
    /// Create parameters for the given kind.
    ///
    /// `Ec` requires a curve; `Ed25519` and `X25519` forbid one.
    pub fn new(
        kind: KeyKind,
        curve: Option<NamedCurve>,
        name: &str,
        description: &str,
    ) -> CryptoResult<Self> {
        match (kind, curve) {
            (KeyKind::Ed25519, None) | (KeyKind::X25519, None) | (KeyKind::Ec, Some(_)) => {}
            (KeyKind::Ec, None) => {
                return Err(CryptoError::invalid_argument(
                    "curve",
                    "EC parameters require a named curve",
                ))
            }
            _ => {
                return Err(CryptoError::invalid_argument(
                    "kind",
                    &format!("no parameter set exists for {}", kind),
                ))
            }
        }
        Ok(Self {
            id: Id::random(),
            name: name.to_string(),
            description: description.to_string(),
            kind,
            curve,
        })
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

    pub fn curve(&self) -> Option<NamedCurve> {
        self.curve
    }

    /// Generate a fresh private key whose algorithm matches these
    /// parameters.
    pub fn create_key(&self, name: &str, description: &str) -> CryptoResult<AsymmetricKey> {
        AsymmetricKey::generate(self.kind, name, description)
    }

    pub(crate) fn header(&self) -> ObjectHeader {
        ObjectHeader::new(TYPE_PARAMS, self.id.clone(), &self.name, &self.description)
    }

    /// Serialized size.
    pub fn encoded_len(&self) -> usize {
        self.header().encoded_len() + 1 + 1
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        self.header().encode(buf);
        buf.put_u8(match self.kind {
            KeyKind::Ed25519 => 7,
            KeyKind::X25519 => 8,
            KeyKind::Ec => 3,
            // Construction rejects every other kind.
            _ => unreachable!("params kind validated at construction"),
        });
        buf.put_u8(self.curve.map_or(0, NamedCurve::wire_code));
    }

    pub fn decode(buf: &mut &[u8]) -> CryptoResult<Self> {
        let header = ObjectHeader::decode(buf, TYPE_PARAMS)?;
        let kind = match serializable::get_u8(buf)? {
            3 => KeyKind::Ec,
            7 => KeyKind::Ed25519,
            8 => KeyKind::X25519,
            other => {
                return Err(CryptoError::serialization_failure(&format!(
                    "unknown params kind code {}",
                    other
                )))
            }
        };
        let curve = match serializable::get_u8(buf)? {
            0 => None,
            code => Some(NamedCurve::from_wire_code(code)?),
        };
        match (kind, curve) {
            (KeyKind::Ec, Some(_)) | (KeyKind::Ed25519, None) | (KeyKind::X25519, None) => {}
            _ => {
                return Err(CryptoError::serialization_failure(
                    "params kind and curve are inconsistent",
                ))
            }
        }
        Ok(Self {
            id: header.id,
            name: header.name,
            description: header.description,
            kind,
            curve,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_rules() {
        assert!(Params::new(KeyKind::Ed25519, None, "", "").is_ok());
        assert!(Params::new(KeyKind::X25519, None, "", "").is_ok());
        assert!(Params::new(KeyKind::Ec, Some(NamedCurve::P256), "", "").is_ok());
        assert!(Params::new(KeyKind::Ec, None, "", "").is_err());
        assert!(Params::new(KeyKind::Ed25519, Some(NamedCurve::P256), "", "").is_err());
        assert!(Params::new(KeyKind::Rsa, None, "", "").is_err());
    }

    #[test]
    fn test_create_key_matches_kind() {
        let params = Params::new(KeyKind::X25519, None, "kx", "").unwrap();
        let key = params.create_key("kx key", "").unwrap();
        assert_eq!(key.kind(), KeyKind::X25519);
        assert!(key.is_private());
    }

    #[test]
    fn test_wire_round_trip() {
        let params = Params::new(KeyKind::Ec, Some(NamedCurve::P256), "auth", "p256").unwrap();
        let mut wire = Vec::new();
        params.encode(&mut wire);
        assert_eq!(wire.len(), params.encoded_len());

        let mut reader = wire.as_slice();
        let decoded = Params::decode(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(decoded.id(), params.id());
        assert_eq!(decoded.kind(), KeyKind::Ec);
        assert_eq!(decoded.curve(), Some(NamedCurve::P256));
    }
}
