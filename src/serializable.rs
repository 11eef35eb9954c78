/*!
 * Serialization Substrate
 *
 * Every persisted object carries a common header of `(type tag, version,
 * id, name, description)`; the `(type tag, version)` pair uniquely selects
 * the decoder for the bytes that follow. All integers on the wire are
 * big-endian and all variable-length fields are `u32` length-prefixed.
 *
 * Reading never panics on truncated input: each accessor checks the
 * remaining length and surfaces [`CryptoError::SerializationFailure`].
 */

use bytes::{Buf, BufMut};

use crate::error::{CryptoError, CryptoResult};
use crate::id::Id;

/// Wire type tag of [`crate::keys::SymmetricKey`].
pub const TYPE_SYMMETRIC_KEY: u8 = 1;
/// Wire type tag of [`crate::keys::AsymmetricKey`].
pub const TYPE_ASYMMETRIC_KEY: u8 = 2;
/// Wire type tag of [`crate::keys::Params`].
pub const TYPE_PARAMS: u8 = 3;
/// Wire type tag of [`crate::keyring::KeyRing`].
pub const TYPE_KEY_RING: u8 = 4;

/// Current serialization version shared by all object types.
pub const SERIALIZATION_VERSION: u8 = 1;

/// The `(type tag, version, id, name, description)` header common to all
/// persisted objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    pub type_tag: u8,
    pub version: u8,
    pub id: Id,
    pub name: String,
    pub description: String,
}

impl ObjectHeader {
    pub fn new(type_tag: u8, id: Id, name: &str, description: &str) -> Self {
        Self {
            type_tag,
            version: SERIALIZATION_VERSION,
            id,
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    /// Serialized size of this header.
    pub fn encoded_len(&self) -> usize {
        1 + 1 + Id::SIZE + 4 + self.name.len() + 4 + self.description.len()
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.put_u8(self.type_tag);
        buf.put_u8(self.version);
        buf.put_slice(self.id.as_bytes());
        put_string(buf, &self.name);
        put_string(buf, &self.description);
    }

    /// Decode a header, requiring the given type tag.
    ///
    /// A tag or version mismatch means the bytes were produced by a
    /// different type or a different format revision; both are decode
    /// failures, not recoverable conditions.
    pub fn decode(buf: &mut &[u8], expected_tag: u8) -> CryptoResult<Self> {
        let type_tag = get_u8(buf)?;
        if type_tag != expected_tag {
            return Err(CryptoError::serialization_failure(&format!(
                "expected type tag {}, found {}",
                expected_tag, type_tag
            )));
        }
        let version = get_u8(buf)?;
        if version != SERIALIZATION_VERSION {
            return Err(CryptoError::serialization_failure(&format!(
                "unsupported version {} for type tag {}",
                version, type_tag
            )));
        }
        let id = get_id(buf)?;
        let name = get_string(buf)?;
        let description = get_string(buf)?;
        Ok(Self {
            type_tag,
            version,
            id,
            name,
            description,
        })
    }
}

fn check_remaining(buf: &&[u8], needed: usize) -> CryptoResult<()> {
    if buf.remaining() < needed {
        Err(CryptoError::serialization_failure(&format!(
            "truncated input: needed {} bytes, {} remain",
            needed,
            buf.remaining()
        )))
    } else {
        Ok(())
    }
}

pub(crate) fn get_u8(buf: &mut &[u8]) -> CryptoResult<u8> {
    check_remaining(buf, 1)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_u16(buf: &mut &[u8]) -> CryptoResult<u16> {
    check_remaining(buf, 2)?;
    Ok(buf.get_u16())
}

pub(crate) fn get_u32(buf: &mut &[u8]) -> CryptoResult<u32> {
    check_remaining(buf, 4)?;
    Ok(buf.get_u32())
}

pub(crate) fn get_id(buf: &mut &[u8]) -> CryptoResult<Id> {
    check_remaining(buf, Id::SIZE)?;
    let mut raw = [0u8; Id::SIZE];
    buf.copy_to_slice(&mut raw);
    Ok(Id::from_raw(raw))
}

/// Read a `u32`-length-prefixed byte blob.
pub(crate) fn get_blob(buf: &mut &[u8]) -> CryptoResult<Vec<u8>> {
    let len = get_u32(buf)? as usize;
    check_remaining(buf, len)?;
    let mut blob = vec![0u8; len];
    buf.copy_to_slice(&mut blob);
    Ok(blob)
}

/// Read exactly `len` raw bytes (length already known from context).
pub(crate) fn get_blob_of(buf: &mut &[u8], len: usize) -> CryptoResult<Vec<u8>> {
    check_remaining(buf, len)?;
    let mut blob = vec![0u8; len];
    buf.copy_to_slice(&mut blob);
    Ok(blob)
}

/// Read a `u32`-length-prefixed UTF-8 string.
pub(crate) fn get_string(buf: &mut &[u8]) -> CryptoResult<String> {
    let blob = get_blob(buf)?;
    String::from_utf8(blob)
        .map_err(|_| CryptoError::serialization_failure("string field is not valid UTF-8"))
}

pub(crate) fn put_blob(buf: &mut Vec<u8>, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

pub(crate) fn put_string(buf: &mut Vec<u8>, s: &str) {
    put_blob(buf, s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let header = ObjectHeader::new(TYPE_PARAMS, Id::random(), "session", "ephemeral params");
        let mut wire = Vec::new();
        header.encode(&mut wire);
        assert_eq!(wire.len(), header.encoded_len());

        let mut reader = wire.as_slice();
        let decoded = ObjectHeader::decode(&mut reader, TYPE_PARAMS).unwrap();
        assert_eq!(decoded, header);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_header_rejects_wrong_tag() {
        let header = ObjectHeader::new(TYPE_PARAMS, Id::random(), "", "");
        let mut wire = Vec::new();
        header.encode(&mut wire);

        let mut reader = wire.as_slice();
        assert!(ObjectHeader::decode(&mut reader, TYPE_KEY_RING).is_err());
    }

    #[test]
    fn test_truncated_string_fails() {
        let mut wire = Vec::new();
        wire.put_u32(10);
        wire.put_slice(b"short");
        let mut reader = wire.as_slice();
        assert!(get_string(&mut reader).is_err());
    }

    #[test]
    fn test_integers_are_big_endian() {
        let mut wire = Vec::new();
        wire.put_u32(0x0102_0304);
        assert_eq!(wire, [1, 2, 3, 4]);
        let mut reader = wire.as_slice();
        assert_eq!(get_u32(&mut reader).unwrap(), 0x0102_0304);
    }
}
