use rand::{rngs::OsRng, RngCore};

use crate::error::{CryptoError, CryptoResult};

/// Generate cryptographically secure random bytes of the specified length
///
/// This function uses the operating system's secure random number generator
/// (OsRng) to generate cryptographically secure random bytes. It is used for
/// keys, initialization vectors, and identifier material throughout the
/// library.
///
/// # Arguments
///
/// * `length` - The number of random bytes to generate
///
/// # Returns
///
/// A vector containing the random bytes
pub fn random_bytes(length: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Fill the given buffer with cryptographically secure random bytes.
pub fn fill_random(buffer: &mut [u8]) {
    OsRng.fill_bytes(buffer);
}

/// Perform constant-time comparison of two byte slices to prevent timing attacks
///
/// The time taken is independent of the content of the slices, which matters
/// when comparing MAC tags, signatures, or derived keys where timing
/// information could leak secrets.
///
/// # Arguments
///
/// * `a` - First byte slice
/// * `b` - Second byte slice
///
/// # Returns
///
/// * `true` if the slices are equal
/// * `false` if the slices differ in length or content
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// Convert a byte array to a lowercase hexadecimal string.
pub fn to_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Convert a hexadecimal string to a byte array.
///
/// # Returns
///
/// * `Ok(Vec<u8>)` - The parsed bytes
/// * `Err(CryptoError)` - If the string has an odd length or contains
///   invalid characters
pub fn from_hex(hex_str: &str) -> CryptoResult<Vec<u8>> {
    hex::decode(hex_str)
        .map_err(|e| CryptoError::invalid_argument("hex_str", &e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes_length() {
        let bytes = random_bytes(48);
        assert_eq!(bytes.len(), 48);
    }

    #[test]
    fn test_random_bytes_are_distinct() {
        // 32 random bytes colliding would indicate a broken entropy source.
        assert_ne!(random_bytes(32), random_bytes(32));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"same bytes", b"same bytes"));
        assert!(!constant_time_eq(b"same bytes", b"diff bytes"));
        assert!(!constant_time_eq(b"short", b"longer slice"));
    }

    #[test]
    fn test_hex_round_trip() {
        let data = vec![0x00, 0x01, 0xde, 0xad, 0xbe, 0xef, 0xff];
        let encoded = to_hex(&data);
        assert_eq!(encoded, "0001deadbeefff");
        assert_eq!(from_hex(&encoded).unwrap(), data);
    }

    #[test]
    fn test_from_hex_rejects_odd_length() {
        assert!(from_hex("abc").is_err());
    }
}
