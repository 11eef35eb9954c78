//! Secure Memory Handling Utilities
//!
//! This module provides containers for sensitive data, including securely
//! zeroing memory when it is released and a scope helper that guarantees
//! zeroization even on early return or panic.
//!
//! The primary goal of these utilities is to minimize the exposure of
//! sensitive cryptographic material (key bytes, key-derivation
//! intermediates, decrypted key-ring plaintext) in memory after use.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A byte container for sensitive data that is automatically zeroed when
/// dropped, preventing the data from remaining in memory.
///
/// SecureBytes is used wherever the library holds secret material outside
/// a strongly typed key object: key-derivation buffers, shared secrets in
/// flight, and the plaintext of a decrypted key ring.
///
/// # Security Properties
///
/// 1. Automatically zeroes memory when dropped
/// 2. Never exposes its contents through `Debug`
/// 3. Clones zeroize independently
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecureBytes {
    bytes: Vec<u8>,
}

impl SecureBytes {
    /// Create a new SecureBytes holding a copy of the given data.
    pub fn new(data: &[u8]) -> Self {
        Self {
            bytes: data.to_vec(),
        }
    }

    /// Create an empty SecureBytes with the given capacity.
    ///
    /// Useful when accumulating derived material over multiple operations.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Read-only view of the protected bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable view of the protected bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Append data to the end of the buffer.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Zero and remove all data, preserving the allocated capacity.
    pub fn clear(&mut self) {
        self.bytes.zeroize();
        self.bytes.clear();
    }

    /// Number of bytes currently stored.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// `true` if the buffer contains no data.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for SecureBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl From<&[u8]> for SecureBytes {
    fn from(data: &[u8]) -> Self {
        Self::new(data)
    }
}

impl AsRef<[u8]> for SecureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureBytes")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Run a closure over sensitive data and zeroize the data afterwards.
///
/// The zeroization happens when the guard goes out of scope, so it is
/// guaranteed:
/// - after the closure completes,
/// - if the closure returns early,
/// - if the closure panics.
///
/// # Example
///
/// ```
/// use keyvault::secure_memory::with_secure_scope;
///
/// let mut seed = [0x42u8; 32];
/// let sum = with_secure_scope(&mut seed, |s| {
///     s.iter().map(|b| *b as u32).sum::<u32>()
/// });
/// assert_eq!(sum, 0x42 * 32);
/// assert_eq!(seed, [0u8; 32]);
/// ```
pub fn with_secure_scope<T, R, F>(data: &mut T, f: F) -> R
where
    T: Zeroize,
    F: FnOnce(&mut T) -> R,
{
    struct Guard<'a, T: Zeroize>(&'a mut T);

    impl<T: Zeroize> Drop for Guard<'_, T> {
        fn drop(&mut self) {
            self.0.zeroize();
        }
    }

    let mut guard = Guard(data);
    // The guard borrows data for the whole call; f runs against the same
    // allocation that gets wiped.
    let result = f(&mut *guard.0);
    drop(guard);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_bytes_basic() {
        let mut bytes = SecureBytes::new(&[1, 2, 3]);
        assert_eq!(bytes.len(), 3);
        assert_eq!(bytes.as_bytes(), &[1, 2, 3]);
        bytes.extend_from_slice(&[4, 5]);
        assert_eq!(bytes.as_bytes(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_secure_bytes_clear() {
        let mut bytes = SecureBytes::new(&[9; 16]);
        bytes.clear();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_debug_does_not_leak() {
        let bytes = SecureBytes::new(b"top secret");
        let rendered = format!("{:?}", bytes);
        assert!(!rendered.contains("top secret"));
        assert!(rendered.contains("len"));
    }

    #[test]
    fn test_with_secure_scope_zeroizes() {
        let mut key = vec![0xffu8; 8];
        let first = with_secure_scope(&mut key, |k| k[0]);
        assert_eq!(first, 0xff);
        assert!(key.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_with_secure_scope_zeroizes_on_panic() {
        let mut key = [0xaau8; 4];
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            with_secure_scope(&mut key, |_| panic!("boom"));
        }));
        assert!(caught.is_err());
        assert_eq!(key, [0u8; 4]);
    }
}
