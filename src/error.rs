/*!
 * Error Handling for the Key Vault Library
 *
 * Provides the error taxonomy shared by every subsystem: argument
 * validation, cipher-suite resolution, envelope parsing, authentication
 * failures, and serialization of key rings and keys.
 */

use thiserror::Error;

use crate::id::Id;

/// Comprehensive error type for all key-vault operations.
///
/// Lookup misses are *not* errors: getters return `Option` and reserve
/// `CryptoError` for conditions that make the requested operation
/// impossible.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument { argument: String, reason: String },

    #[error("unrecognized cipher suite component: {component}")]
    BadCipherSuite { component: String },

    #[error("an object with id {id} already exists in the ring")]
    DuplicateId { id: Id },

    /// Decryption failed authentication.
    ///
    /// Deliberately carries no detail: whether the external MAC, the AEAD
    /// tag, or the padding was at fault must not be observable.
    #[error("ciphertext failed authentication")]
    AuthFailed,

    #[error("invalid ciphertext envelope: {reason}")]
    InvalidEnvelope { reason: String },

    #[error("i/o failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("cryptographic primitive failed during {operation}")]
    PrimitiveFailure { operation: String },

    #[error("serialization failure: {reason}")]
    SerializationFailure { reason: String },
}

/// Convenience constructors for common error shapes.
impl CryptoError {
    pub fn invalid_argument(argument: &str, reason: &str) -> Self {
        CryptoError::InvalidArgument {
            argument: argument.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn bad_cipher_suite(component: &str) -> Self {
        CryptoError::BadCipherSuite {
            component: component.to_string(),
        }
    }

    pub fn invalid_envelope(reason: &str) -> Self {
        CryptoError::InvalidEnvelope {
            reason: reason.to_string(),
        }
    }

    pub fn primitive_failure(operation: &str) -> Self {
        CryptoError::PrimitiveFailure {
            operation: operation.to_string(),
        }
    }

    pub fn serialization_failure(reason: &str) -> Self {
        CryptoError::SerializationFailure {
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for key-vault operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let error = CryptoError::invalid_argument("plaintext", "must not be empty");
        assert!(error.to_string().contains("plaintext"));
        assert!(error.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_auth_failure_is_opaque() {
        // The rendered message must not distinguish which check failed.
        assert_eq!(
            CryptoError::AuthFailed.to_string(),
            "ciphertext failed authentication"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: CryptoError = io.into();
        assert!(matches!(error, CryptoError::IoFailure(_)));
    }
}
