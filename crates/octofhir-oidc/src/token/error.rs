//! Errors raised by security token handlers.
//!
//! Handlers report two broad classes: the presented token is bad
//! ([`is_validation_error`](SecurityTokenError::is_validation_error)), or the
//! server's own key material is unusable
//! ([`is_key_error`](SecurityTokenError::is_key_error)). The orchestrator
//! turns the first into a verbose diagnostic and the second into an error one.

/// Security token handler errors.
#[derive(Debug, thiserror::Error)]
pub enum SecurityTokenError {
    /// The token could not be written (serialization, key wrapping, encryption).
    #[error("Token could not be written: {message}")]
    EncodingError { message: String },

    /// The token is malformed or uses an unexpected algorithm.
    #[error("Malformed token: {message}")]
    DecodingError { message: String },

    /// No candidate key verified the signature.
    #[error("Token signature verification failed")]
    InvalidSignature,

    /// A registered claim (`iss`, `exp`, ...) is missing or does not match.
    #[error("Token claim rejected: {message}")]
    InvalidClaims { message: String },

    /// The JWE envelope could not be opened.
    #[error("Token decryption failed: {message}")]
    DecryptionError { message: String },

    /// No configured credential matches the token header.
    #[error("No credential matches key '{kid}'")]
    KeyNotFound { kid: String },

    /// Key pair generation failed.
    #[error("Key generation failed: {message}")]
    KeyGenerationError { message: String },

    /// Configured key material is unusable.
    #[error("Unusable key material: {message}")]
    InvalidKey { message: String },
}

impl SecurityTokenError {
    /// Creates an encoding error.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a decoding error.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates an invalid claims error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a decryption error.
    #[must_use]
    pub fn decryption_error(message: impl Into<String>) -> Self {
        Self::DecryptionError {
            message: message.into(),
        }
    }

    /// Creates a key not found error.
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    /// Creates a key generation error.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates an invalid key error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` when the presented token is at fault.
    ///
    /// An unknown `kid` counts as a bad token: clients can put anything there.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::DecodingError { .. }
                | Self::InvalidSignature
                | Self::InvalidClaims { .. }
                | Self::DecryptionError { .. }
                | Self::KeyNotFound { .. }
        )
    }

    /// Returns `true` for key lookup, generation and key material failures.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound { .. } | Self::KeyGenerationError { .. } | Self::InvalidKey { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for SecurityTokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::decoding_error(err.to_string()),
            ErrorKind::ExpiredSignature
            | ErrorKind::ImmatureSignature
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}
