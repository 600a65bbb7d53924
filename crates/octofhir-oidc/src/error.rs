//! Token engine error types.
//!
//! Expected protocol rejections (unknown code, expired ticket, wrong kind,
//! bad signature) are never reported through these types: the engine answers
//! them with `Ok(None)`. The variants below describe faults that callers must
//! not mask.

use std::fmt;

use crate::notifications::NotificationError;

/// Errors surfaced by the token lifecycle engine.
#[derive(Debug, thiserror::Error)]
pub enum TokenServerError {
    /// A host notification handler failed. The host error is carried unchanged.
    #[error(transparent)]
    Notification(#[from] NotificationError),

    /// The ticket handed to the engine cannot be turned into tokens.
    #[error("Invalid ticket: {message}")]
    InvalidTicket {
        /// Description of why the ticket was rejected.
        message: String,
    },

    /// Signing or encrypting a self-contained token failed.
    #[error("Signing error: {message}")]
    Signing {
        /// Description of the signing failure.
        message: String,
    },

    /// Protecting a ticket with the opaque format failed.
    #[error("Protection error: {message}")]
    Protection {
        /// Description of the protection failure.
        message: String,
    },

    /// The single-use code store failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The engine configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl TokenServerError {
    /// Creates a new `InvalidTicket` error.
    #[must_use]
    pub fn invalid_ticket(message: impl Into<String>) -> Self {
        Self::InvalidTicket {
            message: message.into(),
        }
    }

    /// Creates a new `Signing` error.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    /// Creates a new `Protection` error.
    #[must_use]
    pub fn protection(message: impl Into<String>) -> Self {
        Self::Protection {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the error originates in host-supplied code.
    #[must_use]
    pub fn is_host_fault(&self) -> bool {
        matches!(self, Self::Notification(_))
    }

    /// Returns `true` if this is a cryptographic failure during issuance.
    #[must_use]
    pub fn is_crypto_error(&self) -> bool {
        matches!(self, Self::Signing { .. } | Self::Protection { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Notification(_) => ErrorCategory::Host,
            Self::InvalidTicket { .. } => ErrorCategory::Validation,
            Self::Signing { .. } => ErrorCategory::Cryptography,
            Self::Protection { .. } => ErrorCategory::Cryptography,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 error code an endpoint should answer with.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidTicket { .. } => "invalid_request",
            _ => "server_error",
        }
    }
}

/// Categories of engine errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Faults raised by host notification handlers.
    Host,
    /// Ticket validation errors.
    Validation,
    /// Signing, encryption or protection faults.
    Cryptography,
    /// Code store errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Validation => write!(f, "validation"),
            Self::Cryptography => write!(f, "cryptography"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
