//! Token engine configuration.
//!
//! Holds the serializable settings: issuer, per-kind lifetimes and code
//! generation parameters. Key material and formats live in
//! [`TokenServerOptions`](crate::server::TokenServerOptions).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::TokenServerError;
use crate::types::TokenUsage;

/// Minimum number of random bytes in an authorization code key (256 bits).
pub const MIN_CODE_KEY_BYTES: usize = 32;

/// Longest accepted token lifetime (10 years).
pub const MAX_LIFETIME: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

/// Token engine configuration.
///
/// # Example (TOML)
///
/// ```toml
/// issuer = "https://fhir.example.com"
/// authorization_code_lifetime = "5m"
/// access_token_lifetime = "1h"
/// identity_token_lifetime = "20m"
/// refresh_token_lifetime = "14d"
/// use_sliding_expiration = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenServerConfig {
    /// Issuer URL (used in the `iss` claim).
    /// Must be absolute, without query or fragment.
    pub issuer: String,

    /// Authorization code lifetime.
    /// Codes should be short-lived for security.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Identity token lifetime.
    #[serde(with = "humantime_serde")]
    pub identity_token_lifetime: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Issue a new refresh token on every refresh token grant.
    pub use_sliding_expiration: bool,

    /// Random bytes per authorization code key.
    pub code_key_bytes: usize,
}

impl Default for TokenServerConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            authorization_code_lifetime: Duration::from_secs(5 * 60), // 5 minutes
            access_token_lifetime: Duration::from_secs(3600),         // 1 hour
            identity_token_lifetime: Duration::from_secs(20 * 60),    // 20 minutes
            refresh_token_lifetime: Duration::from_secs(14 * 24 * 3600), // 14 days
            use_sliding_expiration: true,
            code_key_bytes: MIN_CODE_KEY_BYTES,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration source could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<ConfigError> for TokenServerError {
    fn from(err: ConfigError) -> Self {
        TokenServerError::configuration(err.to_string())
    }
}

impl TokenServerConfig {
    /// Creates a configuration with default lifetimes for the given issuer.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML and any error
    /// reported by [`validate`](Self::validate).
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the configured lifetime for a kind.
    #[must_use]
    pub fn lifetime(&self, kind: TokenUsage) -> Duration {
        match kind {
            TokenUsage::AuthorizationCode => self.authorization_code_lifetime,
            TokenUsage::AccessToken => self.access_token_lifetime,
            TokenUsage::IdentityToken => self.identity_token_lifetime,
            TokenUsage::RefreshToken => self.refresh_token_lifetime,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the issuer is empty, and
    /// `ConfigError::InvalidValue` if:
    /// - The issuer is not an absolute URL, or has a query or fragment
    /// - A lifetime is zero or longer than [`MAX_LIFETIME`]
    /// - `code_key_bytes` is below 32
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }

        let issuer = Url::parse(&self.issuer).map_err(|e| {
            ConfigError::InvalidValue(format!("issuer must be an absolute URL: {e}"))
        })?;
        if issuer.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue(format!(
                "issuer must be an absolute URL: '{}'",
                self.issuer
            )));
        }
        if issuer.query().is_some() || issuer.fragment().is_some() {
            return Err(ConfigError::InvalidValue(
                "issuer must not contain a query or fragment".to_string(),
            ));
        }

        for kind in TokenUsage::ALL {
            if self.lifetime(kind).is_zero() {
                return Err(ConfigError::InvalidValue(format!(
                    "{} lifetime must be > 0",
                    kind
                )));
            }
            if self.lifetime(kind) > MAX_LIFETIME {
                return Err(ConfigError::InvalidValue(format!(
                    "{} lifetime must not exceed {} days",
                    kind,
                    MAX_LIFETIME.as_secs() / 86_400
                )));
            }
        }

        if self.code_key_bytes < MIN_CODE_KEY_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "code_key_bytes must be >= {}",
                MIN_CODE_KEY_BYTES
            )));
        }

        Ok(())
    }
}
