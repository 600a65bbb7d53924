//! Runtime options of the token server.

use std::sync::Arc;

use rand::RngCore;

use crate::config::{ConfigError, TokenServerConfig};
use crate::crypto::encryption::KEY_SIZE;
use crate::crypto::{EncryptingCredentials, SigningCredentials};
use crate::token::{
    AesGcmTicketProtector, JwtSecurityTokenHandler, SecurityTokenHandler, TicketProtector,
};
use crate::types::TokenUsage;

/// Serialization strategy of one token kind.
///
/// Tokens are self-contained when a handler is set and opaque otherwise.
/// Authorization codes are always opaque.
#[derive(Clone)]
pub struct TokenFormat {
    /// Opaque format.
    pub protector: Arc<dyn TicketProtector>,
    /// Self-contained format.
    pub handler: Option<Arc<dyn SecurityTokenHandler>>,
}

impl TokenFormat {
    /// Opaque tokens produced by `protector`.
    #[must_use]
    pub fn opaque(protector: Arc<dyn TicketProtector>) -> Self {
        Self {
            protector,
            handler: None,
        }
    }

    /// Self-contained tokens produced by `handler`.
    #[must_use]
    pub fn self_contained(
        protector: Arc<dyn TicketProtector>,
        handler: Arc<dyn SecurityTokenHandler>,
    ) -> Self {
        Self {
            protector,
            handler: Some(handler),
        }
    }

    /// Returns `true` when a handler is configured.
    #[must_use]
    pub fn is_self_contained(&self) -> bool {
        self.handler.is_some()
    }
}

/// Per-kind format table.
#[derive(Clone)]
pub struct TokenFormats {
    /// Authorization codes.
    pub authorization_code: TokenFormat,
    /// Access tokens.
    pub access_token: TokenFormat,
    /// Identity tokens.
    pub identity_token: TokenFormat,
    /// Refresh tokens.
    pub refresh_token: TokenFormat,
}

impl TokenFormats {
    /// Default formats with protectors derived from `key`.
    ///
    /// Codes, access tokens and refresh tokens are opaque; identity tokens
    /// are JWTs. Each kind gets its own protector purpose, so an opaque value
    /// of one kind never unprotects as another.
    #[must_use]
    pub fn with_key(key: [u8; KEY_SIZE]) -> Self {
        let protector = |kind| -> Arc<dyn TicketProtector> {
            Arc::new(AesGcmTicketProtector::for_kind(key, kind))
        };

        Self {
            authorization_code: TokenFormat::opaque(protector(TokenUsage::AuthorizationCode)),
            access_token: TokenFormat::opaque(protector(TokenUsage::AccessToken)),
            identity_token: TokenFormat::self_contained(
                protector(TokenUsage::IdentityToken),
                Arc::new(JwtSecurityTokenHandler::new()),
            ),
            refresh_token: TokenFormat::opaque(protector(TokenUsage::RefreshToken)),
        }
    }

    /// Default formats with a random protection key.
    ///
    /// Tokens do not survive a restart; use [`with_key`](Self::with_key)
    /// with a persisted key in production.
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self::with_key(key)
    }

    /// Returns the format of a kind.
    #[must_use]
    pub fn get(&self, kind: TokenUsage) -> &TokenFormat {
        match kind {
            TokenUsage::AuthorizationCode => &self.authorization_code,
            TokenUsage::AccessToken => &self.access_token,
            TokenUsage::IdentityToken => &self.identity_token,
            TokenUsage::RefreshToken => &self.refresh_token,
        }
    }

    /// Returns the format of a kind, mutably.
    pub fn get_mut(&mut self, kind: TokenUsage) -> &mut TokenFormat {
        match kind {
            TokenUsage::AuthorizationCode => &mut self.authorization_code,
            TokenUsage::AccessToken => &mut self.access_token,
            TokenUsage::IdentityToken => &mut self.identity_token,
            TokenUsage::RefreshToken => &mut self.refresh_token,
        }
    }
}

impl Default for TokenFormats {
    fn default() -> Self {
        Self::generate()
    }
}

/// Runtime options: validated configuration plus key material and formats.
#[derive(Clone)]
pub struct TokenServerOptions {
    /// Validated configuration.
    pub config: TokenServerConfig,
    /// Signing credentials, in preference order. The first one signs new tokens.
    pub signing_credentials: Vec<Arc<SigningCredentials>>,
    /// Credential encrypting self-contained tokens.
    pub encrypting_credentials: Option<Arc<EncryptingCredentials>>,
    /// Per-kind formats.
    pub formats: TokenFormats,
}

impl TokenServerOptions {
    /// Creates options from a configuration, with default formats and no keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: TokenServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            signing_credentials: Vec::new(),
            encrypting_credentials: None,
            formats: TokenFormats::generate(),
        })
    }

    /// Appends a signing credential.
    #[must_use]
    pub fn with_signing_credentials(mut self, credentials: SigningCredentials) -> Self {
        self.signing_credentials.push(Arc::new(credentials));
        self
    }

    /// Sets the encrypting credential.
    #[must_use]
    pub fn with_encrypting_credentials(mut self, credentials: EncryptingCredentials) -> Self {
        self.encrypting_credentials = Some(Arc::new(credentials));
        self
    }

    /// Replaces the format table.
    #[must_use]
    pub fn with_formats(mut self, formats: TokenFormats) -> Self {
        self.formats = formats;
        self
    }

    /// Replaces the format of one kind.
    #[must_use]
    pub fn with_format(mut self, kind: TokenUsage, format: TokenFormat) -> Self {
        *self.formats.get_mut(kind) = format;
        self
    }

    /// Returns the credential signing new tokens.
    #[must_use]
    pub fn default_signing_credentials(&self) -> Option<&Arc<SigningCredentials>> {
        self.signing_credentials.first()
    }
}
