//! Extensibility notifications.
//!
//! Every serialize and deserialize operation calls one host hook before
//! running its default logic. A hook receives an immutable context holding
//! the engine defaults and answers with an explicit outcome:
//!
//! - a literal token (serialize) or ticket (deserialize), which the engine
//!   returns as-is, skipping its own logic
//! - updated parameters, which the engine continues with
//!
//! Hook errors are never masked: they reach the caller unchanged as
//! [`TokenServerError::Notification`](crate::TokenServerError::Notification).
//!
//! # Example
//!
//! ```ignore
//! struct ShortLivedAccessTokens;
//!
//! #[async_trait]
//! impl TokenNotifications for ShortLivedAccessTokens {
//!     async fn serialize_access_token(
//!         &self,
//!         context: &SerializeContext<'_>,
//!     ) -> Result<SerializeOutcome, NotificationError> {
//!         let mut parameters = context.parameters.clone();
//!         parameters.ticket.properties.expires_at = None;
//!         parameters
//!             .ticket
//!             .properties
//!             .set_lifetime(TokenUsage::AccessToken, Duration::from_secs(300));
//!         Ok(SerializeOutcome::Continue(parameters))
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::crypto::{EncryptingCredentials, SigningCredentials};
use crate::token::{SecurityTokenHandler, TicketProtector};
use crate::types::{AuthenticationTicket, OpenIdConnectRequest, OpenIdConnectResponse, TokenUsage};

/// Error type for notification handlers.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Handler execution failed with a message.
    #[error("Notification handler failed: {0}")]
    Execution(String),

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NotificationError {
    /// Create an execution error from a string.
    pub fn execution(msg: impl Into<String>) -> Self {
        NotificationError::Execution(msg.into())
    }
}

// ============================================================================
// Serialize
// ============================================================================

/// Overridable inputs of a serialize operation.
#[derive(Clone)]
pub struct SerializeParameters {
    /// Working ticket, already carrying the kind tag and timestamps.
    pub ticket: AuthenticationTicket,
    /// `iss` value for self-contained tokens.
    pub issuer: String,
    /// Opaque format.
    pub protector: Arc<dyn TicketProtector>,
    /// Self-contained format. `None` selects the opaque format.
    pub handler: Option<Arc<dyn SecurityTokenHandler>>,
    /// Signing credential for self-contained tokens.
    pub signing_credentials: Option<Arc<SigningCredentials>>,
    /// Encrypting credential for self-contained tokens.
    pub encrypting_credentials: Option<Arc<EncryptingCredentials>>,
}

/// Context handed to serialize hooks.
pub struct SerializeContext<'a> {
    /// Kind being serialized.
    pub kind: TokenUsage,
    /// Protocol request being answered.
    pub request: &'a OpenIdConnectRequest,
    /// Response built so far (earlier artifacts of the same response).
    pub response: &'a OpenIdConnectResponse,
    /// Engine defaults.
    pub parameters: SerializeParameters,
}

/// Result of a serialize hook.
pub enum SerializeOutcome {
    /// Use this token and skip the default logic.
    Token(String),
    /// Continue with these parameters.
    Continue(SerializeParameters),
}

// ============================================================================
// Deserialize
// ============================================================================

/// Overridable inputs of a deserialize operation.
#[derive(Clone)]
pub struct DeserializeParameters {
    /// Expected `iss` value for self-contained tokens.
    pub issuer: String,
    /// Opaque format.
    pub protector: Arc<dyn TicketProtector>,
    /// Self-contained format. `None` selects the opaque format.
    pub handler: Option<Arc<dyn SecurityTokenHandler>>,
    /// Verification credentials, in preference order.
    pub signing_credentials: Vec<Arc<SigningCredentials>>,
    /// Decrypting credential for encrypted tokens.
    pub encrypting_credentials: Option<Arc<EncryptingCredentials>>,
}

/// Context handed to deserialize hooks.
pub struct DeserializeContext<'a> {
    /// Kind being deserialized.
    pub kind: TokenUsage,
    /// Token string received from the client.
    pub token: &'a str,
    /// Protocol request carrying the token.
    pub request: &'a OpenIdConnectRequest,
    /// Engine defaults.
    pub parameters: DeserializeParameters,
}

/// Result of a deserialize hook.
pub enum DeserializeOutcome {
    /// Use this ticket and skip the default logic.
    Ticket(AuthenticationTicket),
    /// Continue with these parameters.
    Continue(DeserializeParameters),
}

// ============================================================================
// Hook Trait
// ============================================================================

/// Host hooks around the eight token operations.
///
/// Every method defaults to continuing with the engine defaults, so hosts
/// only override the steps they care about.
#[async_trait]
pub trait TokenNotifications: Send + Sync {
    /// Called before an authorization code is serialized.
    async fn serialize_authorization_code(
        &self,
        context: &SerializeContext<'_>,
    ) -> Result<SerializeOutcome, NotificationError> {
        Ok(SerializeOutcome::Continue(context.parameters.clone()))
    }

    /// Called before an access token is serialized.
    async fn serialize_access_token(
        &self,
        context: &SerializeContext<'_>,
    ) -> Result<SerializeOutcome, NotificationError> {
        Ok(SerializeOutcome::Continue(context.parameters.clone()))
    }

    /// Called before an identity token is serialized.
    async fn serialize_identity_token(
        &self,
        context: &SerializeContext<'_>,
    ) -> Result<SerializeOutcome, NotificationError> {
        Ok(SerializeOutcome::Continue(context.parameters.clone()))
    }

    /// Called before a refresh token is serialized.
    async fn serialize_refresh_token(
        &self,
        context: &SerializeContext<'_>,
    ) -> Result<SerializeOutcome, NotificationError> {
        Ok(SerializeOutcome::Continue(context.parameters.clone()))
    }

    /// Called before an authorization code is redeemed.
    async fn deserialize_authorization_code(
        &self,
        context: &DeserializeContext<'_>,
    ) -> Result<DeserializeOutcome, NotificationError> {
        Ok(DeserializeOutcome::Continue(context.parameters.clone()))
    }

    /// Called before an access token is read.
    async fn deserialize_access_token(
        &self,
        context: &DeserializeContext<'_>,
    ) -> Result<DeserializeOutcome, NotificationError> {
        Ok(DeserializeOutcome::Continue(context.parameters.clone()))
    }

    /// Called before an identity token is read.
    async fn deserialize_identity_token(
        &self,
        context: &DeserializeContext<'_>,
    ) -> Result<DeserializeOutcome, NotificationError> {
        Ok(DeserializeOutcome::Continue(context.parameters.clone()))
    }

    /// Called before a refresh token is read.
    async fn deserialize_refresh_token(
        &self,
        context: &DeserializeContext<'_>,
    ) -> Result<DeserializeOutcome, NotificationError> {
        Ok(DeserializeOutcome::Continue(context.parameters.clone()))
    }
}

/// Hooks that always continue with the engine defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNotifications;

#[async_trait]
impl TokenNotifications for DefaultNotifications {}

/// Dispatches a serialize context to the hook matching its kind.
pub(crate) async fn dispatch_serialize(
    notifications: &dyn TokenNotifications,
    context: &SerializeContext<'_>,
) -> Result<SerializeOutcome, NotificationError> {
    match context.kind {
        TokenUsage::AuthorizationCode => notifications.serialize_authorization_code(context).await,
        TokenUsage::AccessToken => notifications.serialize_access_token(context).await,
        TokenUsage::IdentityToken => notifications.serialize_identity_token(context).await,
        TokenUsage::RefreshToken => notifications.serialize_refresh_token(context).await,
    }
}

/// Dispatches a deserialize context to the hook matching its kind.
pub(crate) async fn dispatch_deserialize(
    notifications: &dyn TokenNotifications,
    context: &DeserializeContext<'_>,
) -> Result<DeserializeOutcome, NotificationError> {
    match context.kind {
        TokenUsage::AuthorizationCode => {
            notifications.deserialize_authorization_code(context).await
        }
        TokenUsage::AccessToken => notifications.deserialize_access_token(context).await,
        TokenUsage::IdentityToken => notifications.deserialize_identity_token(context).await,
        TokenUsage::RefreshToken => notifications.deserialize_refresh_token(context).await,
    }
}
