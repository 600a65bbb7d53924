//! Protocol request and response values.
//!
//! Endpoint handlers parse incoming requests into [`OpenIdConnectRequest`]
//! and render the [`OpenIdConnectResponse`] the engine builds.

use serde::{Deserialize, Serialize};

/// OAuth 2.0 grant type values.
pub mod grant_types {
    /// Authorization code grant.
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    /// Refresh token grant.
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// Client credentials grant.
    pub const CLIENT_CREDENTIALS: &str = "client_credentials";
}

/// Scope values the engine reacts to.
pub mod scopes {
    /// Requests an identity token.
    pub const OPENID: &str = "openid";
    /// Requests a refresh token.
    pub const OFFLINE_ACCESS: &str = "offline_access";
}

/// A parsed authorization or token request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenIdConnectRequest {
    /// Client identifier of the presenting client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Grant type (token requests only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<String>,

    /// Space-separated response types (authorization requests only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,

    /// Space-separated requested scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Nonce (authorization requests only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Redirect URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Authorization code being redeemed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Refresh token being redeemed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl OpenIdConnectRequest {
    /// Returns `true` for authorization endpoint requests.
    #[must_use]
    pub fn is_authorization_request(&self) -> bool {
        self.response_type.is_some()
    }

    /// Returns `true` for token endpoint requests.
    #[must_use]
    pub fn is_token_request(&self) -> bool {
        self.grant_type.is_some()
    }

    /// Returns `true` for the authorization code grant.
    #[must_use]
    pub fn is_authorization_code_grant(&self) -> bool {
        self.grant_type.as_deref() == Some(grant_types::AUTHORIZATION_CODE)
    }

    /// Returns `true` for the refresh token grant.
    #[must_use]
    pub fn is_refresh_token_grant(&self) -> bool {
        self.grant_type.as_deref() == Some(grant_types::REFRESH_TOKEN)
    }

    /// Returns `true` if `response_type` contains the given value.
    #[must_use]
    pub fn has_response_type(&self, response_type: &str) -> bool {
        self.response_type
            .as_deref()
            .is_some_and(|value| value.split_whitespace().any(|r| r == response_type))
    }
}

/// The protocol response being built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenIdConnectResponse {
    /// Authorization code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Token type (always "Bearer").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Access token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Identity token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}
