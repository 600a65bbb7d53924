//! Serialize operations.

use std::time::Duration;

use time::OffsetDateTime;

use super::TokenServer;
use crate::ServerResult;
use crate::error::TokenServerError;
use crate::notifications::{
    SerializeContext, SerializeOutcome, SerializeParameters, dispatch_serialize,
};
use crate::storage::generate_code_key;
use crate::token::{TokenBuildContext, build_token, filter_for_kind};
use crate::types::{
    AuthenticationTicket, OpenIdConnectRequest, OpenIdConnectResponse, TicketProperties,
    TokenUsage,
};

/// A token produced by a serialize operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Wire value handed to the client.
    pub token: String,
    /// Issuance time of the underlying ticket. Unknown for host-supplied tokens.
    pub issued_at: Option<OffsetDateTime>,
    /// Expiration of the underlying ticket. Unknown for host-supplied tokens.
    pub expires_at: Option<OffsetDateTime>,
}

impl TokenServer {
    /// Issues an authorization code for `ticket`.
    ///
    /// The returned value is a random lookup key; the protected ticket is
    /// kept in the code store until redeemed or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook fails, protection fails or the code store fails.
    pub async fn serialize_authorization_code(
        &self,
        ticket: &AuthenticationTicket,
        request: &OpenIdConnectRequest,
        response: &OpenIdConnectResponse,
    ) -> ServerResult<Option<String>> {
        self.serialize(TokenUsage::AuthorizationCode, ticket, request, response)
            .await
            .map(|issued| issued.map(|i| i.token))
    }

    /// Issues an access token for `ticket`.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook fails or signing/protection fails.
    pub async fn serialize_access_token(
        &self,
        ticket: &AuthenticationTicket,
        request: &OpenIdConnectRequest,
        response: &OpenIdConnectResponse,
    ) -> ServerResult<Option<String>> {
        self.serialize(TokenUsage::AccessToken, ticket, request, response)
            .await
            .map(|issued| issued.map(|i| i.token))
    }

    /// Issues an identity token for `ticket`.
    ///
    /// `response` must already carry the code and access token issued in the
    /// same response so that `c_hash` and `at_hash` can be computed.
    /// Returns `Ok(None)` when identity tokens are not configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook fails, the ticket has no subject or signing fails.
    pub async fn serialize_identity_token(
        &self,
        ticket: &AuthenticationTicket,
        request: &OpenIdConnectRequest,
        response: &OpenIdConnectResponse,
    ) -> ServerResult<Option<String>> {
        self.serialize(TokenUsage::IdentityToken, ticket, request, response)
            .await
            .map(|issued| issued.map(|i| i.token))
    }

    /// Issues a refresh token for `ticket`.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook fails or signing/protection fails.
    pub async fn serialize_refresh_token(
        &self,
        ticket: &AuthenticationTicket,
        request: &OpenIdConnectRequest,
        response: &OpenIdConnectResponse,
    ) -> ServerResult<Option<String>> {
        self.serialize(TokenUsage::RefreshToken, ticket, request, response)
            .await
            .map(|issued| issued.map(|i| i.token))
    }

    pub(crate) async fn serialize(
        &self,
        kind: TokenUsage,
        ticket: &AuthenticationTicket,
        request: &OpenIdConnectRequest,
        response: &OpenIdConnectResponse,
    ) -> ServerResult<Option<IssuedToken>> {
        let format = self.options.formats.get(kind);
        let handler = match kind {
            TokenUsage::AuthorizationCode => None,
            _ => format.handler.clone(),
        };

        let context = SerializeContext {
            kind,
            request,
            response,
            parameters: SerializeParameters {
                ticket: self.prepare_ticket(kind, ticket, request)?,
                issuer: self.options.config.issuer.clone(),
                protector: format.protector.clone(),
                handler,
                signing_credentials: self.options.default_signing_credentials().cloned(),
                encrypting_credentials: self.options.encrypting_credentials.clone(),
            },
        };

        let parameters = match dispatch_serialize(self.notifications.as_ref(), &context).await? {
            SerializeOutcome::Token(token) => {
                tracing::debug!(kind = %kind, "Token supplied by notification handler");
                return Ok(Some(IssuedToken {
                    token,
                    issued_at: None,
                    expires_at: None,
                }));
            }
            SerializeOutcome::Continue(parameters) => parameters,
        };

        let mut ticket = parameters.ticket;
        ticket.properties.usage = Some(kind);
        let issued_at = *ticket.properties.issued_at.get_or_insert_with(|| self.clock.now());
        let expires_at = match ticket.properties.expires_at {
            Some(expires_at) => expires_at,
            None => {
                let expires_at = expiration(issued_at, self.lifetime(kind, &ticket.properties))?;
                ticket.properties.expires_at = Some(expires_at);
                expires_at
            }
        };

        let ticket = filter_for_kind(&ticket, kind);

        let token = if kind == TokenUsage::AuthorizationCode {
            let protected = parameters.protector.protect(&ticket)?;
            let key = generate_code_key(self.options.config.code_key_bytes);
            self.code_store.set(&key, &protected, expires_at).await?;
            key
        } else if let Some(handler) = parameters.handler {
            let Some(signing_credentials) = parameters.signing_credentials else {
                self.diagnostics.warning(&format!(
                    "No signing credentials are configured; the {} cannot be issued",
                    kind
                ));
                return Ok(None);
            };

            let identity_token = kind == TokenUsage::IdentityToken;
            let build_context = TokenBuildContext {
                kind,
                issuer: &parameters.issuer,
                signing_credentials: &signing_credentials,
                encrypting_credentials: parameters.encrypting_credentials.as_deref(),
                nonce: ticket.properties.nonce.as_deref().filter(|_| identity_token),
                authorization_code: response.code.as_deref().filter(|_| identity_token),
                access_token: response.access_token.as_deref().filter(|_| identity_token),
                diagnostics: self.diagnostics.as_ref(),
            };
            build_token(handler.as_ref(), &ticket, &build_context)?
        } else if kind == TokenUsage::IdentityToken {
            self.diagnostics
                .verbose("No security token handler is configured for identity tokens");
            return Ok(None);
        } else {
            parameters.protector.protect(&ticket)?
        };

        tracing::debug!(kind = %kind, expires_at = %expires_at, "Token issued");

        Ok(Some(IssuedToken {
            token,
            issued_at: Some(issued_at),
            expires_at: Some(expires_at),
        }))
    }

    /// Builds the working ticket handed to the serialize hook.
    fn prepare_ticket(
        &self,
        kind: TokenUsage,
        ticket: &AuthenticationTicket,
        request: &OpenIdConnectRequest,
    ) -> ServerResult<AuthenticationTicket> {
        let now = self.clock.now();
        let mut working = ticket.clone();
        let properties = &mut working.properties;

        properties.usage = Some(kind);
        properties.issued_at = Some(now);
        properties.expires_at = Some(expiration(now, self.lifetime(kind, properties))?);

        if let Some(client_id) = request.client_id.as_deref() {
            properties.add_presenter(client_id);
        }

        match kind {
            TokenUsage::AuthorizationCode => {
                properties.nonce = request.nonce.clone();
                properties.redirect_uri = request.redirect_uri.clone();
            }
            TokenUsage::IdentityToken => {
                properties.nonce = identity_token_nonce(ticket, request);
                properties.redirect_uri = None;
            }
            TokenUsage::AccessToken | TokenUsage::RefreshToken => {
                properties.nonce = None;
                properties.redirect_uri = None;
            }
        }

        Ok(working)
    }

    /// Per-ticket lifetime override, else the configured lifetime.
    pub(crate) fn lifetime(&self, kind: TokenUsage, properties: &TicketProperties) -> Duration {
        properties
            .lifetime(kind)
            .unwrap_or_else(|| self.options.config.lifetime(kind))
    }
}

/// `issued_at + lifetime`, or an invalid-ticket error when the result leaves
/// the supported date range.
fn expiration(issued_at: OffsetDateTime, lifetime: Duration) -> ServerResult<OffsetDateTime> {
    time::Duration::try_from(lifetime)
        .ok()
        .and_then(|lifetime| issued_at.checked_add(lifetime))
        .ok_or_else(|| {
            TokenServerError::invalid_ticket(format!(
                "A lifetime of {}s does not yield a representable expiration",
                lifetime.as_secs()
            ))
        })
}

/// Nonce embedded into an identity token: the request nonce on the
/// authorization endpoint, the nonce recorded in the code ticket on the code
/// grant, none otherwise.
fn identity_token_nonce(
    ticket: &AuthenticationTicket,
    request: &OpenIdConnectRequest,
) -> Option<String> {
    if request.is_authorization_request() {
        request.nonce.clone()
    } else if request.is_authorization_code_grant() {
        ticket.properties.nonce.clone()
    } else {
        None
    }
}
