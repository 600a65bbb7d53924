//! Sign-in: issuing every artifact of one protocol response.

use super::TokenServer;
use crate::ServerResult;
use crate::error::TokenServerError;
use crate::types::{
    AuthenticationTicket, OpenIdConnectRequest, OpenIdConnectResponse, TokenUsage, scopes,
};

/// Token type of issued access tokens.
const BEARER: &str = "Bearer";

/// Artifacts requested for one response.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Artifacts {
    code: bool,
    access_token: bool,
    identity_token: bool,
    refresh_token: bool,
}

impl TokenServer {
    /// Issues the artifacts of a protocol response for an authenticated ticket.
    ///
    /// Artifacts are produced in a fixed order (code, access token, identity
    /// token, refresh token) because the identity token hashes the code and
    /// access token of the same response.
    ///
    /// - Authorization requests issue what `response_type` asks for.
    /// - Token requests always issue an access token, an identity token when
    ///   the `openid` scope was granted and a refresh token when
    ///   `offline_access` was granted. A refresh token grant only gets a new
    ///   refresh token when sliding expiration is enabled.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTicket` if the ticket has no subject or the request is
    /// neither an authorization nor a token request, and propagates any
    /// serialize error.
    pub async fn sign_in(
        &self,
        ticket: &AuthenticationTicket,
        request: &OpenIdConnectRequest,
    ) -> ServerResult<OpenIdConnectResponse> {
        if ticket.identity.subject().is_none() {
            return Err(TokenServerError::invalid_ticket(
                "The authentication ticket must contain a subject claim",
            ));
        }

        let artifacts = self.requested_artifacts(ticket, request)?;
        let mut response = OpenIdConnectResponse::default();

        if artifacts.code {
            response.code = self
                .serialize_authorization_code(ticket, request, &response)
                .await?;
        }

        if artifacts.access_token {
            if let Some(issued) = self
                .serialize(TokenUsage::AccessToken, ticket, request, &response)
                .await?
            {
                let expires_in = match (issued.issued_at, issued.expires_at) {
                    (Some(issued_at), Some(expires_at)) => {
                        (expires_at - issued_at).whole_seconds().max(0) as u64
                    }
                    _ => self
                        .lifetime(TokenUsage::AccessToken, &ticket.properties)
                        .as_secs(),
                };
                response.access_token = Some(issued.token);
                response.token_type = Some(BEARER.to_string());
                response.expires_in = Some(expires_in);
            }
        }

        if artifacts.identity_token {
            response.id_token = self
                .serialize_identity_token(ticket, request, &response)
                .await?;
        }

        if artifacts.refresh_token {
            response.refresh_token = self
                .serialize_refresh_token(ticket, request, &response)
                .await?;
        }

        tracing::info!(
            code = response.code.is_some(),
            access_token = response.access_token.is_some(),
            id_token = response.id_token.is_some(),
            refresh_token = response.refresh_token.is_some(),
            "Sign-in completed"
        );

        Ok(response)
    }

    fn requested_artifacts(
        &self,
        ticket: &AuthenticationTicket,
        request: &OpenIdConnectRequest,
    ) -> ServerResult<Artifacts> {
        if request.is_authorization_request() {
            return Ok(Artifacts {
                code: request.has_response_type("code"),
                access_token: request.has_response_type("token"),
                identity_token: request.has_response_type("id_token"),
                refresh_token: false,
            });
        }

        if request.is_token_request() {
            let rotate = !request.is_refresh_token_grant()
                || self.options.config.use_sliding_expiration;
            return Ok(Artifacts {
                code: false,
                access_token: true,
                identity_token: ticket.properties.has_scope(scopes::OPENID),
                refresh_token: rotate && ticket.properties.has_scope(scopes::OFFLINE_ACCESS),
            });
        }

        Err(TokenServerError::invalid_ticket(
            "Sign-in requires an authorization or token request",
        ))
    }
}
