//! Deserialize operations.

use super::TokenServer;
use crate::ServerResult;
use crate::notifications::{
    DeserializeContext, DeserializeOutcome, DeserializeParameters, dispatch_deserialize,
};
use crate::token::{SecurityTokenHandler, TokenValidationParameters, read_ticket};
use crate::types::{AuthenticationTicket, OpenIdConnectRequest, TokenUsage};

impl TokenServer {
    /// Redeems an authorization code.
    ///
    /// The code is removed from the store before its ticket is inspected, so
    /// a second redemption returns `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook fails or the code store fails.
    pub async fn deserialize_authorization_code(
        &self,
        code: &str,
        request: &OpenIdConnectRequest,
    ) -> ServerResult<Option<AuthenticationTicket>> {
        self.deserialize(TokenUsage::AuthorizationCode, code, request).await
    }

    /// Reads an access token.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook fails.
    pub async fn deserialize_access_token(
        &self,
        token: &str,
        request: &OpenIdConnectRequest,
    ) -> ServerResult<Option<AuthenticationTicket>> {
        self.deserialize(TokenUsage::AccessToken, token, request).await
    }

    /// Reads an identity token (e.g. an `id_token_hint`).
    ///
    /// # Errors
    ///
    /// Returns an error if a hook fails.
    pub async fn deserialize_identity_token(
        &self,
        token: &str,
        request: &OpenIdConnectRequest,
    ) -> ServerResult<Option<AuthenticationTicket>> {
        self.deserialize(TokenUsage::IdentityToken, token, request).await
    }

    /// Reads a refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if a hook fails.
    pub async fn deserialize_refresh_token(
        &self,
        token: &str,
        request: &OpenIdConnectRequest,
    ) -> ServerResult<Option<AuthenticationTicket>> {
        self.deserialize(TokenUsage::RefreshToken, token, request).await
    }

    async fn deserialize(
        &self,
        kind: TokenUsage,
        token: &str,
        request: &OpenIdConnectRequest,
    ) -> ServerResult<Option<AuthenticationTicket>> {
        let format = self.options.formats.get(kind);
        let handler = match kind {
            TokenUsage::AuthorizationCode => None,
            _ => format.handler.clone(),
        };

        let context = DeserializeContext {
            kind,
            token,
            request,
            parameters: DeserializeParameters {
                issuer: self.options.config.issuer.clone(),
                protector: format.protector.clone(),
                handler,
                signing_credentials: self.options.signing_credentials.clone(),
                encrypting_credentials: self.options.encrypting_credentials.clone(),
            },
        };

        let parameters = match dispatch_deserialize(self.notifications.as_ref(), &context).await? {
            DeserializeOutcome::Ticket(ticket) => {
                tracing::debug!(kind = %kind, "Ticket supplied by notification handler");
                return Ok(Some(ticket));
            }
            DeserializeOutcome::Continue(parameters) => parameters,
        };

        let ticket = if kind == TokenUsage::AuthorizationCode {
            let Some(protected) = self.code_store.take(token).await? else {
                self.diagnostics
                    .verbose("The authorization code is unknown, expired or already redeemed");
                return Ok(None);
            };
            parameters.protector.unprotect(&protected)
        } else if let Some(handler) = parameters.handler.as_deref() {
            self.read_self_contained(kind, handler, token, &parameters)
        } else if kind == TokenUsage::IdentityToken {
            self.diagnostics
                .verbose("No security token handler is configured for identity tokens");
            return Ok(None);
        } else {
            parameters.protector.unprotect(token)
        };

        let Some(ticket) = ticket else {
            self.diagnostics.verbose(&format!("The {} could not be read", kind));
            return Ok(None);
        };

        if !ticket.is_kind(kind) {
            self.diagnostics.verbose(&format!(
                "The ticket is not a valid {}: usage is {:?}",
                kind,
                ticket.usage().map(|u| u.as_str())
            ));
            return Ok(None);
        }

        if ticket.is_expired_at(self.clock.now()) {
            self.diagnostics.verbose(&format!("The {} has expired", kind));
            return Ok(None);
        }

        tracing::debug!(kind = %kind, "Token validated");
        Ok(Some(ticket))
    }

    /// Verifies a self-contained token and maps its claims back to a ticket.
    ///
    /// Any verification failure yields `None`: tokens come from clients and
    /// must never fail the request. Key problems are reported as errors.
    fn read_self_contained(
        &self,
        kind: TokenUsage,
        handler: &dyn SecurityTokenHandler,
        token: &str,
        parameters: &DeserializeParameters,
    ) -> Option<AuthenticationTicket> {
        let validation = TokenValidationParameters {
            issuer: &parameters.issuer,
            signing_credentials: &parameters.signing_credentials,
            decrypting_credentials: parameters.encrypting_credentials.as_deref(),
        };

        match handler.validate_token(token, &validation) {
            Ok(claims) => read_ticket(&claims),
            Err(e) if e.is_validation_error() => {
                self.diagnostics
                    .verbose(&format!("The {} failed validation: {}", kind, e));
                None
            }
            Err(e) => {
                self.diagnostics.error(&format!(
                    "An unexpected error occurred while validating the {}: {}",
                    kind, e
                ));
                None
            }
        }
    }
}
