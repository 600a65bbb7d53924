//! Token lifecycle orchestrator.
//!
//! [`TokenServer`] exposes the eight token operations (serialize and
//! deserialize for codes, access tokens, identity tokens and refresh tokens)
//! plus [`TokenServer::sign_in`], which issues every artifact of a protocol
//! response in the required order.
//!
//! Expected rejections are answered with `Ok(None)` and reported to the
//! diagnostics sink. Only host hook failures, signing and protection faults
//! during issuance, and store failures surface as errors.

mod deserialize;
pub mod options;
mod serialize;
mod sign_in;

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::notifications::{DefaultNotifications, TokenNotifications};
use crate::storage::{CodeStore, InMemoryCodeStore};
use crate::ServerResult;

pub use options::{TokenFormat, TokenFormats, TokenServerOptions};
pub use serialize::IssuedToken;

/// The token lifecycle engine.
///
/// Holds only immutable shared state; one instance serves concurrent
/// requests. Every issuance works on its own ticket copy.
///
/// # Example
///
/// ```ignore
/// let options = TokenServerOptions::new(TokenServerConfig::new("https://fhir.example.com"))?
///     .with_signing_credentials(SigningCredentials::generate_rsa(SigningAlgorithm::RS256)?);
/// let server = TokenServer::new(options);
///
/// let response = server.sign_in(&ticket, &request).await?;
/// ```
pub struct TokenServer {
    options: Arc<TokenServerOptions>,
    notifications: Arc<dyn TokenNotifications>,
    code_store: Arc<dyn CodeStore>,
    custom_code_store: bool,
    clock: Arc<dyn Clock>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl TokenServer {
    /// Creates a server with default hooks, an in-memory code store, the
    /// system clock and `tracing` diagnostics.
    #[must_use]
    pub fn new(options: TokenServerOptions) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            options: Arc::new(options),
            notifications: Arc::new(DefaultNotifications),
            code_store: Arc::new(InMemoryCodeStore::with_clock(clock.clone())),
            custom_code_store: false,
            clock,
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    /// Sets the host hooks.
    #[must_use]
    pub fn with_notifications(mut self, notifications: Arc<dyn TokenNotifications>) -> Self {
        self.notifications = notifications;
        self
    }

    /// Sets the single-use code store.
    #[must_use]
    pub fn with_code_store(mut self, code_store: Arc<dyn CodeStore>) -> Self {
        self.code_store = code_store;
        self.custom_code_store = true;
        self
    }

    /// Sets the clock. The built-in code store follows the new clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        if !self.custom_code_store {
            self.code_store = Arc::new(InMemoryCodeStore::with_clock(clock.clone()));
        }
        self.clock = clock;
        self
    }

    /// Sets the diagnostics sink.
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Returns the runtime options.
    #[must_use]
    pub fn options(&self) -> &TokenServerOptions {
        &self.options
    }

    /// Returns the single-use code store.
    #[must_use]
    pub fn code_store(&self) -> &Arc<dyn CodeStore> {
        &self.code_store
    }

    /// Revokes an authorization code before it is redeemed.
    ///
    /// Revoking an unknown or already redeemed code is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the code store fails.
    pub async fn revoke_authorization_code(&self, code: &str) -> ServerResult<()> {
        self.code_store.remove(code).await?;
        tracing::debug!("Authorization code revoked");
        Ok(())
    }

    /// Deletes expired authorization codes from the code store.
    ///
    /// Hosts call this periodically. Returns the number of codes deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the code store fails.
    pub async fn cleanup_expired_codes(&self) -> ServerResult<u64> {
        let removed = self.code_store.cleanup_expired().await?;
        tracing::debug!(removed, "Expired authorization codes swept");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
    use serde_json::Value;
    use time::OffsetDateTime;
    use time::macros::datetime;

    use super::*;
    use crate::config::TokenServerConfig;
    use crate::crypto::{SigningAlgorithm, SigningCredentials};
    use crate::diagnostics::DiagnosticLevel;
    use crate::diagnostics::testing::RecordingDiagnostics;
    use crate::error::TokenServerError;
    use crate::notifications::{
        DeserializeContext, DeserializeOutcome, NotificationError, SerializeContext,
        SerializeOutcome,
    };
    use crate::token::{AesGcmTicketProtector, JwtSecurityTokenHandler, TicketProtector};
    use crate::types::{
        AuthenticationTicket, Claim, ClaimsIdentity, OpenIdConnectRequest, OpenIdConnectResponse,
        TokenUsage, claim_types, grant_types, scopes,
    };

    const ISSUER: &str = "https://auth.example.com";

    struct SteppingClock(Mutex<OffsetDateTime>);

    impl SteppingClock {
        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> OffsetDateTime {
            *self.0.lock().unwrap()
        }
    }

    struct Harness {
        server: TokenServer,
        clock: Arc<SteppingClock>,
        diagnostics: Arc<RecordingDiagnostics>,
    }

    fn harness(options: TokenServerOptions) -> Harness {
        let clock = Arc::new(SteppingClock(Mutex::new(datetime!(2024-01-01 12:00 UTC))));
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let server = TokenServer::new(options)
            .with_clock(clock.clone())
            .with_diagnostics(diagnostics.clone());
        Harness {
            server,
            clock,
            diagnostics,
        }
    }

    fn options() -> TokenServerOptions {
        TokenServerOptions::new(TokenServerConfig::new(ISSUER))
            .unwrap()
            .with_signing_credentials(
                SigningCredentials::generate_rsa(SigningAlgorithm::RS256).unwrap(),
            )
    }

    fn ticket() -> AuthenticationTicket {
        let identity = ClaimsIdentity::new()
            .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "alice"))
            .with_claim(Claim::new("email", "alice@example.com").with_destination("id_token"))
            .with_claim(Claim::new("role", "admin").with_destination("access_token"))
            .with_claim(Claim::new("secret", "internal"));
        let mut ticket = AuthenticationTicket::new(identity);
        ticket.properties.add_scope(scopes::OPENID);
        ticket.properties.add_scope(scopes::OFFLINE_ACCESS);
        ticket.properties.add_audience("https://fhir.example.com");
        ticket
    }

    fn authorization_request() -> OpenIdConnectRequest {
        OpenIdConnectRequest {
            client_id: Some("client".to_string()),
            response_type: Some("code".to_string()),
            nonce: Some("n-0S6_WzA2Mj".to_string()),
            redirect_uri: Some("https://client.example.com/cb".to_string()),
            ..Default::default()
        }
    }

    fn code_grant(code: &str) -> OpenIdConnectRequest {
        OpenIdConnectRequest {
            client_id: Some("client".to_string()),
            grant_type: Some(grant_types::AUTHORIZATION_CODE.to_string()),
            code: Some(code.to_string()),
            ..Default::default()
        }
    }

    fn jwt_payload(token: &str) -> serde_json::Map<String, Value> {
        let payload = token.split('.').nth(1).unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_authorization_code_is_single_use() {
        let h = harness(options());
        let request = authorization_request();

        let code = h
            .server
            .serialize_authorization_code(&ticket(), &request, &OpenIdConnectResponse::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code.len(), 43);

        let redeemed = h
            .server
            .deserialize_authorization_code(&code, &code_grant(&code))
            .await
            .unwrap()
            .unwrap();
        assert!(redeemed.is_kind(TokenUsage::AuthorizationCode));
        assert_eq!(redeemed.properties.nonce.as_deref(), Some("n-0S6_WzA2Mj"));
        assert_eq!(
            redeemed.properties.redirect_uri.as_deref(),
            Some("https://client.example.com/cb")
        );
        assert!(redeemed.properties.presenters.contains("client"));
        // codes are not filtered
        assert!(redeemed.identity.has_claim("secret"));

        let second = h
            .server
            .deserialize_authorization_code(&code, &code_grant(&code))
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(h.diagnostics.count(DiagnosticLevel::Verbose), 1);
    }

    #[tokio::test]
    async fn test_revoked_code_cannot_be_redeemed() {
        let h = harness(options());
        let code = h
            .server
            .serialize_authorization_code(
                &ticket(),
                &authorization_request(),
                &OpenIdConnectResponse::default(),
            )
            .await
            .unwrap()
            .unwrap();

        h.server.revoke_authorization_code(&code).await.unwrap();
        assert!(
            h.server
                .deserialize_authorization_code(&code, &code_grant(&code))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_cleanup_expired_codes() {
        let h = harness(options());
        for _ in 0..2 {
            h.server
                .serialize_authorization_code(
                    &ticket(),
                    &authorization_request(),
                    &OpenIdConnectResponse::default(),
                )
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(h.server.cleanup_expired_codes().await.unwrap(), 0);

        h.clock.advance(Duration::from_secs(301));
        let fresh = h
            .server
            .serialize_authorization_code(
                &ticket(),
                &authorization_request(),
                &OpenIdConnectResponse::default(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(h.server.cleanup_expired_codes().await.unwrap(), 2);
        assert!(
            h.server
                .deserialize_authorization_code(&fresh, &code_grant(&fresh))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let h = harness(options());
        let code = h
            .server
            .serialize_authorization_code(
                &ticket(),
                &authorization_request(),
                &OpenIdConnectResponse::default(),
            )
            .await
            .unwrap()
            .unwrap();

        h.clock.advance(Duration::from_secs(301));
        assert!(
            h.server
                .deserialize_authorization_code(&code, &code_grant(&code))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_default_and_overridden_lifetimes() {
        let h = harness(options());
        let request = code_grant("code");
        let response = OpenIdConnectResponse::default();

        let token = h
            .server
            .serialize_access_token(&ticket(), &request, &response)
            .await
            .unwrap()
            .unwrap();
        let restored = h
            .server
            .deserialize_access_token(&token, &request)
            .await
            .unwrap()
            .unwrap();
        let issued_at = restored.properties.issued_at.unwrap();
        assert_eq!(
            restored.properties.expires_at,
            Some(issued_at + Duration::from_secs(3600))
        );

        let mut short_lived = ticket();
        short_lived
            .properties
            .set_lifetime(TokenUsage::AccessToken, Duration::from_secs(60));
        let token = h
            .server
            .serialize_access_token(&short_lived, &request, &response)
            .await
            .unwrap()
            .unwrap();
        let restored = h
            .server
            .deserialize_access_token(&token, &request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            restored.properties.expires_at,
            Some(restored.properties.issued_at.unwrap() + Duration::from_secs(60))
        );

        h.clock.advance(Duration::from_secs(61));
        assert!(
            h.server
                .deserialize_access_token(&token, &request)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_unrepresentable_lifetime_is_an_error() {
        let h = harness(options());
        let mut ticket = ticket();
        ticket
            .properties
            .set_lifetime(TokenUsage::AccessToken, Duration::from_secs(u64::MAX));

        let err = h
            .server
            .serialize_access_token(&ticket, &code_grant("code"), &OpenIdConnectResponse::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TokenServerError::InvalidTicket { .. }));

        // fits a time::Duration, but lands past the last representable date
        ticket
            .properties
            .set_lifetime(TokenUsage::AccessToken, Duration::from_secs(u64::MAX / 4));
        let err = h
            .server
            .serialize_access_token(&ticket, &code_grant("code"), &OpenIdConnectResponse::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TokenServerError::InvalidTicket { .. }));
    }

    #[tokio::test]
    async fn test_opaque_access_token_is_filtered() {
        let h = harness(options());
        let request = code_grant("code");
        let token = h
            .server
            .serialize_access_token(&ticket(), &request, &OpenIdConnectResponse::default())
            .await
            .unwrap()
            .unwrap();

        let restored = h
            .server
            .deserialize_access_token(&token, &request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restored.identity.subject(), Some("alice"));
        assert!(restored.identity.has_claim("role"));
        assert!(!restored.identity.has_claim("email"));
        assert!(!restored.identity.has_claim("secret"));
    }

    #[tokio::test]
    async fn test_kind_mismatch_rejected() {
        let shared: Arc<dyn TicketProtector> = Arc::new(AesGcmTicketProtector::generate("shared"));
        let options = options()
            .with_format(TokenUsage::AccessToken, TokenFormat::opaque(shared.clone()))
            .with_format(TokenUsage::RefreshToken, TokenFormat::opaque(shared));
        let h = harness(options);
        let request = code_grant("code");

        let refresh_token = h
            .server
            .serialize_refresh_token(&ticket(), &request, &OpenIdConnectResponse::default())
            .await
            .unwrap()
            .unwrap();

        assert!(
            h.server
                .deserialize_access_token(&refresh_token, &request)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            h.server
                .deserialize_refresh_token(&refresh_token, &request)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_self_contained_access_token() {
        let protector: Arc<dyn TicketProtector> = Arc::new(AesGcmTicketProtector::generate("at"));
        let options = options().with_format(
            TokenUsage::AccessToken,
            TokenFormat::self_contained(protector, Arc::new(JwtSecurityTokenHandler::new())),
        );
        let h = harness(options);
        let request = code_grant("code");

        let token = h
            .server
            .serialize_access_token(&ticket(), &request, &OpenIdConnectResponse::default())
            .await
            .unwrap()
            .unwrap();

        let payload = jwt_payload(&token);
        assert_eq!(payload["sub"], "alice");
        assert_eq!(payload["role"], "admin");
        assert_eq!(payload["aud"], "https://fhir.example.com");
        assert_eq!(payload["azp"], "client");
        assert_eq!(payload["iss"], ISSUER);
        assert!(!payload.contains_key("email"));
        assert!(!payload.contains_key("secret"));

        let restored = h
            .server
            .deserialize_access_token(&token, &request)
            .await
            .unwrap()
            .unwrap();
        assert!(restored.is_kind(TokenUsage::AccessToken));
        assert_eq!(restored.identity.subject(), Some("alice"));
        assert!(restored.properties.has_scope(scopes::OPENID));

        // self-contained tokens still expire on the engine clock
        h.clock.advance(Duration::from_secs(3601));
        assert!(
            h.server
                .deserialize_access_token(&token, &request)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_identity_token_nonce_recovered_on_code_grant() {
        let h = harness(options());

        let code = h
            .server
            .serialize_authorization_code(
                &ticket(),
                &authorization_request(),
                &OpenIdConnectResponse::default(),
            )
            .await
            .unwrap()
            .unwrap();
        let request = code_grant(&code);
        let code_ticket = h
            .server
            .deserialize_authorization_code(&code, &request)
            .await
            .unwrap()
            .unwrap();

        let response = h.server.sign_in(&code_ticket, &request).await.unwrap();
        let id_token = response.id_token.unwrap();
        let payload = jwt_payload(&id_token);

        assert_eq!(payload["nonce"], "n-0S6_WzA2Mj");
        assert_eq!(payload["aud"], "client");
        assert_eq!(payload["email"], "alice@example.com");
        assert!(!payload.contains_key("role"));
        assert!(!payload.contains_key("c_hash"));
        assert_eq!(
            payload["at_hash"],
            SigningAlgorithm::RS256.left_half_hash(response.access_token.as_deref().unwrap())
        );
        assert!(response.refresh_token.is_some());
    }

    #[tokio::test]
    async fn test_hybrid_flow_hashes() {
        let h = harness(options());
        let mut request = authorization_request();
        request.response_type = Some("code id_token token".to_string());

        let response = h.server.sign_in(&ticket(), &request).await.unwrap();
        let code = response.code.as_deref().unwrap();
        let access_token = response.access_token.as_deref().unwrap();
        let payload = jwt_payload(response.id_token.as_deref().unwrap());

        assert_eq!(payload["c_hash"], SigningAlgorithm::RS256.left_half_hash(code));
        assert_eq!(
            payload["at_hash"],
            SigningAlgorithm::RS256.left_half_hash(access_token)
        );
        assert_eq!(payload["nonce"], "n-0S6_WzA2Mj");
        assert!(response.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_identity_token_configuration_gaps() {
        let protector: Arc<dyn TicketProtector> = Arc::new(AesGcmTicketProtector::generate("id"));
        let h = harness(
            options().with_format(TokenUsage::IdentityToken, TokenFormat::opaque(protector)),
        );
        let request = code_grant("code");
        let response = OpenIdConnectResponse::default();

        let token = h
            .server
            .serialize_identity_token(&ticket(), &request, &response)
            .await
            .unwrap();
        assert!(token.is_none());
        assert_eq!(h.diagnostics.count(DiagnosticLevel::Verbose), 1);

        // handler configured but no signing key
        let h = harness(TokenServerOptions::new(TokenServerConfig::new(ISSUER)).unwrap());
        let token = h
            .server
            .serialize_identity_token(&ticket(), &request, &response)
            .await
            .unwrap();
        assert!(token.is_none());
        assert_eq!(h.diagnostics.count(DiagnosticLevel::Warning), 1);
    }

    #[tokio::test]
    async fn test_tampered_identity_token_rejected() {
        let h = harness(options());
        let request = code_grant("code");
        let token = h
            .server
            .serialize_identity_token(&ticket(), &request, &OpenIdConnectResponse::default())
            .await
            .unwrap()
            .unwrap();

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(br#"{"sub":"mallory","usage":"id_token"}"#);
        parts[1] = &forged;

        assert!(
            h.server
                .deserialize_identity_token(&parts.join("."), &request)
                .await
                .unwrap()
                .is_none()
        );
        assert!(h.diagnostics.count(DiagnosticLevel::Verbose) >= 1);
        assert_eq!(h.diagnostics.count(DiagnosticLevel::Error), 0);
    }

    struct HostFormat;

    #[async_trait]
    impl TokenNotifications for HostFormat {
        async fn serialize_access_token(
            &self,
            _context: &SerializeContext<'_>,
        ) -> Result<SerializeOutcome, NotificationError> {
            Ok(SerializeOutcome::Token("host-access-token".to_string()))
        }

        async fn serialize_refresh_token(
            &self,
            context: &SerializeContext<'_>,
        ) -> Result<SerializeOutcome, NotificationError> {
            let mut parameters = context.parameters.clone();
            parameters.ticket.properties.expires_at = None;
            parameters
                .ticket
                .properties
                .set_lifetime(TokenUsage::RefreshToken, Duration::from_secs(120));
            Ok(SerializeOutcome::Continue(parameters))
        }

        async fn deserialize_access_token(
            &self,
            context: &DeserializeContext<'_>,
        ) -> Result<DeserializeOutcome, NotificationError> {
            if context.token == "host-access-token" {
                let mut ticket = AuthenticationTicket::new(
                    ClaimsIdentity::new().with_claim(Claim::new(claim_types::SUBJECT, "host")),
                );
                ticket.properties.usage = Some(TokenUsage::AccessToken);
                return Ok(DeserializeOutcome::Ticket(ticket));
            }
            Ok(DeserializeOutcome::Continue(context.parameters.clone()))
        }

        async fn deserialize_identity_token(
            &self,
            _context: &DeserializeContext<'_>,
        ) -> Result<DeserializeOutcome, NotificationError> {
            Err(NotificationError::execution("identity tokens are disabled"))
        }
    }

    #[tokio::test]
    async fn test_notifications_replace_and_mutate() {
        let h = harness(options());
        let server = h.server.with_notifications(Arc::new(HostFormat));
        let request = code_grant("code");
        let response = OpenIdConnectResponse::default();

        let access_token = server
            .serialize_access_token(&ticket(), &request, &response)
            .await
            .unwrap();
        assert_eq!(access_token.as_deref(), Some("host-access-token"));

        let restored = server
            .deserialize_access_token("host-access-token", &request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restored.identity.subject(), Some("host"));

        // expires_at cleared by the hook is re-resolved from the ticket override
        let refresh_token = server
            .serialize_refresh_token(&ticket(), &request, &response)
            .await
            .unwrap()
            .unwrap();
        let restored = server
            .deserialize_refresh_token(&refresh_token, &request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            restored.properties.expires_at,
            Some(restored.properties.issued_at.unwrap() + Duration::from_secs(120))
        );
    }

    #[tokio::test]
    async fn test_notification_error_propagates() {
        let server = TokenServer::new(options()).with_notifications(Arc::new(HostFormat));
        let err = server
            .deserialize_identity_token("token", &code_grant("code"))
            .await
            .unwrap_err();

        assert!(err.is_host_fault());
        assert!(matches!(err, TokenServerError::Notification(_)));
        assert_eq!(
            err.to_string(),
            "Notification handler failed: identity tokens are disabled"
        );
    }
}
