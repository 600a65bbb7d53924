//! Self-contained token builder.
//!
//! Turns a (filtered) ticket into the claims payload of an access or identity
//! token, and reads such a payload back into a ticket.
//!
//! Payload layout, in wire order:
//!
//! 1. identity claims, repeated types grouped into arrays (`sub` first, then
//!    `usage`, `confidential`, `scope`, `aud` and the host claims)
//! 2. `iss`, `iat`, `nbf`, `exp`
//! 3. `azp` (first presenter)
//! 4. identity tokens only: `nonce`, `c_hash`, `at_hash`
//! 5. `act` (delegated actor)
//! 6. refresh tokens only: `destinations`, the destination sets of the
//!    identity claims, so the ticket can be filtered again on redemption
//!
//! Host claims named like a reserved claim are dropped with a warning.

use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::handler::{SecurityTokenDescriptor, SecurityTokenHandler};
use crate::crypto::{EncryptingCredentials, SigningCredentials};
use crate::diagnostics::Diagnostics;
use crate::error::TokenServerError;
use crate::types::{AuthenticationTicket, Claim, ClaimsIdentity, TokenUsage, claim_types};
use crate::ServerResult;

/// Inputs of one self-contained token build.
#[derive(Clone, Copy)]
pub struct TokenBuildContext<'a> {
    /// Kind being built (access or identity token).
    pub kind: TokenUsage,
    /// `iss` value.
    pub issuer: &'a str,
    /// Credential signing the token.
    pub signing_credentials: &'a SigningCredentials,
    /// Credential encrypting the signed token.
    pub encrypting_credentials: Option<&'a EncryptingCredentials>,
    /// Nonce to embed (identity tokens).
    pub nonce: Option<&'a str>,
    /// Authorization code issued in the same response, hashed into `c_hash`.
    pub authorization_code: Option<&'a str>,
    /// Access token issued in the same response, hashed into `at_hash`.
    pub access_token: Option<&'a str>,
    /// Sink for non-fatal anomalies.
    pub diagnostics: &'a dyn Diagnostics,
}

/// Builds, signs and optionally encrypts a self-contained token.
///
/// # Errors
/// Returns an error if the ticket lacks its timestamps, an identity token
/// has no subject, or signing fails.
pub fn build_token(
    handler: &dyn SecurityTokenHandler,
    ticket: &AuthenticationTicket,
    context: &TokenBuildContext<'_>,
) -> ServerResult<String> {
    let claims = build_payload(ticket, context)?;

    let credentials = context.signing_credentials;
    let key_id = credentials.key_id();
    let x5t = credentials.certificate().map(|c| c.x5t());

    handler
        .create_token(&SecurityTokenDescriptor {
            claims: &claims,
            key_id: key_id.as_deref(),
            x5t: x5t.as_deref(),
            signing_credentials: credentials,
            encrypting_credentials: context.encrypting_credentials,
        })
        .map_err(|e| TokenServerError::signing(e.to_string()))
}

/// Builds the claims payload for `ticket`.
///
/// # Errors
/// Returns an internal error if `issued_at` or `expires_at` is missing,
/// and an invalid-ticket error for an identity token without subject.
pub fn build_payload(
    ticket: &AuthenticationTicket,
    context: &TokenBuildContext<'_>,
) -> ServerResult<Map<String, Value>> {
    let properties = &ticket.properties;
    let kind = context.kind;

    let issued_at = properties
        .issued_at
        .ok_or_else(|| TokenServerError::internal("Ticket has no issued_at timestamp"))?;
    let expires_at = properties
        .expires_at
        .ok_or_else(|| TokenServerError::internal("Ticket has no expires_at timestamp"))?;

    let mut identity = ticket.identity.clone();
    drop_reserved_claims(&mut identity, kind, context.diagnostics);
    identity.add_claim(Claim::new(claim_types::USAGE, kind.as_str()));

    if matches!(kind, TokenUsage::AccessToken | TokenUsage::RefreshToken) {
        if properties.confidential {
            identity.add_claim(Claim::new(claim_types::CONFIDENTIAL, "true"));
        }
        for scope in &properties.scopes {
            identity.add_claim(Claim::new(claim_types::SCOPE, scope.as_str()));
        }
    }

    let audiences = match kind {
        TokenUsage::IdentityToken => &properties.presenters,
        _ => &properties.audiences,
    };
    for audience in audiences {
        identity.add_claim(Claim::new(claim_types::AUDIENCE, audience.as_str()));
    }

    normalize_subject(&mut identity);
    if kind == TokenUsage::IdentityToken && !identity.has_claim(claim_types::SUBJECT) {
        return Err(TokenServerError::invalid_ticket(
            "Identity tokens require a subject claim",
        ));
    }

    let mut payload = group_claims(&identity.claims);
    payload.insert(claim_types::ISSUER.into(), context.issuer.into());
    payload.insert(claim_types::ISSUED_AT.into(), issued_at.unix_timestamp().into());
    payload.insert(claim_types::NOT_BEFORE.into(), issued_at.unix_timestamp().into());
    payload.insert(claim_types::EXPIRES_AT.into(), expires_at.unix_timestamp().into());

    if let Some(presenter) = properties.presenters.first() {
        if properties.presenters.len() > 1 {
            context.diagnostics.warning(&format!(
                "Multiple presenters were associated with the {} ticket; only the first one is embedded as azp",
                kind
            ));
        }
        payload.insert(claim_types::AUTHORIZED_PARTY.into(), presenter.as_str().into());
    }

    if kind == TokenUsage::IdentityToken {
        let algorithm = context.signing_credentials.algorithm;
        if let Some(nonce) = context.nonce {
            payload.insert(claim_types::NONCE.into(), nonce.into());
        }
        if let Some(code) = context.authorization_code {
            payload.insert(claim_types::CODE_HASH.into(), algorithm.left_half_hash(code).into());
        }
        if let Some(access_token) = context.access_token {
            payload.insert(
                claim_types::ACCESS_TOKEN_HASH.into(),
                algorithm.left_half_hash(access_token).into(),
            );
        }
    }

    if let Some(actor) = identity.actor.as_deref() {
        payload.insert(claim_types::ACTOR.into(), Value::Object(actor_payload(actor)));
    }

    if kind == TokenUsage::RefreshToken {
        let destinations = destinations_payload(&identity.claims);
        if !destinations.is_empty() {
            payload.insert(claim_types::DESTINATIONS.into(), Value::Object(destinations));
        }
    }

    Ok(payload)
}

/// Removes host claims whose type collides with a claim the engine writes,
/// in the identity and its actors.
fn drop_reserved_claims(
    identity: &mut ClaimsIdentity,
    kind: TokenUsage,
    diagnostics: &dyn Diagnostics,
) {
    identity.claims.retain(|claim| {
        if !is_reserved(&claim.claim_type) {
            return true;
        }
        diagnostics.warning(&format!(
            "The claim '{}' uses a reserved name and was not embedded into the {}",
            claim.claim_type, kind
        ));
        false
    });

    if let Some(actor) = identity.actor.as_deref_mut() {
        drop_reserved_claims(actor, kind, diagnostics);
    }
}

/// Destination sets per claim type, one entry per occurrence in claim order.
/// Types without any destination are left out.
fn destinations_payload(claims: &[Claim]) -> Map<String, Value> {
    let mut payload = Map::new();
    for claim in claims.iter().filter(|c| !c.is_subject()) {
        let destinations = Value::Array(
            claim
                .destinations
                .iter()
                .map(|d| Value::String(d.clone()))
                .collect(),
        );
        match payload.get_mut(&claim.claim_type) {
            Some(Value::Array(entries)) => entries.push(destinations),
            _ => {
                payload.insert(claim.claim_type.clone(), Value::Array(vec![destinations]));
            }
        }
    }

    payload.retain(|_, entries| {
        entries.as_array().is_some_and(|entries| {
            entries
                .iter()
                .any(|entry| entry.as_array().is_some_and(|d| !d.is_empty()))
        })
    });
    payload
}

/// Ensures `sub` comes first and drops the name identifier duplicate.
fn normalize_subject(identity: &mut ClaimsIdentity) {
    if !identity.has_claim(claim_types::SUBJECT) {
        if let Some(value) = identity
            .find_first(claim_types::NAME_IDENTIFIER)
            .map(|c| c.value.clone())
        {
            identity
                .claims
                .insert(0, Claim::new(claim_types::SUBJECT, value));
        }
    }
    identity.remove_claims(claim_types::NAME_IDENTIFIER);
}

fn actor_payload(actor: &ClaimsIdentity) -> Map<String, Value> {
    let mut actor = actor.clone();
    normalize_subject(&mut actor);

    let mut payload = group_claims(&actor.claims);
    if let Some(nested) = actor.actor.as_deref() {
        payload.insert(claim_types::ACTOR.into(), Value::Object(actor_payload(nested)));
    }
    payload
}

/// Groups claims by type, preserving first-occurrence order.
fn group_claims(claims: &[Claim]) -> Map<String, Value> {
    let mut payload = Map::new();
    for claim in claims {
        let value = Value::String(claim.value.clone());
        match payload.get_mut(&claim.claim_type) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                payload.insert(claim.claim_type.clone(), value);
            }
        }
    }
    payload
}

/// Reads a validated claims payload back into a ticket.
///
/// Returns `None` when a reserved claim is malformed (unknown usage,
/// non-numeric timestamps).
#[must_use]
pub fn read_ticket(payload: &Map<String, Value>) -> Option<AuthenticationTicket> {
    let mut ticket = AuthenticationTicket::new(ClaimsIdentity::new());
    let properties = &mut ticket.properties;

    for (name, value) in payload {
        match name.as_str() {
            claim_types::USAGE => properties.usage = Some(value.as_str()?.parse().ok()?),
            claim_types::ISSUED_AT => properties.issued_at = Some(read_timestamp(value)?),
            claim_types::EXPIRES_AT => properties.expires_at = Some(read_timestamp(value)?),
            claim_types::AUDIENCE => {
                for audience in string_values(value) {
                    properties.add_audience(audience);
                }
            }
            claim_types::AUTHORIZED_PARTY => {
                for presenter in string_values(value) {
                    properties.add_presenter(presenter);
                }
            }
            claim_types::SCOPE => {
                for scope in string_values(value) {
                    properties.add_scope(scope);
                }
            }
            claim_types::CONFIDENTIAL => {
                properties.confidential =
                    matches!(value, Value::Bool(true)) || value.as_str() == Some("true");
            }
            claim_types::NONCE => properties.nonce = value.as_str().map(str::to_string),
            _ => {}
        }
    }

    ticket.identity = read_identity(payload);
    if let Some(Value::Object(destinations)) = payload.get(claim_types::DESTINATIONS) {
        apply_destinations(&mut ticket.identity, destinations);
    }
    Some(ticket)
}

/// Restores destinations written by [`destinations_payload`], matching the
/// n-th entry of a type to the n-th claim of that type.
fn apply_destinations(identity: &mut ClaimsIdentity, destinations: &Map<String, Value>) {
    for (claim_type, entries) in destinations {
        let Value::Array(entries) = entries else {
            continue;
        };
        let claims = identity
            .claims
            .iter_mut()
            .filter(|claim| &claim.claim_type == claim_type);
        for (claim, entry) in claims.zip(entries) {
            claim.destinations.extend(string_values(entry));
        }
    }
}

fn read_identity(payload: &Map<String, Value>) -> ClaimsIdentity {
    let mut identity = ClaimsIdentity::new();

    for (name, value) in payload {
        match name.as_str() {
            claim_types::SUBJECT => {
                for subject in string_values(value) {
                    identity.add_claim(Claim::new(claim_types::NAME_IDENTIFIER, subject));
                }
            }
            claim_types::ACTOR => {
                if let Value::Object(actor) = value {
                    identity.actor = Some(Box::new(read_identity(actor)));
                }
            }
            name if is_reserved(name) => {}
            _ => {
                for item in string_values(value) {
                    identity.add_claim(Claim::new(name.as_str(), item));
                }
            }
        }
    }

    identity
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        claim_types::USAGE
            | claim_types::ISSUED_AT
            | claim_types::EXPIRES_AT
            | claim_types::NOT_BEFORE
            | claim_types::ISSUER
            | claim_types::AUDIENCE
            | claim_types::AUTHORIZED_PARTY
            | claim_types::SCOPE
            | claim_types::CONFIDENTIAL
            | claim_types::NONCE
            | claim_types::CODE_HASH
            | claim_types::ACCESS_TOKEN_HASH
            | claim_types::ACTOR
            | claim_types::DESTINATIONS
    )
}

fn read_timestamp(value: &Value) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(value.as_i64()?).ok()
}

/// Flattens a claim value: arrays expand, non-strings use their JSON text.
fn string_values(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().flat_map(string_values).collect(),
        Value::String(s) => vec![s.clone()],
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::Duration;
    use time::macros::datetime;

    use super::*;
    use crate::crypto::SigningAlgorithm;
    use crate::diagnostics::DiagnosticLevel;
    use crate::diagnostics::testing::RecordingDiagnostics;

    const ISSUER: &str = "https://auth.example.com";

    fn credentials() -> SigningCredentials {
        SigningCredentials::generate_rsa(SigningAlgorithm::RS256).unwrap()
    }

    fn ticket() -> AuthenticationTicket {
        let identity = ClaimsIdentity::new()
            .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "alice"))
            .with_claim(Claim::new("role", "admin"))
            .with_claim(Claim::new("role", "nurse"));
        let mut ticket = AuthenticationTicket::new(identity);
        let issued_at = datetime!(2024-01-01 00:00 UTC);
        ticket.properties.issued_at = Some(issued_at);
        ticket.properties.expires_at = Some(issued_at + Duration::hours(1));
        ticket.properties.add_audience("https://fhir.example.com");
        ticket.properties.add_presenter("client-a");
        ticket.properties.add_scope("openid");
        ticket.properties.add_scope("patient/*.read");
        ticket
    }

    fn context<'a>(
        kind: TokenUsage,
        credentials: &'a SigningCredentials,
        diagnostics: &'a RecordingDiagnostics,
    ) -> TokenBuildContext<'a> {
        TokenBuildContext {
            kind,
            issuer: ISSUER,
            signing_credentials: credentials,
            encrypting_credentials: None,
            nonce: None,
            authorization_code: None,
            access_token: None,
            diagnostics,
        }
    }

    #[test]
    fn test_access_token_payload() {
        let credentials = credentials();
        let diagnostics = RecordingDiagnostics::default();
        let payload =
            build_payload(&ticket(), &context(TokenUsage::AccessToken, &credentials, &diagnostics))
                .unwrap();

        let keys: Vec<&str> = payload.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "sub", "role", "usage", "scope", "aud", "iss", "iat", "nbf", "exp", "azp"
            ]
        );
        assert_eq!(payload["sub"], "alice");
        assert_eq!(payload["role"], json!(["admin", "nurse"]));
        assert_eq!(payload["usage"], "access_token");
        assert_eq!(payload["scope"], json!(["openid", "patient/*.read"]));
        assert_eq!(payload["aud"], "https://fhir.example.com");
        assert_eq!(payload["iat"], 1_704_067_200);
        assert_eq!(payload["exp"], 1_704_070_800);
        assert_eq!(payload["azp"], "client-a");
        assert!(!payload.contains_key(claim_types::NAME_IDENTIFIER));
        assert!(!payload.contains_key("nonce"));
    }

    #[test]
    fn test_confidential_only_when_set() {
        let credentials = credentials();
        let diagnostics = RecordingDiagnostics::default();
        let mut ticket = ticket();

        let payload =
            build_payload(&ticket, &context(TokenUsage::AccessToken, &credentials, &diagnostics))
                .unwrap();
        assert!(!payload.contains_key("confidential"));

        ticket.properties.confidential = true;
        let payload =
            build_payload(&ticket, &context(TokenUsage::AccessToken, &credentials, &diagnostics))
                .unwrap();
        assert_eq!(payload["confidential"], "true");
    }

    #[test]
    fn test_identity_token_payload() {
        let credentials = credentials();
        let diagnostics = RecordingDiagnostics::default();
        let mut context = context(TokenUsage::IdentityToken, &credentials, &diagnostics);
        context.nonce = Some("n-0S6_WzA2Mj");
        context.authorization_code = Some("abc123");
        context.access_token = Some("access");

        let payload = build_payload(&ticket(), &context).unwrap();

        // identity token audience is the client
        assert_eq!(payload["aud"], "client-a");
        assert!(!payload.contains_key("scope"));
        assert_eq!(payload["nonce"], "n-0S6_WzA2Mj");
        assert_eq!(
            payload["c_hash"],
            SigningAlgorithm::RS256.left_half_hash("abc123")
        );
        assert_eq!(
            payload["at_hash"],
            SigningAlgorithm::RS256.left_half_hash("access")
        );
    }

    #[test]
    fn test_multiple_presenters_warn() {
        let credentials = credentials();
        let diagnostics = RecordingDiagnostics::default();
        let mut ticket = ticket();
        ticket.properties.add_presenter("client-b");
        ticket.properties.add_presenter("client-c");

        let payload =
            build_payload(&ticket, &context(TokenUsage::AccessToken, &credentials, &diagnostics))
                .unwrap();

        assert_eq!(payload["azp"], "client-a");
        assert_eq!(diagnostics.count(DiagnosticLevel::Warning), 1);
    }

    #[test]
    fn test_missing_timestamps_is_internal_error() {
        let credentials = credentials();
        let diagnostics = RecordingDiagnostics::default();
        let mut ticket = ticket();
        ticket.properties.expires_at = None;

        let err =
            build_payload(&ticket, &context(TokenUsage::AccessToken, &credentials, &diagnostics))
                .unwrap_err();
        assert!(matches!(err, TokenServerError::Internal { .. }));
    }

    #[test]
    fn test_identity_token_requires_subject() {
        let credentials = credentials();
        let diagnostics = RecordingDiagnostics::default();
        let mut ticket = ticket();
        ticket.identity.remove_claims(claim_types::NAME_IDENTIFIER);

        let err = build_payload(
            &ticket,
            &context(TokenUsage::IdentityToken, &credentials, &diagnostics),
        )
        .unwrap_err();
        assert!(matches!(err, TokenServerError::InvalidTicket { .. }));
    }

    #[test]
    fn test_actor_payload() {
        let credentials = credentials();
        let diagnostics = RecordingDiagnostics::default();
        let mut ticket = ticket();
        ticket.identity.actor = Some(Box::new(
            ClaimsIdentity::new().with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "service")),
        ));

        let payload =
            build_payload(&ticket, &context(TokenUsage::AccessToken, &credentials, &diagnostics))
                .unwrap();
        assert_eq!(payload["act"], json!({ "sub": "service" }));
    }

    #[test]
    fn test_read_ticket() {
        let credentials = credentials();
        let diagnostics = RecordingDiagnostics::default();
        let mut original = ticket();
        original.properties.confidential = true;
        original.identity.actor = Some(Box::new(
            ClaimsIdentity::new().with_claim(Claim::new(claim_types::SUBJECT, "service")),
        ));

        let payload = build_payload(
            &original,
            &context(TokenUsage::AccessToken, &credentials, &diagnostics),
        )
        .unwrap();
        let restored = read_ticket(&payload).unwrap();

        assert_eq!(restored.usage(), Some(TokenUsage::AccessToken));
        assert_eq!(restored.identity.subject(), Some("alice"));
        assert_eq!(restored.identity.find_all("role").count(), 2);
        assert_eq!(restored.properties.scopes, original.properties.scopes);
        assert_eq!(restored.properties.audiences, original.properties.audiences);
        assert_eq!(restored.properties.presenters, original.properties.presenters);
        assert_eq!(restored.properties.issued_at, original.properties.issued_at);
        assert_eq!(restored.properties.expires_at, original.properties.expires_at);
        assert!(restored.properties.confidential);
        assert!(!restored.identity.has_claim("usage"));
        assert!(!restored.identity.has_claim("iss"));
        assert_eq!(
            restored.identity.actor.unwrap().subject(),
            Some("service")
        );
    }

    #[test]
    fn test_read_ticket_rejects_unknown_usage() {
        let payload = match json!({ "sub": "alice", "usage": "session" }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert!(read_ticket(&payload).is_none());
    }

    #[test]
    fn test_read_ticket_stringifies_values() {
        let payload = match json!({ "sub": "alice", "age": 42, "verified": true }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let ticket = read_ticket(&payload).unwrap();
        assert_eq!(ticket.identity.find_first("age").unwrap().value, "42");
        assert_eq!(ticket.identity.find_first("verified").unwrap().value, "true");
    }

    #[test]
    fn test_reserved_host_claims_are_dropped() {
        let credentials = credentials();
        let diagnostics = RecordingDiagnostics::default();
        let mut ticket = ticket();
        ticket.identity.add_claim(
            Claim::new(claim_types::USAGE, "patient-portal").with_destination("access_token"),
        );
        ticket
            .identity
            .add_claim(Claim::new(claim_types::EXPIRES_AT, "never"));

        let payload =
            build_payload(&ticket, &context(TokenUsage::AccessToken, &credentials, &diagnostics))
                .unwrap();

        assert_eq!(payload["usage"], "access_token");
        assert_eq!(payload["exp"], 1_704_070_800);
        assert_eq!(diagnostics.count(DiagnosticLevel::Warning), 2);

        let restored = read_ticket(&payload).unwrap();
        assert_eq!(restored.usage(), Some(TokenUsage::AccessToken));
    }

    #[test]
    fn test_refresh_token_keeps_scopes_and_destinations() {
        let credentials = credentials();
        let diagnostics = RecordingDiagnostics::default();
        let mut original = ticket();
        original.identity = ClaimsIdentity::new()
            .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "alice"))
            .with_claim(Claim::new("role", "admin").with_destination("access_token"))
            .with_claim(Claim::new("role", "nurse"))
            .with_claim(
                Claim::new("email", "alice@example.com")
                    .with_destinations(["access_token", "id_token"]),
            )
            .with_claim(Claim::new("internal", "x"));
        original.properties.confidential = true;

        let payload = build_payload(
            &original,
            &context(TokenUsage::RefreshToken, &credentials, &diagnostics),
        )
        .unwrap();
        assert_eq!(payload["scope"], json!(["openid", "patient/*.read"]));
        assert_eq!(
            payload["destinations"],
            json!({
                "role": [["access_token"], []],
                "email": [["access_token", "id_token"]]
            })
        );

        let restored = read_ticket(&payload).unwrap();
        assert_eq!(restored.usage(), Some(TokenUsage::RefreshToken));
        assert_eq!(restored.properties.scopes, original.properties.scopes);
        assert!(restored.properties.confidential);
        assert!(!restored.identity.has_claim("destinations"));

        let roles: Vec<&Claim> = restored.identity.find_all("role").collect();
        assert_eq!(roles.len(), 2);
        assert!(roles[0].has_destination("access_token"));
        assert!(roles[1].destinations.is_empty());
        let email = restored.identity.find_first("email").unwrap();
        assert!(email.has_destination("access_token"));
        assert!(email.has_destination("id_token"));
        assert!(restored.identity.find_first("internal").unwrap().destinations.is_empty());
    }

    #[test]
    fn test_access_token_carries_no_destinations() {
        let credentials = credentials();
        let diagnostics = RecordingDiagnostics::default();
        let mut ticket = ticket();
        ticket
            .identity
            .add_claim(Claim::new("tenant", "north").with_destination("access_token"));

        let payload =
            build_payload(&ticket, &context(TokenUsage::AccessToken, &credentials, &diagnostics))
                .unwrap();
        assert!(!payload.contains_key("destinations"));
    }
}
