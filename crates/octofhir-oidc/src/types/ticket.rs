//! Authentication tickets.
//!
//! A ticket is the engine's canonical record behind every token kind: an
//! identity plus a property bag. Each issuance works on its own ticket copy;
//! tickets are never shared between concurrent requests.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::claim::ClaimsIdentity;

/// The kind tag stored on every ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TokenUsage {
    /// Authorization code.
    #[serde(rename = "authorization_code")]
    AuthorizationCode,
    /// Access token.
    #[serde(rename = "access_token")]
    AccessToken,
    /// OpenID Connect identity token.
    #[serde(rename = "id_token")]
    IdentityToken,
    /// Refresh token.
    #[serde(rename = "refresh_token")]
    RefreshToken,
}

impl TokenUsage {
    /// All kinds, in the order they are issued within one response.
    pub const ALL: [TokenUsage; 4] = [
        Self::AuthorizationCode,
        Self::AccessToken,
        Self::IdentityToken,
        Self::RefreshToken,
    ];

    /// Returns the textual tag, also used as the claim destination.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::AccessToken => "access_token",
            Self::IdentityToken => "id_token",
            Self::RefreshToken => "refresh_token",
        }
    }

    /// Returns `true` for kinds whose claims are redacted by destination.
    #[must_use]
    pub fn is_filtered(&self) -> bool {
        matches!(self, Self::AccessToken | Self::IdentityToken)
    }
}

impl fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenUsage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "access_token" => Ok(Self::AccessToken),
            "id_token" => Ok(Self::IdentityToken),
            "refresh_token" => Ok(Self::RefreshToken),
            other => Err(format!("unknown token usage '{other}'")),
        }
    }
}

/// Ticket properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketProperties {
    /// When the ticket was issued.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub issued_at: Option<OffsetDateTime>,

    /// When the ticket expires. Always resolved once serialization completes.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub expires_at: Option<OffsetDateTime>,

    /// Kind tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,

    /// Audiences, in insertion order.
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    pub audiences: IndexSet<String>,

    /// Client identifiers allowed to present the token, in insertion order.
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    pub presenters: IndexSet<String>,

    /// Granted scopes.
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    pub scopes: IndexSet<String>,

    /// Set when the token was issued to a confidential client.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub confidential: bool,

    /// Nonce from the authorization request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Redirect URI of the authorization request (authorization codes only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Per-ticket lifetime overrides, keyed by kind.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lifetimes: BTreeMap<TokenUsage, Duration>,

    /// Free-form host properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub items: BTreeMap<String, String>,
}

impl TicketProperties {
    /// Appends an audience unless already present.
    pub fn add_audience(&mut self, audience: impl Into<String>) {
        self.audiences.insert(audience.into());
    }

    /// Appends a presenter unless already present.
    pub fn add_presenter(&mut self, presenter: impl Into<String>) {
        self.presenters.insert(presenter.into());
    }

    /// Appends a scope unless already present.
    pub fn add_scope(&mut self, scope: impl Into<String>) {
        self.scopes.insert(scope.into());
    }

    /// Returns `true` if the scope was granted.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Returns the per-ticket lifetime override for a kind.
    #[must_use]
    pub fn lifetime(&self, kind: TokenUsage) -> Option<Duration> {
        self.lifetimes.get(&kind).copied()
    }

    /// Overrides the lifetime for a kind.
    pub fn set_lifetime(&mut self, kind: TokenUsage, lifetime: Duration) {
        self.lifetimes.insert(kind, lifetime);
    }
}

/// Identity plus properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationTicket {
    /// Who the ticket is about.
    pub identity: ClaimsIdentity,

    /// What the ticket grants.
    #[serde(default)]
    pub properties: TicketProperties,
}

impl AuthenticationTicket {
    /// Creates a ticket with empty properties.
    #[must_use]
    pub fn new(identity: ClaimsIdentity) -> Self {
        Self {
            identity,
            properties: TicketProperties::default(),
        }
    }

    /// Replaces the properties, builder style.
    #[must_use]
    pub fn with_properties(mut self, properties: TicketProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Returns the kind tag.
    #[must_use]
    pub fn usage(&self) -> Option<TokenUsage> {
        self.properties.usage
    }

    /// Returns `true` if the ticket carries the given kind tag.
    #[must_use]
    pub fn is_kind(&self, kind: TokenUsage) -> bool {
        self.properties.usage == Some(kind)
    }

    /// Returns `true` if the ticket has expired at `now`.
    ///
    /// Tickets without an expiration never expire.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.properties
            .expires_at
            .map(|expires_at| expires_at <= now)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::claim::{Claim, claim_types};
    use time::macros::datetime;

    #[test]
    fn test_token_usage_round_trips_through_str() {
        for kind in TokenUsage::ALL {
            assert_eq!(kind.as_str().parse::<TokenUsage>().unwrap(), kind);
        }
        assert!("bearer".parse::<TokenUsage>().is_err());
    }

    #[test]
    fn test_token_usage_serde_names() {
        let json = serde_json::to_string(&TokenUsage::IdentityToken).unwrap();
        assert_eq!(json, "\"id_token\"");
    }

    #[test]
    fn test_filtered_kinds() {
        assert!(TokenUsage::AccessToken.is_filtered());
        assert!(TokenUsage::IdentityToken.is_filtered());
        assert!(!TokenUsage::AuthorizationCode.is_filtered());
        assert!(!TokenUsage::RefreshToken.is_filtered());
    }

    #[test]
    fn test_presenters_keep_insertion_order_without_duplicates() {
        let mut properties = TicketProperties::default();
        properties.add_presenter("b");
        properties.add_presenter("a");
        properties.add_presenter("b");
        let presenters: Vec<_> = properties.presenters.iter().cloned().collect();
        assert_eq!(presenters, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_expiration() {
        let mut ticket = AuthenticationTicket::default();
        let now = datetime!(2024-01-01 12:00 UTC);
        assert!(!ticket.is_expired_at(now));

        ticket.properties.expires_at = Some(now);
        assert!(ticket.is_expired_at(now));

        ticket.properties.expires_at = Some(datetime!(2024-01-01 13:00 UTC));
        assert!(!ticket.is_expired_at(now));
    }

    #[test]
    fn test_ticket_json_round_trip() {
        let mut properties = TicketProperties {
            issued_at: Some(datetime!(2024-01-01 12:00 UTC)),
            usage: Some(TokenUsage::RefreshToken),
            confidential: true,
            ..Default::default()
        };
        properties.add_scope("openid");
        properties.set_lifetime(TokenUsage::AccessToken, Duration::from_secs(60));

        let ticket = AuthenticationTicket::new(
            ClaimsIdentity::new()
                .with_claim(Claim::new(claim_types::NAME_IDENTIFIER, "alice"))
                .with_actor(ClaimsIdentity::new().with_claim(Claim::new("sub", "svc"))),
        )
        .with_properties(properties);

        let json = serde_json::to_string(&ticket).unwrap();
        let parsed: AuthenticationTicket = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ticket);
    }
}
