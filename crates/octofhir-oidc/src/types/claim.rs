//! Claims and claims identities.
//!
//! A claim is a `(type, value, destinations)` triple. Destinations name the
//! token kinds allowed to carry the claim; see [`crate::token::filter`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Well-known claim types used by the engine.
pub mod claim_types {
    /// Subject identifier (`sub`).
    pub const SUBJECT: &str = "sub";
    /// Name identifier claim produced by host sign-in logic. Mapped to `sub` on the wire.
    pub const NAME_IDENTIFIER: &str =
        "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";
    /// Token usage tag.
    pub const USAGE: &str = "usage";
    /// Confidentiality flag, present when the token was issued to a confidential client.
    pub const CONFIDENTIAL: &str = "confidential";
    /// Granted scope, one claim per scope.
    pub const SCOPE: &str = "scope";
    /// Audience.
    pub const AUDIENCE: &str = "aud";
    /// Authorized party (presenter).
    pub const AUTHORIZED_PARTY: &str = "azp";
    /// Issuer.
    pub const ISSUER: &str = "iss";
    /// Issued at.
    pub const ISSUED_AT: &str = "iat";
    /// Not before.
    pub const NOT_BEFORE: &str = "nbf";
    /// Expiration time.
    pub const EXPIRES_AT: &str = "exp";
    /// Nonce from the authorization request.
    pub const NONCE: &str = "nonce";
    /// Authorization code hash.
    pub const CODE_HASH: &str = "c_hash";
    /// Access token hash.
    pub const ACCESS_TOKEN_HASH: &str = "at_hash";
    /// Delegated actor identity.
    pub const ACTOR: &str = "act";
    /// Claim destinations carried by self-contained refresh tokens.
    pub const DESTINATIONS: &str = "destinations";
}

/// A single claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type.
    #[serde(rename = "type")]
    pub claim_type: String,

    /// Claim value.
    pub value: String,

    /// Token kinds allowed to carry this claim (`access_token`, `id_token`, ...).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub destinations: BTreeSet<String>,
}

impl Claim {
    /// Creates a claim without destinations.
    #[must_use]
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            destinations: BTreeSet::new(),
        }
    }

    /// Adds a destination.
    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destinations.insert(destination.into());
        self
    }

    /// Adds several destinations.
    #[must_use]
    pub fn with_destinations<I, S>(mut self, destinations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.destinations
            .extend(destinations.into_iter().map(Into::into));
        self
    }

    /// Returns `true` if the claim may be carried by the given destination.
    #[must_use]
    pub fn has_destination(&self, destination: &str) -> bool {
        self.destinations.contains(destination)
    }

    /// Returns `true` for the subject and name identifier claims.
    #[must_use]
    pub fn is_subject(&self) -> bool {
        self.claim_type == claim_types::SUBJECT || self.claim_type == claim_types::NAME_IDENTIFIER
    }
}

/// An ordered set of claims, optionally acting on behalf of another identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsIdentity {
    /// Claims in insertion order. Order is preserved on the wire.
    pub claims: Vec<Claim>,

    /// Delegated actor identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Box<ClaimsIdentity>>,
}

impl ClaimsIdentity {
    /// Creates an empty identity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a claim, builder style.
    #[must_use]
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    /// Sets the actor identity, builder style.
    #[must_use]
    pub fn with_actor(mut self, actor: ClaimsIdentity) -> Self {
        self.actor = Some(Box::new(actor));
        self
    }

    /// Appends a claim.
    pub fn add_claim(&mut self, claim: Claim) {
        self.claims.push(claim);
    }

    /// Returns the first claim of the given type.
    #[must_use]
    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    /// Returns every claim of the given type, in order.
    pub fn find_all<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a Claim> + 'a {
        self.claims.iter().filter(move |c| c.claim_type == claim_type)
    }

    /// Returns `true` if at least one claim of the given type exists.
    #[must_use]
    pub fn has_claim(&self, claim_type: &str) -> bool {
        self.find_first(claim_type).is_some()
    }

    /// Removes every claim of the given type.
    pub fn remove_claims(&mut self, claim_type: &str) {
        self.claims.retain(|c| c.claim_type != claim_type);
    }

    /// Returns the subject: `sub` if present, else the name identifier.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.find_first(claim_types::SUBJECT)
            .or_else(|| self.find_first(claim_types::NAME_IDENTIFIER))
            .map(|c| c.value.as_str())
    }
}
