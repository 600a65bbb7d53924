//! Claims filter.
//!
//! Access and identity tokens only carry the claims whose destinations name
//! them, plus the subject. Codes and refresh tokens are read back by this
//! server alone and keep every claim.

use crate::types::{AuthenticationTicket, ClaimsIdentity, TokenUsage};

/// Returns a copy of `ticket` whose identity is redacted for `kind`.
///
/// Claim order is preserved and the actor identity is filtered the same way.
/// The input ticket is left untouched.
#[must_use]
pub fn filter_for_kind(ticket: &AuthenticationTicket, kind: TokenUsage) -> AuthenticationTicket {
    if !kind.is_filtered() {
        return ticket.clone();
    }

    AuthenticationTicket {
        identity: filter_identity(&ticket.identity, kind),
        properties: ticket.properties.clone(),
    }
}

fn filter_identity(identity: &ClaimsIdentity, kind: TokenUsage) -> ClaimsIdentity {
    ClaimsIdentity {
        claims: identity
            .claims
            .iter()
            .filter(|claim| claim.is_subject() || claim.has_destination(kind.as_str()))
            .cloned()
            .collect(),
        actor: identity
            .actor
            .as_deref()
            .map(|actor| Box::new(filter_identity(actor, kind))),
    }
}
