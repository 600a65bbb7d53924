//! Value types shared by every engine component.
//!
//! - [`AuthenticationTicket`] - identity plus properties behind every token
//! - [`Claim`] / [`ClaimsIdentity`] - claims with destination tags
//! - [`TokenUsage`] - the kind tag checked on every deserialization
//! - [`OpenIdConnectRequest`] / [`OpenIdConnectResponse`] - protocol values

pub mod claim;
pub mod request;
pub mod ticket;

pub use claim::{Claim, ClaimsIdentity, claim_types};
pub use request::{OpenIdConnectRequest, OpenIdConnectResponse, grant_types, scopes};
pub use ticket::{AuthenticationTicket, TicketProperties, TokenUsage};
