//! # octofhir-oidc
//!
//! OpenID Connect / OAuth 2.0 token lifecycle engine for the OctoFHIR server.
//!
//! This crate provides:
//! - Authentication tickets with destination-tagged claims
//! - Authorization codes backed by a single-use store
//! - Opaque (AES-GCM protected) and self-contained (JWT/JWE) tokens
//! - `c_hash` / `at_hash` binding of identity tokens to their response
//! - Host hooks around every serialize and deserialize operation
//!
//! ## Overview
//!
//! [`TokenServer`] turns an authenticated ticket into the artifacts of a
//! protocol response and reads them back. It never fails a request for an
//! invalid client-supplied token: such tokens read as `None` and are
//! reported through [`Diagnostics`](diagnostics::Diagnostics).
//!
//! ## Modules
//!
//! - [`types`] - Tickets, claims and protocol request/response values
//! - [`config`] - Issuer, lifetimes and code key configuration
//! - [`crypto`] - Signing and encrypting credentials, certificates
//! - [`token`] - Claims filter, opaque protector, JWT handler and builder
//! - [`notifications`] - Host hooks
//! - [`storage`] - Single-use authorization code store
//! - [`server`] - The orchestrator
//! - [`clock`] / [`diagnostics`] - Time source and diagnostics sink

pub mod clock;
pub mod config;
pub mod crypto;
pub mod diagnostics;
pub mod error;
pub mod notifications;
pub mod server;
pub mod storage;
pub mod token;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, TokenServerConfig};
pub use crypto::{
    Certificate, EncryptingCredentials, SigningAlgorithm, SigningCredentials, infer_key_id,
};
pub use diagnostics::{DiagnosticLevel, Diagnostics, TracingDiagnostics};
pub use error::{ErrorCategory, TokenServerError};
pub use notifications::{
    DefaultNotifications, DeserializeContext, DeserializeOutcome, DeserializeParameters,
    NotificationError, SerializeContext, SerializeOutcome, SerializeParameters,
    TokenNotifications,
};
pub use server::{IssuedToken, TokenFormat, TokenFormats, TokenServer, TokenServerOptions};
pub use storage::{CodeStore, InMemoryCodeStore};
pub use token::{
    AesGcmTicketProtector, JwtSecurityTokenHandler, SecurityTokenError, SecurityTokenHandler,
    TicketProtector,
};
pub use types::{
    AuthenticationTicket, Claim, ClaimsIdentity, OpenIdConnectRequest, OpenIdConnectResponse,
    TicketProperties, TokenUsage,
};

/// Type alias for token server results.
pub type ServerResult<T> = Result<T, TokenServerError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use octofhir_oidc::prelude::*;
/// ```
pub mod prelude {
    pub use crate::ServerResult;
    pub use crate::clock::{Clock, FixedClock, SystemClock};
    pub use crate::config::{ConfigError, TokenServerConfig};
    pub use crate::crypto::{EncryptingCredentials, SigningAlgorithm, SigningCredentials};
    pub use crate::diagnostics::{DiagnosticLevel, Diagnostics};
    pub use crate::error::{ErrorCategory, TokenServerError};
    pub use crate::notifications::{
        DeserializeContext, DeserializeOutcome, NotificationError, SerializeContext,
        SerializeOutcome, TokenNotifications,
    };
    pub use crate::server::{TokenFormat, TokenFormats, TokenServer, TokenServerOptions};
    pub use crate::storage::{CodeStore, InMemoryCodeStore};
    pub use crate::token::{AesGcmTicketProtector, JwtSecurityTokenHandler, TicketProtector};
    pub use crate::types::{
        AuthenticationTicket, Claim, ClaimsIdentity, OpenIdConnectRequest,
        OpenIdConnectResponse, TokenUsage, claim_types, grant_types, scopes,
    };
}
