//! Token formats.
//!
//! - [`filter`]: claim redaction by destination
//! - [`protector`]: opaque format (codes, refresh tokens, default access tokens)
//! - [`builder`]: self-contained payload construction and its inverse
//! - [`handler`] / [`jwt`]: signing and encryption of self-contained tokens

pub mod builder;
pub mod error;
pub mod filter;
pub mod handler;
pub mod jwt;
pub mod protector;

pub use builder::{TokenBuildContext, build_payload, build_token, read_ticket};
pub use error::SecurityTokenError;
pub use filter::filter_for_kind;
pub use handler::{SecurityTokenDescriptor, SecurityTokenHandler, TokenValidationParameters};
pub use jwt::JwtSecurityTokenHandler;
pub use protector::{AesGcmTicketProtector, TicketProtector};
