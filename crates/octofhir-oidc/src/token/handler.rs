//! Security token handler seam.
//!
//! A handler turns a claims payload into a self-contained wire string and
//! back. [`JwtSecurityTokenHandler`](super::jwt::JwtSecurityTokenHandler) is
//! the built-in implementation; hosts may plug in their own format.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::error::SecurityTokenError;
use crate::crypto::{EncryptingCredentials, SigningCredentials};

/// Everything a handler needs to write one token.
#[derive(Clone, Copy)]
pub struct SecurityTokenDescriptor<'a> {
    /// Payload claims, in wire order.
    pub claims: &'a Map<String, Value>,

    /// `kid` header value.
    pub key_id: Option<&'a str>,

    /// `x5t` header value.
    pub x5t: Option<&'a str>,

    /// Credential used to sign the token.
    pub signing_credentials: &'a SigningCredentials,

    /// Credential used to encrypt the signed token, if any.
    pub encrypting_credentials: Option<&'a EncryptingCredentials>,
}

/// Everything a handler needs to read one token.
#[derive(Clone, Copy)]
pub struct TokenValidationParameters<'a> {
    /// Expected `iss` value.
    pub issuer: &'a str,

    /// Candidate verification credentials, in preference order.
    pub signing_credentials: &'a [Arc<SigningCredentials>],

    /// Credential used to decrypt encrypted tokens, if any.
    pub decrypting_credentials: Option<&'a EncryptingCredentials>,
}

/// Writes and reads self-contained tokens.
pub trait SecurityTokenHandler: Send + Sync {
    /// Serializes, signs and optionally encrypts a token.
    ///
    /// # Errors
    /// Returns an error if signing or encryption fails.
    fn create_token(
        &self,
        descriptor: &SecurityTokenDescriptor<'_>,
    ) -> Result<String, SecurityTokenError>;

    /// Decrypts (if needed), verifies and returns the payload claims.
    ///
    /// Lifetime claims are not checked here; the caller validates them
    /// against its own clock.
    ///
    /// # Errors
    /// Returns an error if the token is malformed, cannot be decrypted,
    /// has an invalid signature or a wrong issuer.
    fn validate_token(
        &self,
        token: &str,
        parameters: &TokenValidationParameters<'_>,
    ) -> Result<Map<String, Value>, SecurityTokenError>;
}
