//! JWT security token handler.
//!
//! Writes signed JWTs (RS256, RS384, RS512, ES384) with `jsonwebtoken` and,
//! when an encrypting credential is configured, wraps them into a compact
//! JWE.
//!
//! ## Example
//!
//! ```ignore
//! use octofhir_oidc::crypto::{SigningAlgorithm, SigningCredentials};
//! use octofhir_oidc::token::{JwtSecurityTokenHandler, SecurityTokenDescriptor};
//!
//! let credentials = SigningCredentials::generate_rsa(SigningAlgorithm::RS256)?;
//! let token = JwtSecurityTokenHandler.create_token(&SecurityTokenDescriptor {
//!     claims: &claims,
//!     key_id: credentials.key_id().as_deref(),
//!     x5t: None,
//!     signing_credentials: &credentials,
//!     encrypting_credentials: None,
//! })?;
//! ```

use std::sync::Arc;

use jsonwebtoken::{Header, Validation, decode, decode_header, encode};
use serde_json::{Map, Value};

use super::error::SecurityTokenError;
use super::handler::{SecurityTokenDescriptor, SecurityTokenHandler, TokenValidationParameters};
use crate::crypto::SigningCredentials;

/// Number of segments in a compact JWE.
const JWE_SEGMENTS: usize = 5;

/// Handler producing and reading JWT/JWE tokens.
///
/// Stateless and thread-safe (`Send + Sync`); share it behind an `Arc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtSecurityTokenHandler;

impl JwtSecurityTokenHandler {
    /// Creates a new handler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn candidate_keys<'a>(
        header: &Header,
        credentials: &'a [Arc<SigningCredentials>],
    ) -> Vec<&'a SigningCredentials> {
        let same_algorithm = credentials
            .iter()
            .map(Arc::as_ref)
            .filter(|c| c.algorithm.to_jwt_algorithm() == header.alg);

        if let Some(kid) = header.kid.as_deref() {
            let matching: Vec<_> = same_algorithm
                .clone()
                .filter(|c| c.key_id().as_deref() == Some(kid))
                .collect();
            if !matching.is_empty() {
                return matching;
            }
        }

        same_algorithm.collect()
    }
}

impl SecurityTokenHandler for JwtSecurityTokenHandler {
    fn create_token(
        &self,
        descriptor: &SecurityTokenDescriptor<'_>,
    ) -> Result<String, SecurityTokenError> {
        let credentials = descriptor.signing_credentials;

        let mut header = Header::new(credentials.algorithm.to_jwt_algorithm());
        header.kid = descriptor.key_id.map(str::to_string);
        header.x5t = descriptor.x5t.map(str::to_string);

        let jwt = encode(&header, descriptor.claims, credentials.encoding_key())
            .map_err(|e| SecurityTokenError::encoding_error(e.to_string()))?;

        match descriptor.encrypting_credentials {
            Some(encrypting) => encrypting.encrypt(&jwt),
            None => Ok(jwt),
        }
    }

    fn validate_token(
        &self,
        token: &str,
        parameters: &TokenValidationParameters<'_>,
    ) -> Result<Map<String, Value>, SecurityTokenError> {
        let jwt = if token.split('.').count() == JWE_SEGMENTS {
            let decrypting = parameters.decrypting_credentials.ok_or_else(|| {
                SecurityTokenError::decryption_error("No decrypting credential configured")
            })?;
            decrypting.decrypt(token)?
        } else {
            token.to_string()
        };

        let header = decode_header(&jwt)?;
        let candidates = Self::candidate_keys(&header, parameters.signing_credentials);
        if candidates.is_empty() {
            return Err(SecurityTokenError::key_not_found(
                header.kid.unwrap_or_else(|| format!("{:?}", header.alg)),
            ));
        }

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[parameters.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        // Lifetime is checked against the engine clock by the caller
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        let mut last_error = SecurityTokenError::InvalidSignature;
        for credentials in candidates {
            match decode::<Map<String, Value>>(&jwt, credentials.decoding_key(), &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => {
                    let error = SecurityTokenError::from(e);
                    // Claim errors do not depend on the key; no other candidate will do better
                    if matches!(error, SecurityTokenError::InvalidClaims { .. }) {
                        return Err(error);
                    }
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }
}
