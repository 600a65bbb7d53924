//! X.509 certificates attached to signing credentials.
//!
//! The engine never parses certificate contents. It only hashes the DER
//! encoding to derive the `kid` and `x5t` values.

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use sha1::{Digest, Sha1};

use crate::token::SecurityTokenError;

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// A DER-encoded X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Wraps DER-encoded certificate bytes.
    #[must_use]
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self { der: der.into() }
    }

    /// Loads the first certificate of a PEM bundle.
    ///
    /// # Errors
    /// Returns an error if no certificate block is present or it is not valid base64.
    pub fn from_pem(pem: &str) -> Result<Self, SecurityTokenError> {
        let start = pem
            .find(PEM_BEGIN)
            .ok_or_else(|| SecurityTokenError::invalid_key("Missing certificate PEM header"))?
            + PEM_BEGIN.len();
        let end = pem[start..]
            .find(PEM_END)
            .ok_or_else(|| SecurityTokenError::invalid_key("Missing certificate PEM footer"))?
            + start;

        let body: String = pem[start..end]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let der = STANDARD
            .decode(body)
            .map_err(|e| SecurityTokenError::invalid_key(format!("Invalid certificate PEM: {e}")))?;

        Ok(Self { der })
    }

    /// Returns the DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the SHA-1 hash of the DER encoding.
    #[must_use]
    pub fn sha1_hash(&self) -> [u8; 20] {
        Sha1::digest(&self.der).into()
    }

    /// Returns the certificate thumbprint as uppercase hex.
    #[must_use]
    pub fn thumbprint(&self) -> String {
        hex::encode_upper(self.sha1_hash())
    }

    /// Returns the `x5t` header value (base64url SHA-1 hash).
    #[must_use]
    pub fn x5t(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.sha1_hash())
    }
}
