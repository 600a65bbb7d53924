//! Signing credentials.
//!
//! A signing credential bundles the algorithm, the `jsonwebtoken` keys, the
//! public key material and, optionally, an explicit key identifier and an
//! attached certificate. When no key identifier is configured one is derived
//! with [`infer_key_id`].

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{DecodingKey, EncodingKey};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use p384::pkcs8::EncodePrivateKey as EcEncodePrivateKey;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use time::OffsetDateTime;

use super::algorithm::SigningAlgorithm;
use super::certificate::Certificate;
use crate::token::SecurityTokenError;

/// Number of modulus characters kept when deriving a key identifier from an RSA key.
const MODULUS_KEY_ID_LENGTH: usize = 40;

/// Public key material, kept for key identifier derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeyData {
    /// RSA modulus and exponent (big-endian).
    Rsa {
        /// Modulus.
        n: Vec<u8>,
        /// Public exponent.
        e: Vec<u8>,
    },
    /// EC point coordinates.
    Ec {
        /// X coordinate.
        x: Vec<u8>,
        /// Y coordinate.
        y: Vec<u8>,
    },
}

/// A credential used to sign self-contained tokens.
pub struct SigningCredentials {
    /// Explicit key ID. When absent, [`infer_key_id`] is used.
    pub kid: Option<String>,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// Encoding key (private key) for signing.
    encoding_key: EncodingKey,

    /// Decoding key (public key) for verification.
    decoding_key: DecodingKey,

    /// Public key data.
    public_key_data: PublicKeyData,

    /// Attached certificate.
    certificate: Option<Certificate>,

    /// When the credential was created.
    pub created_at: OffsetDateTime,
}

impl SigningCredentials {
    /// Generates a new RSA credential (2048 bits, no key ID).
    ///
    /// # Errors
    /// Returns an error if key generation fails or algorithm is not RSA-based.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, SecurityTokenError> {
        if !algorithm.is_rsa() {
            return Err(SecurityTokenError::invalid_key(format!(
                "Algorithm {} is not RSA-based",
                algorithm
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| SecurityTokenError::key_generation_error(e.to_string()))?;

        Self::from_rsa_key(algorithm, &private_key)
    }

    /// Builds a credential from an in-memory RSA private key.
    ///
    /// # Errors
    /// Returns an error if the key cannot be exported for `jsonwebtoken`.
    pub fn from_rsa_key(
        algorithm: SigningAlgorithm,
        private_key: &RsaPrivateKey,
    ) -> Result<Self, SecurityTokenError> {
        if !algorithm.is_rsa() {
            return Err(SecurityTokenError::invalid_key(format!(
                "Algorithm {} is not RSA-based",
                algorithm
            )));
        }

        let public_key = private_key.to_public_key();
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();

        let private_pem = rsa::pkcs8::EncodePrivateKey::to_pkcs8_pem(private_key, LineEnding::LF)
            .map_err(|e| SecurityTokenError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| SecurityTokenError::invalid_key(e.to_string()))?;

        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| SecurityTokenError::invalid_key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| SecurityTokenError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid: None,
            algorithm,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Rsa { n, e },
            certificate: None,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Generates a new EC credential on the P-384 curve (no key ID).
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, SecurityTokenError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let signing_key = EcSigningKey::from(&secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| SecurityTokenError::key_generation_error("Missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| SecurityTokenError::key_generation_error("Missing y coordinate"))?;

        // jsonwebtoken only accepts PKCS8 PEM for EC private keys
        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| SecurityTokenError::key_generation_error(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| SecurityTokenError::key_generation_error(e.to_string()))?;

        let x_b64 = URL_SAFE_NO_PAD.encode(x.as_slice());
        let y_b64 = URL_SAFE_NO_PAD.encode(y.as_slice());
        let decoding_key = DecodingKey::from_ec_components(&x_b64, &y_b64)
            .map_err(|e| SecurityTokenError::key_generation_error(e.to_string()))?;

        Ok(Self {
            kid: None,
            algorithm: SigningAlgorithm::ES384,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Ec {
                x: x.to_vec(),
                y: y.to_vec(),
            },
            certificate: None,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Loads a credential from PEM strings.
    ///
    /// RSA keys expect a PKCS8 private key and an SPKI public key; EC keys
    /// expect a SEC1 private key (the public key is derived from it).
    ///
    /// # Errors
    /// Returns an error if the PEM data is invalid.
    pub fn from_pem(
        algorithm: SigningAlgorithm,
        private_pem: &str,
        public_pem: &str,
    ) -> Result<Self, SecurityTokenError> {
        let (encoding_key, decoding_key, public_key_data) = if algorithm.is_rsa() {
            let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
                .map_err(|e| SecurityTokenError::invalid_key(e.to_string()))?;
            let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
                .map_err(|e| SecurityTokenError::invalid_key(e.to_string()))?;

            let public_key = RsaPublicKey::from_public_key_pem(public_pem)
                .map_err(|e| SecurityTokenError::invalid_key(e.to_string()))?;
            let n = public_key.n().to_bytes_be();
            let e = public_key.e().to_bytes_be();

            (encoding_key, decoding_key, PublicKeyData::Rsa { n, e })
        } else {
            let secret_key = EcSecretKey::from_sec1_pem(private_pem)
                .map_err(|e| SecurityTokenError::invalid_key(e.to_string()))?;
            let private_pkcs8 = secret_key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| SecurityTokenError::invalid_key(e.to_string()))?;
            let encoding_key = EncodingKey::from_ec_pem(private_pkcs8.as_bytes())
                .map_err(|e| SecurityTokenError::invalid_key(e.to_string()))?;

            let signing_key = EcSigningKey::from(&secret_key);
            let point = signing_key.verifying_key().to_encoded_point(false);
            let x = point
                .x()
                .ok_or_else(|| SecurityTokenError::invalid_key("Missing x coordinate"))?;
            let y = point
                .y()
                .ok_or_else(|| SecurityTokenError::invalid_key("Missing y coordinate"))?;

            let x_b64 = URL_SAFE_NO_PAD.encode(x.as_slice());
            let y_b64 = URL_SAFE_NO_PAD.encode(y.as_slice());
            let decoding_key = DecodingKey::from_ec_components(&x_b64, &y_b64)
                .map_err(|e| SecurityTokenError::invalid_key(e.to_string()))?;

            (
                encoding_key,
                decoding_key,
                PublicKeyData::Ec {
                    x: x.to_vec(),
                    y: y.to_vec(),
                },
            )
        };

        Ok(Self {
            kid: None,
            algorithm,
            encoding_key,
            decoding_key,
            public_key_data,
            certificate: None,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Sets an explicit key ID.
    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    /// Attaches a certificate.
    #[must_use]
    pub fn with_certificate(mut self, certificate: Certificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    /// Returns the attached certificate.
    #[must_use]
    pub fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    /// Returns the public key material.
    #[must_use]
    pub fn public_key_data(&self) -> &PublicKeyData {
        &self.public_key_data
    }

    /// Returns the RSA modulus, if this is an RSA credential.
    #[must_use]
    pub fn rsa_modulus(&self) -> Option<&[u8]> {
        match &self.public_key_data {
            PublicKeyData::Rsa { n, .. } => Some(n),
            PublicKeyData::Ec { .. } => None,
        }
    }

    /// Returns the key ID written into token headers: explicit or inferred.
    #[must_use]
    pub fn key_id(&self) -> Option<String> {
        self.kid.clone().or_else(|| infer_key_id(self))
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Derives a key identifier for a credential without an explicit one.
///
/// Precedence: the thumbprint of an attached certificate, then, for RSA
/// keys, the first 40 characters of the base64url-encoded modulus in upper
/// case. Other keys get no identifier.
#[must_use]
pub fn infer_key_id(credentials: &SigningCredentials) -> Option<String> {
    if let Some(certificate) = credentials.certificate() {
        return Some(certificate.thumbprint());
    }

    credentials.rsa_modulus().map(|modulus| {
        URL_SAFE_NO_PAD
            .encode(modulus)
            .chars()
            .take(MODULUS_KEY_ID_LENGTH)
            .collect::<String>()
            .to_uppercase()
    })
}
