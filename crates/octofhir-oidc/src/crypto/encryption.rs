//! Token encryption (compact JWE).
//!
//! Signed tokens can be wrapped in a JWE using AES-256-GCM content
//! encryption. The content encryption key is either the shared key itself
//! (`dir`) or a random key wrapped with RSA-OAEP-256.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::token::SecurityTokenError;

/// Key size for AES-256-GCM (256 bits).
pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-256-GCM (96 bits).
const NONCE_SIZE: usize = 12;

/// Authentication tag size for AES-256-GCM.
const TAG_SIZE: usize = 16;

/// Content encryption algorithm written into every JWE header.
const CONTENT_ENCRYPTION: &str = "A256GCM";

/// Key material behind an encrypting credential.
#[derive(Clone)]
pub enum EncryptionKey {
    /// Shared key used directly as the content encryption key.
    Symmetric([u8; KEY_SIZE]),
    /// RSA key pair wrapping a random content encryption key.
    Rsa {
        /// Public key used when encrypting.
        public: RsaPublicKey,
        /// Private key used when decrypting. Absent for encrypt-only credentials.
        private: Option<RsaPrivateKey>,
    },
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Symmetric(_) => f.write_str("Symmetric([REDACTED])"),
            Self::Rsa { private, .. } => f
                .debug_struct("Rsa")
                .field("has_private", &private.is_some())
                .finish(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JweHeader {
    alg: String,
    enc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

/// A credential used to encrypt self-contained tokens.
#[derive(Debug, Clone)]
pub struct EncryptingCredentials {
    key: EncryptionKey,
    kid: Option<String>,
}

impl EncryptingCredentials {
    /// Creates a `dir` credential from a 256-bit shared key.
    #[must_use]
    pub fn symmetric(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key: EncryptionKey::Symmetric(key),
            kid: None,
        }
    }

    /// Generates a random `dir` credential.
    #[must_use]
    pub fn generate_symmetric() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self::symmetric(key)
    }

    /// Creates an `RSA-OAEP-256` credential that can encrypt and decrypt.
    #[must_use]
    pub fn rsa(private_key: RsaPrivateKey) -> Self {
        Self {
            key: EncryptionKey::Rsa {
                public: private_key.to_public_key(),
                private: Some(private_key),
            },
            kid: None,
        }
    }

    /// Creates an encrypt-only `RSA-OAEP-256` credential.
    #[must_use]
    pub fn rsa_public(public_key: RsaPublicKey) -> Self {
        Self {
            key: EncryptionKey::Rsa {
                public: public_key,
                private: None,
            },
            kid: None,
        }
    }

    /// Generates a 2048-bit `RSA-OAEP-256` credential.
    ///
    /// # Errors
    /// Returns an error if key generation fails.
    pub fn generate_rsa() -> Result<Self, SecurityTokenError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| SecurityTokenError::key_generation_error(e.to_string()))?;
        Ok(Self::rsa(private_key))
    }

    /// Sets the key ID written into the JWE header.
    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    /// Returns the key ID, if any.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Returns `true` for key-wrapping (asymmetric) credentials.
    #[must_use]
    pub fn is_asymmetric(&self) -> bool {
        matches!(self.key, EncryptionKey::Rsa { .. })
    }

    /// Returns the JWE `alg` value for this credential.
    #[must_use]
    pub fn algorithm(&self) -> &'static str {
        match self.key {
            EncryptionKey::Symmetric(_) => "dir",
            EncryptionKey::Rsa { .. } => "RSA-OAEP-256",
        }
    }

    /// Wraps `plaintext` (usually a signed JWT) into a compact JWE.
    ///
    /// # Errors
    /// Returns an error if key wrapping or content encryption fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecurityTokenError> {
        let header = JweHeader {
            alg: self.algorithm().to_string(),
            enc: CONTENT_ENCRYPTION.to_string(),
            cty: Some("JWT".to_string()),
            kid: self.kid.clone(),
        };
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| SecurityTokenError::encoding_error(e.to_string()))?;
        let header_b64 = URL_SAFE_NO_PAD.encode(header_json);

        let (cek, encrypted_key) = match &self.key {
            EncryptionKey::Symmetric(key) => (*key, Vec::new()),
            EncryptionKey::Rsa { public, .. } => {
                let mut cek = [0u8; KEY_SIZE];
                OsRng.fill_bytes(&mut cek);
                let wrapped = public
                    .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &cek)
                    .map_err(|e| {
                        SecurityTokenError::encoding_error(format!("Key wrapping failed: {e}"))
                    })?;
                (cek, wrapped)
            }
        };

        let cipher = Aes256Gcm::new_from_slice(&cek).map_err(|e| {
            SecurityTokenError::encoding_error(format!("Failed to create cipher: {e}"))
        })?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut sealed = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: header_b64.as_bytes(),
                },
            )
            .map_err(|e| SecurityTokenError::encoding_error(format!("Encryption failed: {e}")))?;

        let tag = sealed.split_off(sealed.len() - TAG_SIZE);

        Ok(format!(
            "{}.{}.{}.{}.{}",
            header_b64,
            URL_SAFE_NO_PAD.encode(encrypted_key),
            URL_SAFE_NO_PAD.encode(nonce_bytes),
            URL_SAFE_NO_PAD.encode(sealed),
            URL_SAFE_NO_PAD.encode(tag),
        ))
    }

    /// Unwraps a compact JWE produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    /// Returns a decryption error if the token is malformed, was produced
    /// for another key, or fails authentication.
    pub fn decrypt(&self, token: &str) -> Result<String, SecurityTokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        let [header_b64, encrypted_key, iv, ciphertext, tag] = parts.as_slice() else {
            return Err(SecurityTokenError::decryption_error(
                "Expected 5 JWE segments",
            ));
        };

        let header_json = decode_segment(header_b64, "header")?;
        let header: JweHeader = serde_json::from_slice(&header_json)
            .map_err(|e| SecurityTokenError::decryption_error(format!("Invalid header: {e}")))?;

        if header.alg != self.algorithm() {
            return Err(SecurityTokenError::decryption_error(format!(
                "Unexpected key management algorithm: {}",
                header.alg
            )));
        }
        if header.enc != CONTENT_ENCRYPTION {
            return Err(SecurityTokenError::decryption_error(format!(
                "Unsupported content encryption: {}",
                header.enc
            )));
        }

        let encrypted_key = decode_segment(encrypted_key, "encrypted key")?;
        let cek: Vec<u8> = match &self.key {
            EncryptionKey::Symmetric(key) => {
                if !encrypted_key.is_empty() {
                    return Err(SecurityTokenError::decryption_error(
                        "Direct encryption must not carry an encrypted key",
                    ));
                }
                key.to_vec()
            }
            EncryptionKey::Rsa { private, .. } => {
                let private = private.as_ref().ok_or_else(|| {
                    SecurityTokenError::invalid_key("Credential has no private key")
                })?;
                private
                    .decrypt(Oaep::new::<Sha256>(), &encrypted_key)
                    .map_err(|e| {
                        SecurityTokenError::decryption_error(format!("Key unwrapping failed: {e}"))
                    })?
            }
        };

        let nonce_bytes = decode_segment(iv, "initialization vector")?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(SecurityTokenError::decryption_error("Invalid nonce size"));
        }

        let mut sealed = decode_segment(ciphertext, "ciphertext")?;
        sealed.extend_from_slice(&decode_segment(tag, "authentication tag")?);

        let cipher = Aes256Gcm::new_from_slice(&cek).map_err(|e| {
            SecurityTokenError::decryption_error(format!("Failed to create cipher: {e}"))
        })?;
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &sealed,
                    aad: header_b64.as_bytes(),
                },
            )
            .map_err(|e| SecurityTokenError::decryption_error(format!("Decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| SecurityTokenError::decryption_error(format!("Invalid UTF-8: {e}")))
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, SecurityTokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| SecurityTokenError::decryption_error(format!("Invalid {name} encoding: {e}")))
}
