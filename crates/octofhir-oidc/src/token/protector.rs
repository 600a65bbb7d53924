//! Opaque ticket protection.
//!
//! Authorization codes, refresh tokens and (by default) access tokens are
//! opaque: the ticket is serialized, encrypted and authenticated, and only
//! this server can read it back.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

use crate::crypto::encryption::KEY_SIZE;
use crate::error::TokenServerError;
use crate::types::{AuthenticationTicket, TokenUsage};
use crate::ServerResult;

/// Nonce size for AES-256-GCM (96 bits).
const NONCE_SIZE: usize = 12;

/// Symmetric protector turning tickets into opaque strings and back.
///
/// Implementations must guarantee confidentiality and integrity.
/// `unprotect` never fails loudly: any malformed, tampered or foreign input
/// yields `None`.
pub trait TicketProtector: Send + Sync {
    /// Serializes and protects a ticket.
    ///
    /// # Errors
    /// Returns an error if the ticket cannot be serialized or encrypted.
    fn protect(&self, ticket: &AuthenticationTicket) -> ServerResult<String>;

    /// Restores a ticket from its protected form.
    fn unprotect(&self, protected: &str) -> Option<AuthenticationTicket>;
}

/// AES-256-GCM ticket protector.
///
/// The purpose string is bound as associated data, so a value protected for
/// one purpose does not unprotect under another.
pub struct AesGcmTicketProtector {
    key: [u8; KEY_SIZE],
    purpose: String,
}

impl AesGcmTicketProtector {
    /// Creates a protector from a 256-bit key and a purpose string.
    #[must_use]
    pub fn new(key: [u8; KEY_SIZE], purpose: impl Into<String>) -> Self {
        Self {
            key,
            purpose: purpose.into(),
        }
    }

    /// Creates a protector with a random key.
    #[must_use]
    pub fn generate(purpose: impl Into<String>) -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(key, purpose)
    }

    /// Creates a protector for one token kind, sharing a master key.
    #[must_use]
    pub fn for_kind(key: [u8; KEY_SIZE], kind: TokenUsage) -> Self {
        Self::new(key, format!("octofhir-oidc.{}", kind.as_str()))
    }

    /// Returns the purpose string.
    #[must_use]
    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    fn cipher(&self) -> Option<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key).ok()
    }
}

impl std::fmt::Debug for AesGcmTicketProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmTicketProtector")
            .field("purpose", &self.purpose)
            .finish_non_exhaustive()
    }
}

impl TicketProtector for AesGcmTicketProtector {
    fn protect(&self, ticket: &AuthenticationTicket) -> ServerResult<String> {
        let plaintext = serde_json::to_vec(ticket).map_err(|e| {
            TokenServerError::protection(format!("Failed to serialize ticket: {e}"))
        })?;

        let cipher = self
            .cipher()
            .ok_or_else(|| TokenServerError::protection("Failed to create cipher"))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: &plaintext,
                    aad: self.purpose.as_bytes(),
                },
            )
            .map_err(|e| TokenServerError::protection(format!("Encryption failed: {e}")))?;

        let mut output = Vec::with_capacity(NONCE_SIZE + sealed.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&sealed);

        Ok(URL_SAFE_NO_PAD.encode(output))
    }

    fn unprotect(&self, protected: &str) -> Option<AuthenticationTicket> {
        let bytes = URL_SAFE_NO_PAD.decode(protected).ok()?;
        if bytes.len() <= NONCE_SIZE {
            return None;
        }

        let (nonce_bytes, sealed) = bytes.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher()?
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: sealed,
                    aad: self.purpose.as_bytes(),
                },
            )
            .ok()?;

        serde_json::from_slice(&plaintext).ok()
    }
}
