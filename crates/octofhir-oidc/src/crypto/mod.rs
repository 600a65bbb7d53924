//! Key material for self-contained tokens.
//!
//! - [`SigningCredentials`] sign and verify JWTs (RS256/RS384/RS512/ES384)
//! - [`EncryptingCredentials`] wrap signed JWTs into compact JWEs
//! - [`Certificate`] provides `kid`/`x5t` thumbprints for attached certificates

pub mod algorithm;
pub mod certificate;
pub mod credentials;
pub mod encryption;

pub use algorithm::SigningAlgorithm;
pub use certificate::Certificate;
pub use credentials::{PublicKeyData, SigningCredentials, infer_key_id};
pub use encryption::{EncryptingCredentials, EncryptionKey};
