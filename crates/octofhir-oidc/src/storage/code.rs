//! Single-use authorization code storage.
//!
//! An authorization code handed to a client is only a random lookup key. The
//! protected ticket lives in a [`CodeStore`] under that key until it is
//! redeemed once or expires.
//!
//! # Security Considerations
//!
//! - Keys carry at least 256 bits of entropy
//! - Entries are removed on first read, before the ticket is inspected
//! - Multi-instance deployments need a backend that overrides [`CodeStore::take`]
//!   with an atomic get-and-delete

use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use time::OffsetDateTime;

use crate::ServerResult;
use crate::clock::{Clock, SystemClock};

/// Storage trait for single-use authorization codes.
///
/// # Example Implementation
///
/// ```ignore
/// struct RedisCodeStore { pool: RedisPool }
///
/// #[async_trait::async_trait]
/// impl CodeStore for RedisCodeStore {
///     async fn set(&self, key: &str, value: &str, expires_at: OffsetDateTime) -> ServerResult<()> {
///         // SET key value EXAT expires_at
///     }
///     async fn take(&self, key: &str) -> ServerResult<Option<String>> {
///         // GETDEL key
///     }
///     // ... other methods
/// }
/// ```
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Stores a value until the absolute expiration.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn set(&self, key: &str, value: &str, expires_at: OffsetDateTime) -> ServerResult<()>;

    /// Returns the value, or `None` if absent or expired.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn get(&self, key: &str) -> ServerResult<Option<String>>;

    /// Removes an entry. Removing a missing key is not an error.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn remove(&self, key: &str) -> ServerResult<()>;

    /// Reads and removes an entry.
    ///
    /// The default implementation calls [`get`](Self::get) and then
    /// unconditionally [`remove`](Self::remove). Two concurrent redemptions
    /// can both observe the value if they interleave before the removal;
    /// backends able to delete atomically should override this.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn take(&self, key: &str) -> ServerResult<Option<String>> {
        let value = self.get(key).await?;
        self.remove(key).await?;
        Ok(value)
    }

    /// Deletes expired entries and returns how many were deleted.
    ///
    /// The default implementation deletes nothing, for backends that expire
    /// entries on their own.
    ///
    /// # Errors
    /// Returns an error if the storage operation fails.
    async fn cleanup_expired(&self) -> ServerResult<u64> {
        Ok(0)
    }
}

/// Generates a random code store key of `bytes` random bytes, base64url encoded.
#[must_use]
pub fn generate_code_key(bytes: usize) -> String {
    let mut buffer = vec![0u8; bytes];
    rand::Rng::fill(&mut rand::thread_rng(), buffer.as_mut_slice());
    URL_SAFE_NO_PAD.encode(buffer)
}

#[derive(Debug, Clone)]
struct CodeEntry {
    value: String,
    expires_at: OffsetDateTime,
}

/// In-memory code store for single-instance deployments and tests.
///
/// `take` is atomic: the entry is removed from the map in one step, so a
/// code is redeemable at most once even under concurrent redemption.
pub struct InMemoryCodeStore {
    entries: DashMap<String, CodeEntry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCodeStore {
    /// Creates an empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store using the given clock for expiry checks.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Returns the number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryCodeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeStore for InMemoryCodeStore {
    async fn set(&self, key: &str, value: &str, expires_at: OffsetDateTime) -> ServerResult<()> {
        self.entries.insert(
            key.to_string(),
            CodeEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> ServerResult<Option<String>> {
        let now = self.clock.now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    async fn remove(&self, key: &str) -> ServerResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> ServerResult<Option<String>> {
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .map(|(_, entry)| entry)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value))
    }

    async fn cleanup_expired(&self) -> ServerResult<u64> {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len()) as u64;
        if removed > 0 {
            tracing::debug!(removed, "Removed expired authorization codes");
        }
        Ok(removed)
    }
}
