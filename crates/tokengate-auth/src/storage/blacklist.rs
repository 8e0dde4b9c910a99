//! Blacklist storage trait for revoked token identifiers.
//!
//! When a token is refreshed or logged out, its `jti` is stored until the
//! token could no longer be used anyway. Lookups answer "has this identifier
//! been revoked?" for every authenticated request.
//!
//! # Security Considerations
//!
//! - Entries must carry an expiry so the store never grows without bound
//! - An entry whose expiry has passed must report "not revoked" even if it has
//!   not been purged yet
//! - `revoke_if_absent` must be atomic: it is the single serialization point
//!   for concurrent refreshes of the same token
//! - Store failures must surface as errors, never as "not revoked"

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;

/// Storage trait for blacklisted token identifiers.
///
/// # Implementations
///
/// Implementations are provided in separate crates:
/// - `tokengate-auth-memory` - in-process sharded map
///
/// Any key-value store offering get, set-with-expiry and compare-and-set over
/// string keys can back this trait. For a SQL store:
///
/// ```sql
/// INSERT INTO token_blacklist (jti, expires_at)
/// VALUES ($1, $2)
/// ON CONFLICT (jti) DO UPDATE SET expires_at = EXCLUDED.expires_at
///     WHERE token_blacklist.expires_at <= now()
/// RETURNING jti
/// ```
#[async_trait]
pub trait BlacklistStorage: Send + Sync {
    /// Checks whether `jti` is currently revoked.
    ///
    /// # Returns
    ///
    /// `true` if an entry exists and its expiry is still in the future.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StoreUnavailable`] if the store cannot answer.
    async fn is_revoked(&self, jti: &str) -> AuthResult<bool>;

    /// Revokes `jti` until `expires_at`.
    ///
    /// Idempotent: revoking an already revoked identifier succeeds. The
    /// later of the existing and the new expiry is kept.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StoreUnavailable`] if the store cannot be written.
    async fn revoke(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<()>;

    /// Atomically revokes `jti` unless it is already revoked.
    ///
    /// # Returns
    ///
    /// `true` if this call created the entry (the caller won), `false` if a
    /// live entry already existed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StoreUnavailable`] if the store cannot be written.
    async fn revoke_if_absent(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<bool>;

    /// Deletes entries whose expiry has passed.
    ///
    /// Not required for correctness; it only reclaims space.
    ///
    /// # Returns
    ///
    /// The number of entries deleted.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::StoreUnavailable`] if the store cannot be written.
    async fn purge_expired(&self) -> AuthResult<u64>;
}

/// Runs a store call under a deadline.
///
/// An elapsed deadline becomes [`AuthError::StoreUnavailable`] so that a hung
/// backend never leaves a request waiting indefinitely.
pub async fn bounded<T, F>(timeout: Duration, operation: &'static str, call: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = timeout.as_millis() as u64,
                "Blacklist store call timed out"
            );
            Err(AuthError::store_unavailable(format!(
                "{operation} timed out after {}ms",
                timeout.as_millis()
            )))
        }
    }
}
