//! Blacklist test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::BlacklistStorage;

/// Map-backed blacklist with a real compare-and-set.
#[derive(Default)]
pub struct MockBlacklist {
    entries: Mutex<HashMap<String, OffsetDateTime>>,
    writes: AtomicUsize,
}

impl MockBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expiry_of(&self, jti: &str) -> Option<OffsetDateTime> {
        self.entries.lock().unwrap().get(jti).copied()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlacklistStorage for MockBlacklist {
    async fn is_revoked(&self, jti: &str) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(jti)
            .is_some_and(|expires_at| *expires_at > now))
    }

    async fn revoke(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(jti.to_string()).or_insert(expires_at);
        if *entry < expires_at {
            *entry = expires_at;
        }
        Ok(())
    }

    async fn revoke_if_absent(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let now = OffsetDateTime::now_utc();
        let mut entries = self.entries.lock().unwrap();
        match entries.get(jti) {
            Some(existing) if *existing > now => Ok(false),
            _ => {
                entries.insert(jti.to_string(), expires_at);
                Ok(true)
            }
        }
    }

    async fn purge_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

/// Blacklist whose backend is unreachable.
pub struct UnavailableBlacklist;

#[async_trait]
impl BlacklistStorage for UnavailableBlacklist {
    async fn is_revoked(&self, _jti: &str) -> AuthResult<bool> {
        Err(AuthError::store_unavailable("connection refused"))
    }

    async fn revoke(&self, _jti: &str, _expires_at: OffsetDateTime) -> AuthResult<()> {
        Err(AuthError::store_unavailable("connection refused"))
    }

    async fn revoke_if_absent(&self, _jti: &str, _expires_at: OffsetDateTime) -> AuthResult<bool> {
        Err(AuthError::store_unavailable("connection refused"))
    }

    async fn purge_expired(&self) -> AuthResult<u64> {
        Err(AuthError::store_unavailable("connection refused"))
    }
}

/// Blacklist whose backend never answers.
pub struct StallingBlacklist;

impl StallingBlacklist {
    async fn stall<T>() -> AuthResult<T> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(AuthError::store_unavailable("unreachable"))
    }
}

#[async_trait]
impl BlacklistStorage for StallingBlacklist {
    async fn is_revoked(&self, _jti: &str) -> AuthResult<bool> {
        Self::stall().await
    }

    async fn revoke(&self, _jti: &str, _expires_at: OffsetDateTime) -> AuthResult<()> {
        Self::stall().await
    }

    async fn revoke_if_absent(&self, _jti: &str, _expires_at: OffsetDateTime) -> AuthResult<bool> {
        Self::stall().await
    }

    async fn purge_expired(&self) -> AuthResult<u64> {
        Self::stall().await
    }
}
