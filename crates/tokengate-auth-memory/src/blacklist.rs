//! Sharded in-memory blacklist.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use tokengate_auth::{AuthResult, BlacklistStorage};

/// Default number of writes between opportunistic purges.
const DEFAULT_PURGE_EVERY_WRITES: usize = 1024;

/// Blacklist held in process memory.
///
/// Each entry maps a token identifier to the instant its revocation lapses.
/// Expired entries read as "not revoked" and are dropped by
/// [`purge_expired`](BlacklistStorage::purge_expired), which also runs on its
/// own after every `purge_every_writes` writes.
pub struct InMemoryBlacklist {
    entries: DashMap<String, OffsetDateTime>,
    writes: AtomicUsize,
    purge_every_writes: usize,
}

impl InMemoryBlacklist {
    /// Creates an empty blacklist with the default purge cadence.
    #[must_use]
    pub fn new() -> Self {
        Self::with_purge_every_writes(DEFAULT_PURGE_EVERY_WRITES)
    }

    /// Creates an empty blacklist that purges after every `writes` writes.
    #[must_use]
    pub fn with_purge_every_writes(writes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            writes: AtomicUsize::new(0),
            purge_every_writes: writes.max(1),
        }
    }

    /// Number of entries held, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_before(&self, now: OffsetDateTime) -> u64 {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.entries.len()) as u64
    }

    fn record_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.purge_every_writes == 0 {
            let purged = self.purge_before(OffsetDateTime::now_utc());
            tracing::debug!(purged, "Opportunistic blacklist purge");
        }
    }
}

impl Default for InMemoryBlacklist {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlacklistStorage for InMemoryBlacklist {
    async fn is_revoked(&self, jti: &str) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .entries
            .get(jti)
            .is_some_and(|expires_at| *expires_at > now))
    }

    async fn revoke(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<()> {
        self.entries
            .entry(jti.to_string())
            .and_modify(|current| {
                if *current < expires_at {
                    *current = expires_at;
                }
            })
            .or_insert(expires_at);
        self.record_write();
        Ok(())
    }

    async fn revoke_if_absent(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();
        // The entry guard holds the shard lock for the whole check-and-set.
        let inserted = match self.entries.entry(jti.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    false
                } else {
                    entry.insert(expires_at);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                true
            }
        };
        if inserted {
            self.record_write();
        }
        Ok(inserted)
    }

    async fn purge_expired(&self) -> AuthResult<u64> {
        Ok(self.purge_before(OffsetDateTime::now_utc()))
    }
}
