use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Remembers keys for a while so the same event is only handled once.
///
/// Gateway reconnects can replay events, and a slow interaction can be
/// delivered twice. Whoever claims a key first gets to handle it.
#[derive(Debug)]
pub struct DedupCache {
    ttl: Duration,
    seen: DashMap<String, Instant>,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: DashMap::new(),
        }
    }

    /// `true` for the first claim of `key` within the TTL.
    pub fn claim(&self, key: &str) -> bool {
        self.claim_at(key, Instant::now())
    }

    pub fn claim_at(&self, key: &str, now: Instant) -> bool {
        // The entry holds the shard lock, so racing claims see each other.
        match self.seen.entry(key.to_string()) {
            Entry::Occupied(mut claimed) => {
                if now.saturating_duration_since(*claimed.get()) < self.ttl {
                    return false;
                }
                claimed.insert(now);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Give a key back, e.g. when handling it failed and a retry is welcome.
    pub fn release(&self, key: &str) {
        self.seen.remove(key);
    }

    /// Drop expired keys. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.seen.retain(|_, claimed| {
            let live = now.saturating_duration_since(*claimed) < self.ttl;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
