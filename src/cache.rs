//! Process-local key/value cache with per-entry expiration.
//!
//! Entries are stamped on insert and checked on read. Nothing sweeps the map
//! in the background: an expired entry stays in memory until the next read of
//! its key removes it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// Source of "now" for expiration checks.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The two freshness tiers: volatile listings and curated trending content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub short: Duration,
    pub long: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(5 * 60),
            long: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.elapsed(now) < self.ttl
    }
}

pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    policy: TtlPolicy,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(TtlPolicy::default())
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new(policy: TtlPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: TtlPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> TtlPolicy {
        self.policy
    }

    /// Insert or overwrite `key`, restarting its lifetime.
    pub fn set(&self, key: impl Into<String>, value: V, long_lived: bool) {
        let key = key.into();
        let ttl = if long_lived {
            self.policy.long
        } else {
            self.policy.short
        };
        debug!("Caching {} for {:?}", key, ttl);
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: self.clock.now(),
                ttl,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        // The read guard must be gone before remove() touches the same shard.
        let hit = {
            let entry = self.entries.get(key)?;
            entry.is_fresh(now).then(|| entry.value.clone())
        };

        if hit.is_none() {
            debug!("Cache entry expired: {}", key);
            self.entries
                .remove_if(key, |_, entry| !entry.is_fresh(self.clock.now()));
        }
        hit
    }

    /// Time left before `key` expires; zero when absent or already stale.
    pub fn remaining_ttl(&self, key: &str) -> Duration {
        let now = self.clock.now();
        self.entries
            .get(key)
            .map(|entry| entry.ttl.saturating_sub(entry.elapsed(now)))
            .unwrap_or_default()
    }

    /// Remove a single key, or everything when `key` is `None`.
    pub fn clear(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                self.entries.remove(key);
            }
            None => self.entries.clear(),
        }
    }

    pub fn is_valid(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Stored entries, including expired ones that have not been read since.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
