//! Decision cache for policy evaluations.

use dashmap::DashMap;
use kim_api::ObjectKey;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::engine::Decision;

/// Default maximum number of entries in the cache.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Interval between automatic eviction sweeps (triggered lazily on `set()`).
const EVICTION_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub subject: ObjectKey,
    pub resource: String,
    pub action: String,
}

impl CacheKey {
    pub fn new(subject: &ObjectKey, resource: &str, action: &str) -> Self {
        Self {
            subject: subject.clone(),
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }
}

struct CachedDecision {
    decision: Decision,
    revision: u64,
    expires_at: Instant,
}

/// Thread-safe decision cache with TTL and maximum capacity.
///
/// Every entry is stamped with the model revision it was computed against and
/// is only returned for that same revision, so any model change invalidates
/// all cached decisions without an explicit purge.
///
/// When the cache reaches `max_entries`, expired and outdated entries are
/// evicted first. If the cache is still full, the new entry is not inserted
/// and the engine evaluates every time.
pub struct DecisionCache {
    entries: DashMap<CacheKey, CachedDecision>,
    ttl: Duration,
    max_entries: usize,
    len: AtomicUsize,
    last_eviction: std::sync::Mutex<Instant>,
}

impl DecisionCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
            len: AtomicUsize::new(0),
            last_eviction: std::sync::Mutex::new(Instant::now()),
        }
    }

    /// Cached decision for `key` if it was computed at `revision` and has
    /// not expired.
    pub fn get(&self, key: &CacheKey, revision: u64) -> Option<Decision> {
        self.entries.get(key).and_then(|entry| {
            if entry.revision == revision && entry.expires_at > Instant::now() {
                Some(entry.decision)
            } else {
                None
            }
        })
    }

    pub fn set(&self, key: CacheKey, decision: Decision, revision: u64) {
        self.maybe_evict(revision);

        if self.len.load(Ordering::Relaxed) >= self.max_entries {
            self.evict(revision);
            if self.len.load(Ordering::Relaxed) >= self.max_entries {
                return;
            }
        }

        let was_absent = self
            .entries
            .insert(
                key,
                CachedDecision {
                    decision,
                    revision,
                    expires_at: Instant::now() + self.ttl,
                },
            )
            .is_none();
        if was_absent {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove entries that expired or were computed before `revision`.
    pub fn evict(&self, revision: u64) {
        let now = Instant::now();
        self.entries.retain(|_, v| {
            let keep = v.expires_at > now && v.revision >= revision;
            if !keep {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
            keep
        });
        if let Ok(mut last) = self.last_eviction.lock() {
            *last = Instant::now();
        }
    }

    /// Current number of entries (including potentially outdated ones).
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn maybe_evict(&self, revision: u64) {
        let should_evict = self
            .last_eviction
            .lock()
            .map(|last| last.elapsed() >= EVICTION_CHECK_INTERVAL)
            .unwrap_or(false);
        if should_evict {
            self.evict(revision);
        }
    }
}
