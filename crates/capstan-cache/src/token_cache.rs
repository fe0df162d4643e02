//! TTL token cache with single-flight fetch.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

/// A value with a remaining validity duration.
///
/// The duration is always computed relative to now from an immutable
/// absolute expiry, never cached as a fixed duration.
pub trait Expiring {
    /// Remaining validity of the value. Zero or negative lifetimes are
    /// reported as `Duration::ZERO`.
    fn time_to_live(&self) -> Duration;
}

/// Configuration for [`TokenCache`].
#[derive(Debug, Clone)]
pub struct TokenCacheConfig {
    /// Upper bound on how long any entry is cached, regardless of the
    /// token's own lifetime. Defaults to one hour.
    pub max_duration: Duration,
    /// Optional bound on the number of entries. When exceeded, the oldest
    /// inserted key is evicted.
    pub max_size: Option<usize>,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(3600),
            max_size: None,
        }
    }
}

struct Entry<T> {
    value: T,
    /// Monotonic deadline.
    mono: Instant,
    /// Absolute deadline. Recorded separately so that wall-clock jumps
    /// (e.g. across suspend/resume) also expire the entry.
    unix: DateTime<Utc>,
}

impl<T> Entry<T> {
    fn expired(&self) -> bool {
        Instant::now() >= self.mono || Utc::now() >= self.unix
    }
}

type Slot<T> = Arc<AsyncMutex<Option<Entry<T>>>>;

struct Slots<T> {
    map: HashMap<String, Slot<T>>,
    order: VecDeque<String>,
}

/// Thread-safe cache specialized in storing and retrieving access tokens.
///
/// Entries expire at 80% of the token lifetime (the same threshold kubelet
/// uses to rotate ServiceAccount tokens), capped by
/// [`TokenCacheConfig::max_duration`]. Expired entries are replaced on
/// access and can additionally be swept by [`TokenCache::evict_expired`]
/// or a janitor task.
///
/// Concurrent `get_or_set` calls for the same key serialize on a per-key
/// slot: only one caller fetches while the rest wait and then observe the
/// stored result. Distinct keys proceed fully concurrently. A failed fetch
/// is not cached; the next waiter retries.
pub struct TokenCache<T> {
    slots: StdMutex<Slots<T>>,
    config: TokenCacheConfig,
}

impl<T: Expiring + Clone> TokenCache<T> {
    pub fn new(config: TokenCacheConfig) -> Self {
        Self {
            slots: StdMutex::new(Slots {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            config,
        }
    }

    /// Return the token for `key` if present and not expired, or invoke
    /// `fetch` to produce a new one and store it.
    ///
    /// The boolean indicates whether the token was served from the cache.
    pub async fn get_or_set<E, F, Fut>(&self, key: &str, fetch: F) -> Result<(T, bool), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref()
            && !entry.expired()
        {
            debug!(key, "Token cache hit");
            return Ok((entry.value.clone(), true));
        }

        debug!(key, "Token cache miss");
        let value = fetch().await?;
        *guard = Some(self.new_entry(value.clone()));
        Ok((value, false))
    }

    /// Remove the entry for `key`, if any.
    pub fn invalidate(&self, key: &str) {
        let mut slots = self.slots.lock().expect("token cache lock poisoned");
        slots.map.remove(key);
        slots.order.retain(|k| k != key);
    }

    /// Remove all expired entries. Entries whose fetch is in flight are
    /// left alone.
    pub fn evict_expired(&self) {
        let mut slots = self.slots.lock().expect("token cache lock poisoned");
        slots.map.retain(|key, slot| {
            let Ok(guard) = slot.try_lock() else {
                return true;
            };
            let keep = matches!(guard.as_ref(), Some(entry) if !entry.expired());
            if !keep {
                debug!(key, "Evicting expired token");
            }
            keep
        });
        let map = &slots.map;
        let retained: VecDeque<String> = slots
            .order
            .iter()
            .filter(|k| map.contains_key(*k))
            .cloned()
            .collect();
        slots.order = retained;
    }

    /// Number of entries currently held, including expired ones not yet
    /// swept.
    pub fn len(&self) -> usize {
        self.slots.lock().expect("token cache lock poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn a background task sweeping expired entries at `interval`.
    pub fn start_janitor(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()>
    where
        T: Send + Sync + 'static,
    {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                cache.evict_expired();
            }
        })
    }

    fn slot(&self, key: &str) -> Slot<T> {
        let mut slots = self.slots.lock().expect("token cache lock poisoned");
        if let Some(slot) = slots.map.get(key) {
            return Arc::clone(slot);
        }

        let slot: Slot<T> = Arc::new(AsyncMutex::new(None));
        slots.map.insert(key.to_string(), Arc::clone(&slot));
        slots.order.push_back(key.to_string());

        if let Some(max) = self.config.max_size {
            while slots.map.len() > max {
                let Some(oldest) = slots.order.pop_front() else {
                    break;
                };
                if oldest != key {
                    debug!(key = %oldest, "Evicting oldest token to respect cache size");
                    slots.map.remove(&oldest);
                } else {
                    slots.order.push_back(oldest);
                    break;
                }
            }
        }

        slot
    }

    fn new_entry(&self, value: T) -> Entry<T> {
        // Kubelet rotates ServiceAccount tokens once 80% of their lifetime
        // has passed; the same threshold applies here.
        let ttl = value.time_to_live().mul_f64(0.8).min(self.config.max_duration);
        Entry {
            value,
            mono: Instant::now() + ttl,
            unix: Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }
}

impl<T: Expiring + Clone> Default for TokenCache<T> {
    fn default() -> Self {
        Self::new(TokenCacheConfig::default())
    }
}
