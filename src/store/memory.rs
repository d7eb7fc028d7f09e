//! In-process backing store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use tracing::debug;

use super::KvStore;
use crate::clock::{Clock, SystemClock};
use crate::{HeimdallError, Result};

/// Default key cap for [`MemoryStore`].
pub const DEFAULT_MAX_ENTRIES: u64 = 100_000;

/// How often writes sweep out keys that expired on the injected clock.
const SWEEP_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    ttl: Duration,
    expires_at_ms: u64,
}

impl Slot {
    fn new(value: String, ttl: Duration, now_ms: u64) -> Self {
        Self {
            value,
            ttl,
            expires_at_ms: now_ms.saturating_add(ttl.as_millis() as u64),
        }
    }

    fn is_live(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at_ms
    }

    fn counter(&self, key: &str) -> Result<u64> {
        self.value
            .parse::<u64>()
            .map_err(|_| HeimdallError::Store(format!("value at {key} is not an integer")))
    }
}

/// Gives every slot its own TTL, restarted on each write.
struct SlotExpiry;

impl Expiry<String, Slot> for SlotExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        slot: &Slot,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(slot.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        slot: &Slot,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(slot.ttl)
    }
}

/// [`KvStore`] held in process memory.
///
/// Backed by moka's bounded TTL cache. Liveness is also checked against the
/// injected [`Clock`], so a [`ManualClock`](crate::clock::ManualClock)
/// makes TTL behaviour deterministic; keys that expired on that clock are
/// swept out at most once a minute (clock time) by the next write.
///
/// Every write goes through moka's per-key compute, which makes `incr_ex`
/// atomic across concurrent tasks.
pub struct MemoryStore {
    cache: Cache<String, Slot>,
    clock: Arc<dyn Clock>,
    next_sweep_ms: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store on the system clock, capped at [`DEFAULT_MAX_ENTRIES`] keys.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store on the given clock, capped at [`DEFAULT_MAX_ENTRIES`] keys.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::build(clock, DEFAULT_MAX_ENTRIES)
    }

    /// Cap the number of stored keys. Past the cap, moka evicts by
    /// frequency and recency.
    pub fn max_entries(self, n: u64) -> Self {
        Self::build(self.clock, n.max(1))
    }

    fn build(clock: Arc<dyn Clock>, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(SlotExpiry)
            .build();
        Self {
            cache,
            clock,
            next_sweep_ms: AtomicU64::new(0),
        }
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.cache.iter().filter(|(_, slot)| slot.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every key that has expired on the injected clock, returning how
    /// many were dropped.
    pub async fn purge_expired(&self) -> u64 {
        let now = self.clock.now_millis();
        let expired: Vec<Arc<String>> = self
            .cache
            .iter()
            .filter(|(_, slot)| !slot.is_live(now))
            .map(|(key, _)| key)
            .collect();

        let mut purged = 0;
        for key in expired {
            // Re-checked under the key's lock so a concurrent write survives.
            let result = self
                .cache
                .entry_by_ref(key.as_str())
                .and_compute_with(|entry| async move {
                    match entry {
                        Some(entry) if !entry.value().is_live(now) => Op::Remove,
                        _ => Op::Nop,
                    }
                })
                .await;
            if matches!(result, CompResult::Removed(_)) {
                purged += 1;
            }
        }
        if purged > 0 {
            debug!(purged, "purged expired keys from memory store");
        }
        purged
    }

    async fn sweep_if_due(&self, now_ms: u64) {
        let due = self.next_sweep_ms.load(Ordering::Acquire);
        if now_ms < due {
            return;
        }
        let next = now_ms.saturating_add(SWEEP_INTERVAL_MS);
        if self
            .next_sweep_ms
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.purge_expired().await;
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now_millis();
        match self.cache.get(key).await {
            Some(slot) if slot.is_live(now) => Ok(Some(slot.value)),
            _ => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = self.clock.now_millis();
        self.sweep_if_due(now).await;
        let slot = Slot::new(value.to_string(), ttl, now);
        self.cache
            .entry_by_ref(key)
            .and_compute_with(|_| async move { Op::Put(slot) })
            .await;
        Ok(())
    }

    async fn incr_ex(&self, key: &str, ttl: Duration) -> Result<u64> {
        let now = self.clock.now_millis();
        self.sweep_if_due(now).await;
        let result = self
            .cache
            .entry_by_ref(key)
            .and_try_compute_with(|entry| {
                let current = match entry {
                    Some(entry) if entry.value().is_live(now) => entry.value().counter(key),
                    _ => Ok(0),
                };
                async move {
                    let next = current?.saturating_add(1);
                    Ok::<_, HeimdallError>(Op::Put(Slot::new(next.to_string(), ttl, now)))
                }
            })
            .await?;
        match result {
            CompResult::Inserted(entry) | CompResult::ReplacedWith(entry) => {
                entry.value().counter(key)
            }
            _ => Err(HeimdallError::Store(format!("increment of {key} was not applied"))),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let now = self.clock.now_millis();
        let mut keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, slot)| slot.is_live(now) && key.starts_with(prefix))
            .map(|(key, _)| (*key).clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        let now = self.clock.now_millis();
        let mut removed = 0;
        for key in keys {
            if let Some(slot) = self.cache.remove(key).await
                && slot.is_live(now)
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
