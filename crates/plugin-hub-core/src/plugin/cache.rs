//! Discovery Cache
//!
//! Two single-slot TTL caches: the installed plugin scan and the MCP
//! server list. Any install or uninstall clears both immediately.
//!
//! Every invalidation bumps a generation counter. A scan records the
//! generation before touching the filesystem and its result is only
//! stored if no invalidation happened meanwhile, so a scan that raced a
//! mutation cannot repopulate the cache with pre-mutation data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::DEFAULT_CACHE_TTL_SECS;
use crate::plugin::types::{McpServerRecord, PluginInfo, ScanReport};

/// Time source for TTL checks
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Generation observed when a scan started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

struct Slot<T> {
    entry: Mutex<Option<(Arc<T>, Instant)>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            entry: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<(Arc<T>, Instant)>> {
        self.entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, now: Instant, ttl: Duration) -> Option<Arc<T>> {
        match &*self.lock() {
            Some((payload, populated_at)) if now.saturating_duration_since(*populated_at) < ttl => {
                Some(Arc::clone(payload))
            }
            _ => None,
        }
    }

    fn set(&self, payload: Arc<T>, now: Instant) {
        *self.lock() = Some((payload, now));
    }

    fn clear(&self) {
        *self.lock() = None;
    }
}

/// Discovery Cache - owned by the composition root, shared by handle
pub struct DiscoveryCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    generation: AtomicU64,
    plugins: Slot<ScanReport<PluginInfo>>,
    mcp_servers: Slot<Vec<McpServerRecord>>,
}

impl DiscoveryCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            generation: AtomicU64::new(0),
            plugins: Slot::new(),
            mcp_servers: Slot::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mark the start of a scan whose result may be stored later
    pub fn generation(&self) -> Generation {
        Generation(self.generation.load(Ordering::Acquire))
    }

    pub fn get_plugins(&self) -> Option<Arc<ScanReport<PluginInfo>>> {
        self.plugins.get(self.clock.now(), self.ttl)
    }

    /// Store a scan result unless the cache was invalidated since `started`
    pub fn populate_plugins(
        &self,
        started: Generation,
        report: ScanReport<PluginInfo>,
    ) -> Arc<ScanReport<PluginInfo>> {
        let payload = Arc::new(report);
        if self.is_current(started) {
            self.plugins.set(Arc::clone(&payload), self.clock.now());
        }
        payload
    }

    pub fn get_mcp_servers(&self) -> Option<Arc<Vec<McpServerRecord>>> {
        self.mcp_servers.get(self.clock.now(), self.ttl)
    }

    pub fn populate_mcp_servers(
        &self,
        started: Generation,
        records: Vec<McpServerRecord>,
    ) -> Arc<Vec<McpServerRecord>> {
        let payload = Arc::new(records);
        if self.is_current(started) {
            self.mcp_servers.set(Arc::clone(&payload), self.clock.now());
        }
        payload
    }

    /// Drop both slots now
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.plugins.clear();
        self.mcp_servers.clear();
        tracing::debug!("discovery cache invalidated");
    }

    fn is_current(&self, started: Generation) -> bool {
        self.generation() == started
    }
}

impl Default for DiscoveryCache {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            Arc::new(SystemClock),
        )
    }
}

/// Manually advanced clock for tests
#[cfg(test)]
pub(crate) struct ManualClock {
    now: Mutex<Instant>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn cache_with_clock() -> (DiscoveryCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = DiscoveryCache::new(Duration::from_secs(30), clock.clone());
        (cache, clock)
    }

    fn record(source: &str) -> McpServerRecord {
        McpServerRecord {
            source: source.to_string(),
            servers: Map::new(),
        }
    }

    #[test]
    fn test_empty_cache_misses() {
        let (cache, _clock) = cache_with_clock();
        assert!(cache.get_plugins().is_none());
        assert!(cache.get_mcp_servers().is_none());
    }

    #[test]
    fn test_hit_within_ttl_miss_after() {
        let (cache, clock) = cache_with_clock();
        cache.populate_mcp_servers(cache.generation(), vec![record("acme:foo")]);

        clock.advance(Duration::from_secs(29));
        assert_eq!(cache.get_mcp_servers().unwrap().len(), 1);

        clock.advance(Duration::from_secs(1));
        assert!(cache.get_mcp_servers().is_none());
    }

    #[test]
    fn test_invalidate_clears_both_slots() {
        let (cache, _clock) = cache_with_clock();
        cache.populate_plugins(cache.generation(), ScanReport::default());
        cache.populate_mcp_servers(cache.generation(), vec![record("acme:foo")]);

        cache.invalidate();
        assert!(cache.get_plugins().is_none());
        assert!(cache.get_mcp_servers().is_none());
    }

    #[test]
    fn test_scan_started_before_invalidation_is_not_stored() {
        let (cache, _clock) = cache_with_clock();
        let started = cache.generation();

        cache.invalidate();
        let returned = cache.populate_plugins(started, ScanReport::default());

        assert!(returned.items.is_empty());
        assert!(cache.get_plugins().is_none());

        cache.populate_plugins(cache.generation(), ScanReport::default());
        assert!(cache.get_plugins().is_some());
    }

    #[test]
    fn test_slots_are_independent() {
        let (cache, _clock) = cache_with_clock();
        cache.populate_mcp_servers(cache.generation(), Vec::new());
        assert!(cache.get_plugins().is_none());
        assert!(cache.get_mcp_servers().is_some());
    }
}
