//! Bounded LRU cache of rendered pages with single-flight rendering
//!
//! Concurrent requests for the same key share one render: the first caller
//! renders while later callers wait on the in-flight entry. The cache lock is
//! never held while rendering, so distinct keys render in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, warn};
use lru::LruCache;

use super::request::{CancelToken, PagePair, RenderRequest};
use crate::error::{Error, Result};

/// Followers re-check their own cancellation at least this often
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Time source for entry expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_entries: usize,
    pub max_bytes: usize,
    /// Entries older than this are treated as absent
    pub ttl: Option<Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            max_entries: 256,
            max_bytes: 512 * 1024 * 1024,
            ttl: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that waited on another caller's render
    pub coalesced: u64,
    pub evictions: u64,
    pub entries: usize,
    pub bytes: usize,
}

struct Entry {
    bytes: Arc<Vec<u8>>,
    stored_at: Instant,
}

enum FlightState {
    Running,
    Done(Arc<Vec<u8>>),
    Failed(String),
    /// Leader was cancelled or panicked; followers retry
    Abandoned,
}

struct Flight {
    state: Mutex<FlightState>,
    ready: Condvar,
    /// Set by invalidation or a newer revision being stored; the result is
    /// handed out but not stored
    stale: AtomicBool,
}

impl Flight {
    fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Running),
            ready: Condvar::new(),
            stale: AtomicBool::new(false),
        }
    }

    fn publish(&self, outcome: FlightState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = outcome;
        self.ready.notify_all();
    }

    /// `Ok(None)` means the leader gave up and the caller should try again
    fn wait(&self, cancel: &CancelToken) -> Result<Option<Arc<Vec<u8>>>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match &*state {
                FlightState::Running => {}
                FlightState::Done(bytes) => return Ok(Some(Arc::clone(bytes))),
                FlightState::Failed(detail) => {
                    return Err(Error::PeerRenderFailed {
                        detail: detail.clone(),
                    });
                }
                FlightState::Abandoned => return Ok(None),
            }
            cancel.check()?;
            let slice = cancel.remaining().map_or(WAIT_SLICE, |r| r.min(WAIT_SLICE));
            state = self
                .ready
                .wait_timeout(state, slice)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

struct CacheState {
    entries: LruCache<RenderRequest, Entry>,
    bytes: usize,
    in_flight: HashMap<RenderRequest, Arc<Flight>>,
    stats: CacheStats,
}

impl CacheState {
    fn lookup(
        &mut self,
        key: &RenderRequest,
        now: Instant,
        ttl: Option<Duration>,
    ) -> Option<Arc<Vec<u8>>> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => ttl.is_some_and(|ttl| now.duration_since(entry.stored_at) >= ttl),
        };
        if expired {
            debug!("Render cache entry expired: {}", key.pair.page_id());
            self.remove(key);
            self.stats.evictions += 1;
            return None;
        }
        self.entries.get(key).map(|e| Arc::clone(&e.bytes))
    }

    fn remove(&mut self, key: &RenderRequest) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.bytes -= entry.bytes.len();
                true
            }
            None => false,
        }
    }

    fn store(
        &mut self,
        key: RenderRequest,
        bytes: Arc<Vec<u8>>,
        now: Instant,
        policy: &CachePolicy,
    ) {
        let size = bytes.len();
        if policy.max_entries == 0 || size > policy.max_bytes {
            debug!("Render of {size} bytes exceeds cache bounds, not stored");
            return;
        }

        self.remove(&key);
        let superseded: Vec<RenderRequest> = self
            .entries
            .iter()
            .filter(|(k, _)| k.pair == key.pair && k.revision != key.revision)
            .map(|(k, _)| k.clone())
            .collect();
        for old in superseded {
            self.remove(&old);
        }
        // renders of other revisions still running finish unstored
        for (k, flight) in &self.in_flight {
            if k.pair == key.pair && k.revision != key.revision {
                flight.stale.store(true, Ordering::Release);
            }
        }

        while self.entries.len() >= policy.max_entries || self.bytes + size > policy.max_bytes {
            let Some((evicted, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.bytes -= entry.bytes.len();
            self.stats.evictions += 1;
            debug!(
                "Evicted {} @{}% ({} bytes)",
                evicted.pair.page_id(),
                evicted.zoom_percent,
                entry.bytes.len()
            );
        }

        self.bytes += size;
        self.entries.put(
            key,
            Entry {
                bytes,
                stored_at: now,
            },
        );
    }
}

/// Thread-safe render cache; share it behind an `Arc`
pub struct RenderCache {
    state: Mutex<CacheState>,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
}

impl RenderCache {
    #[must_use]
    pub fn new(policy: CachePolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                bytes: 0,
                in_flight: HashMap::new(),
                stats: CacheStats::default(),
            }),
            policy,
            clock,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached bytes for `request`, rendering them at most once
    pub fn get_or_render<F>(&self, request: &RenderRequest, render: F) -> Result<Arc<Vec<u8>>>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        self.get_or_render_with(request, &CancelToken::new(), |_| render())
    }

    /// Like [`get_or_render`](Self::get_or_render), honoring `cancel`.
    ///
    /// A caller waiting on another caller's render stops waiting when its own
    /// token fires; the shared render carries on for the others. Failed and
    /// cancelled renders are never stored.
    pub fn get_or_render_with<F>(
        &self,
        request: &RenderRequest,
        cancel: &CancelToken,
        render: F,
    ) -> Result<Arc<Vec<u8>>>
    where
        F: FnOnce(&CancelToken) -> Result<Vec<u8>>,
    {
        let flight = loop {
            cancel.check()?;
            let waiting = {
                let mut guard = self.lock();
                let state = &mut *guard;
                if let Some(bytes) = state.lookup(request, self.clock.now(), self.policy.ttl) {
                    state.stats.hits += 1;
                    debug!(
                        "Render cache hit: {} at {}%",
                        request.pair.page_id(),
                        request.zoom_percent
                    );
                    return Ok(bytes);
                }
                match state.in_flight.get(request) {
                    Some(flight) => {
                        state.stats.coalesced += 1;
                        Arc::clone(flight)
                    }
                    None => {
                        state.stats.misses += 1;
                        debug!(
                            "Render cache miss: {} at {}%",
                            request.pair.page_id(),
                            request.zoom_percent
                        );
                        let flight = Arc::new(Flight::new());
                        state.in_flight.insert(request.clone(), Arc::clone(&flight));
                        break flight;
                    }
                }
            };
            if let Some(bytes) = waiting.wait(cancel)? {
                return Ok(bytes);
            }
            debug!("Shared render of {} abandoned, retrying", request.pair.page_id());
        };

        let mut leader = Leader {
            cache: self,
            request,
            flight,
            settled: false,
        };
        let outcome = render(cancel).and_then(|bytes| {
            cancel.check()?;
            Ok(bytes)
        });
        match outcome {
            Ok(bytes) => Ok(leader.complete(bytes)),
            Err(Error::Cancelled) => {
                leader.settle(FlightState::Abandoned);
                Err(Error::Cancelled)
            }
            Err(e) => {
                warn!("Render of {} failed: {e}", request.pair.page_id());
                leader.settle(FlightState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Drop every entry for `pair`. Renders already in flight for it are
    /// returned to their callers but not stored. Returns the number dropped.
    pub fn invalidate(&self, pair: &PagePair) -> usize {
        let mut state = self.lock();
        for (key, flight) in &state.in_flight {
            if key.pair == *pair {
                flight.stale.store(true, Ordering::Release);
            }
        }
        let keys: Vec<RenderRequest> = state
            .entries
            .iter()
            .filter(|(k, _)| k.pair == *pair)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            state.remove(key);
        }
        if !keys.is_empty() {
            debug!("Invalidated {} renders of {}", keys.len(), pair.page_id());
        }
        keys.len()
    }

    pub fn invalidate_all(&self) {
        let mut state = self.lock();
        for flight in state.in_flight.values() {
            flight.stale.store(true, Ordering::Release);
        }
        state.entries.clear();
        state.bytes = 0;
    }

    /// Whether `request` is cached, without touching recency
    #[must_use]
    pub fn contains(&self, request: &RenderRequest) -> bool {
        self.lock().entries.contains(request)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.lock().bytes
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            bytes: state.bytes,
            ..state.stats
        }
    }
}

/// The caller rendering a key. Dropping it unsettled (a panicking render)
/// releases the waiters.
struct Leader<'a> {
    cache: &'a RenderCache,
    request: &'a RenderRequest,
    flight: Arc<Flight>,
    settled: bool,
}

impl Leader<'_> {
    fn complete(&mut self, bytes: Vec<u8>) -> Arc<Vec<u8>> {
        let bytes = Arc::new(bytes);
        {
            let mut state = self.cache.lock();
            self.finish_flight(&mut state);
            if self.flight.stale.load(Ordering::Acquire) {
                debug!(
                    "{} invalidated while rendering, not stored",
                    self.request.pair.page_id()
                );
            } else {
                state.store(
                    self.request.clone(),
                    Arc::clone(&bytes),
                    self.cache.clock.now(),
                    &self.cache.policy,
                );
            }
        }
        self.settled = true;
        self.flight.publish(FlightState::Done(Arc::clone(&bytes)));
        bytes
    }

    fn settle(&mut self, outcome: FlightState) {
        {
            let mut state = self.cache.lock();
            self.finish_flight(&mut state);
        }
        self.settled = true;
        self.flight.publish(outcome);
    }

    fn finish_flight(&self, state: &mut CacheState) {
        if state
            .in_flight
            .get(self.request)
            .is_some_and(|f| Arc::ptr_eq(f, &self.flight))
        {
            state.in_flight.remove(self.request);
        }
    }
}

impl Drop for Leader<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.settle(FlightState::Abandoned);
        }
    }
}
