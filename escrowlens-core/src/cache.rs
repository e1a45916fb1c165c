//! TTL query cache with single-flight misses.
//!
//! Entries are keyed by scope + entity id + optional sub-action, and are
//! fresh while `now - written_at < ttl(scope)`. Staleness is checked on
//! read; there is no background sweeper.
//!
//! Concurrent misses for the same key share one upstream fetch: the first
//! caller registers a watch channel in the in-flight map and fetches, the
//! others subscribe and receive the same result (success, not-found, or
//! error). Only `Ok(Some(_))` is stored.
//!
//! Clearing a scope bumps its generation. A fetch that started under an
//! older generation still answers its callers but does not write back.

use crate::clock::Clock;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Entity family a cache entry belongs to. Each scope has its own TTL and
/// can be cleared independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    Role,
    Job,
    Dispute,
    Reputation,
    Events,
    Resource,
}

impl CacheScope {
    pub const ALL: [CacheScope; 6] = [
        CacheScope::Role,
        CacheScope::Job,
        CacheScope::Dispute,
        CacheScope::Reputation,
        CacheScope::Events,
        CacheScope::Resource,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CacheScope::Role => "role",
            CacheScope::Job => "job",
            CacheScope::Dispute => "dispute",
            CacheScope::Reputation => "reputation",
            CacheScope::Events => "events",
            CacheScope::Resource => "resource",
        }
    }
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: CacheScope,
    pub id: String,
    pub action: Option<String>,
}

impl CacheKey {
    pub fn new(scope: CacheScope, id: impl Into<String>) -> Self {
        Self {
            scope,
            id: id.into(),
            action: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            Some(action) => write!(f, "{}:{}:{}", self.scope, self.id, action),
            None => write!(f, "{}:{}", self.scope, self.id),
        }
    }
}

/// Time-to-live per scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TtlPolicy {
    pub role: Duration,
    pub job: Duration,
    pub dispute: Duration,
    pub reputation: Duration,
    pub events: Duration,
    pub resource: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            role: Duration::from_secs(60),
            job: Duration::from_secs(15),
            dispute: Duration::from_secs(15),
            reputation: Duration::from_secs(30),
            events: Duration::from_secs(10),
            resource: Duration::from_secs(600),
        }
    }
}

impl TtlPolicy {
    pub fn ttl(&self, scope: CacheScope) -> Duration {
        match scope {
            CacheScope::Role => self.role,
            CacheScope::Job => self.job,
            CacheScope::Dispute => self.dispute,
            CacheScope::Reputation => self.reputation,
            CacheScope::Events => self.events,
            CacheScope::Resource => self.resource,
        }
    }
}

/// Lock-free counters.
#[derive(Debug, Default)]
struct AtomicCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

/// Snapshot of cache counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    /// Misses answered by another caller's in-flight fetch
    pub coalesced: u64,
}

struct Entry<V> {
    value: V,
    written_at: u64,
}

type InFlightResult<V, E> = Result<Option<V>, E>;
type InFlightSender<V, E> = Arc<watch::Sender<Option<InFlightResult<V, E>>>>;
type InFlightMap<V, E> = DashMap<CacheKey, InFlightSender<V, E>>;

/// Removes the in-flight entry if the fetching future is dropped before it
/// finishes, so waiters see the channel close and retry instead of hanging.
struct InFlightFetchGuard<'a, V, E> {
    key: CacheKey,
    map: &'a InFlightMap<V, E>,
    tx: InFlightSender<V, E>,
    finished: bool,
}

impl<'a, V, E> InFlightFetchGuard<'a, V, E> {
    fn new(key: CacheKey, map: &'a InFlightMap<V, E>, tx: InFlightSender<V, E>) -> Self {
        Self {
            key,
            map,
            tx,
            finished: false,
        }
    }

    fn finish(mut self, msg: InFlightResult<V, E>) {
        // Send before removing so late subscribers still observe the result.
        let _ = self.tx.send(Some(msg));
        self.release();
        self.finished = true;
    }

    /// Remove our own entry only; a clear may already have replaced it.
    fn release(&self) {
        self.map
            .remove_if(&self.key, |_, current| Arc::ptr_eq(current, &self.tx));
    }
}

impl<V, E> Drop for InFlightFetchGuard<'_, V, E> {
    fn drop(&mut self) {
        if !self.finished {
            self.release();
        }
    }
}

/// Process-wide TTL cache for one value type.
///
/// Not `Clone`; share it behind an `Arc`.
pub struct TtlCache<V, E> {
    entries: DashMap<CacheKey, Entry<V>>,
    in_flight: InFlightMap<V, E>,
    generations: [AtomicU64; 6],
    policy: TtlPolicy,
    clock: Arc<dyn Clock>,
    stats: AtomicCacheStats,
}

impl<V, E> fmt::Debug for TtlCache<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries.len())
            .field("in_flight", &self.in_flight.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl<V, E> TtlCache<V, E>
where
    V: Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    pub fn new(policy: TtlPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            generations: Default::default(),
            policy,
            clock,
            stats: AtomicCacheStats::default(),
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    fn is_fresh(&self, key: &CacheKey, written_at: u64, now: u64) -> bool {
        let ttl = self.policy.ttl(key.scope).as_millis() as u64;
        now.saturating_sub(written_at) < ttl
    }

    fn generation(&self, scope: CacheScope) -> u64 {
        self.generations[scope.index()].load(Ordering::SeqCst)
    }

    /// Fresh value for `key`, evicting it if it has expired.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now_millis();
        if let Some(entry) = self.entries.get(key) {
            if self.is_fresh(key, entry.written_at, now) {
                return Some(entry.value.clone());
            }
        }
        self.entries
            .remove_if(key, |k, entry| !self.is_fresh(k, entry.written_at, now));
        None
    }

    pub fn put(&self, key: CacheKey, value: V) {
        let written_at = self.clock.now_millis();
        self.entries.insert(key, Entry { value, written_at });
    }

    /// Return the cached value or run `fetch`, sharing one fetch among
    /// concurrent callers for the same key.
    pub async fn get_or_fetch<F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<Option<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
    {
        let tx = loop {
            if let Some(value) = self.get(key) {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(%key, "cache hit");
                return Ok(Some(value));
            }

            let rx = match self.in_flight.entry(key.clone()) {
                MapEntry::Occupied(entry) => entry.get().subscribe(),
                MapEntry::Vacant(entry) => {
                    let (tx, _rx) = watch::channel(None::<InFlightResult<V, E>>);
                    let tx = Arc::new(tx);
                    entry.insert(tx.clone());
                    break tx;
                }
            };

            if let Some(result) = Self::wait(rx).await {
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%key, "coalesced with in-flight fetch");
                return result;
            }
            tracing::debug!(%key, "in-flight fetch abandoned, retrying");
        };

        let generation = self.generation(key.scope);
        let guard = InFlightFetchGuard::new(key.clone(), &self.in_flight, tx);
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%key, "cache miss");

        let result = fetch().await;

        if let Ok(Some(value)) = &result {
            self.store_if_current(key, value.clone(), generation);
        }
        guard.finish(result.clone());
        result
    }

    async fn wait(
        mut rx: watch::Receiver<Option<InFlightResult<V, E>>>,
    ) -> Option<InFlightResult<V, E>> {
        loop {
            let ready = rx.borrow_and_update().clone();
            if ready.is_some() {
                return ready;
            }
            if rx.changed().await.is_err() {
                // Sender gone; it may have published just before dropping.
                return rx.borrow().clone();
            }
        }
    }

    fn store_if_current(&self, key: &CacheKey, value: V, generation: u64) {
        if self.generation(key.scope) != generation {
            tracing::debug!(%key, "scope cleared during fetch, not caching");
            return;
        }
        let written_at = self.clock.now_millis();
        self.entries
            .insert(key.clone(), Entry { value, written_at });
        // A clear that landed between the check and the insert wins.
        if self.generation(key.scope) != generation {
            self.entries
                .remove_if(key, |_, entry| entry.written_at == written_at);
        }
    }

    /// Drop one entry and detach its in-flight fetch, leaving the rest of
    /// the scope alone.
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.remove(key);
        self.in_flight.remove(key);
    }

    /// Drop every entry of `scope` and detach its in-flight fetches.
    pub fn clear(&self, scope: CacheScope) {
        self.generations[scope.index()].fetch_add(1, Ordering::SeqCst);
        self.entries.retain(|k, _| k.scope != scope);
        self.in_flight.retain(|k, _| k.scope != scope);
    }

    pub fn clear_all(&self) {
        for g in &self.generations {
            g.fetch_add(1, Ordering::SeqCst);
        }
        self.entries.clear();
        // Drop all senders so new callers start fresh fetches.
        self.in_flight.clear();
    }

    /// Stored entries, fresh or not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len_scope(&self, scope: CacheScope) -> usize {
        self.entries.iter().filter(|e| e.key().scope == scope).count()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            in_flight: self.in_flight.len(),
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            coalesced: self.stats.coalesced.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicUsize;

    type TestCache = TtlCache<String, String>;

    fn cache() -> (Arc<ManualClock>, TestCache) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = TtlCache::new(TtlPolicy::default(), clock.clone());
        (clock, cache)
    }

    fn job_key(id: u64) -> CacheKey {
        CacheKey::new(CacheScope::Job, id.to_string())
    }

    #[test]
    fn fresh_within_ttl_then_expires() {
        let (clock, cache) = cache();
        let key = job_key(1);
        cache.put(key.clone(), "v1".to_string());

        clock.advance(Duration::from_millis(14_999));
        assert_eq!(cache.get(&key).as_deref(), Some("v1"));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.len(), 0, "expired entry evicted on read");
    }

    #[test]
    fn scopes_have_their_own_ttl() {
        let (clock, cache) = cache();
        let role = CacheKey::new(CacheScope::Role, "0xa");
        let job = job_key(1);
        cache.put(role.clone(), "r".to_string());
        cache.put(job.clone(), "j".to_string());

        clock.advance(Duration::from_secs(20));
        assert!(cache.get(&job).is_none());
        assert!(cache.get(&role).is_some());
    }

    #[test]
    fn actions_are_distinct_keys() {
        let (_clock, cache) = cache();
        cache.put(job_key(1).with_action("details"), "d".to_string());
        assert!(cache.get(&job_key(1)).is_none());
        assert_eq!(
            cache.get(&job_key(1).with_action("details")).as_deref(),
            Some("d")
        );
        assert_eq!(job_key(1).with_action("details").to_string(), "job:1:details");
    }

    #[test]
    fn clear_scope_keeps_other_scopes() {
        let (_clock, cache) = cache();
        cache.put(job_key(1), "j".to_string());
        cache.put(CacheKey::new(CacheScope::Dispute, "1"), "d".to_string());
        cache.clear(CacheScope::Job);
        assert!(cache.get(&job_key(1)).is_none());
        assert_eq!(cache.len_scope(CacheScope::Dispute), 1);
        cache.clear_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_drops_only_that_key() {
        let (_clock, cache) = cache();
        cache.put(job_key(1), "one".to_string());
        cache.put(job_key(2), "two".to_string());
        cache.invalidate(&job_key(1));
        assert!(cache.get(&job_key(1)).is_none());
        assert_eq!(cache.get(&job_key(2)).as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn fetch_then_hit() {
        let (clock, cache) = cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let fetch = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(Some("fetched".to_string()))
        };

        let key = job_key(7);
        assert_eq!(cache.get_or_fetch(&key, fetch).await.unwrap().as_deref(), Some("fetched"));
        assert_eq!(cache.get_or_fetch(&key, fetch).await.unwrap().as_deref(), Some("fetched"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(15));
        cache.get_or_fetch(&key, fetch).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2, "expired entry refetched");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn not_found_and_errors_are_not_cached() {
        let (_clock, cache) = cache();
        let key = job_key(8);

        let absent = cache
            .get_or_fetch(&key, || async { Ok::<_, String>(None) })
            .await;
        assert_eq!(absent, Ok(None));

        let failed = cache
            .get_or_fetch(&key, || async { Err::<Option<String>, _>("down".to_string()) })
            .await;
        assert_eq!(failed, Err("down".to_string()));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let (_clock, cache) = cache();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let key = job_key(9);

        let slow = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>(Some("shared".to_string()))
        };

        let (a, b, c) = tokio::join!(
            cache.get_or_fetch(&key, slow),
            cache.get_or_fetch(&key, slow),
            cache.get_or_fetch(&key, slow),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for r in [a, b, c] {
            assert_eq!(r.unwrap().as_deref(), Some("shared"));
        }
        assert_eq!(cache.stats().coalesced, 2);
    }

    #[tokio::test]
    async fn waiters_share_errors() {
        let (_clock, cache) = cache();
        let key = job_key(10);
        let slow_err = || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<Option<String>, _>("timeout".to_string())
        };
        let (a, b) = tokio::join!(
            cache.get_or_fetch(&key, slow_err),
            cache.get_or_fetch(&key, slow_err),
        );
        assert_eq!(a, Err("timeout".to_string()));
        assert_eq!(b, Err("timeout".to_string()));
    }

    #[tokio::test]
    async fn clear_during_fetch_blocks_repopulation() {
        let (_clock, cache) = cache();
        let key = job_key(11);
        let shared = &cache;

        let result = cache
            .get_or_fetch(&key, || async move {
                shared.clear(CacheScope::Job);
                Ok::<_, String>(Some("stale".to_string()))
            })
            .await;
        assert_eq!(result.unwrap().as_deref(), Some("stale"));
        assert!(cache.get(&key).is_none());
    }

    #[tokio::test]
    async fn abandoned_fetch_lets_waiters_retry() {
        let (_clock, cache) = cache();
        let key = job_key(12);

        // Start a fetch and drop it before it completes.
        {
            let pending = cache.get_or_fetch(&key, || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, String>(Some("never".to_string()))
            });
            let _ = tokio::time::timeout(Duration::from_millis(5), pending).await;
        }
        assert_eq!(cache.stats().in_flight, 0);

        let value = cache
            .get_or_fetch(&key, || async { Ok::<_, String>(Some("retry".to_string())) })
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("retry"));
    }
}
