//! Entry store.
//!
//! Holds one [`EntryState`] per key together with its subscriber count and
//! the most recently registered fetcher. Every state change is published on
//! the [`NotificationBus`] after the store lock has been released.

use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;
use lru::LruCache;
use metrics::{counter, gauge};
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::debug;

use super::bus::{Callback, NotificationBus, SubscriberId};
use super::error::QueryError;
use super::keys::QueryKey;
use super::lock::{rw_read, rw_write};
use super::retry::{Backoff, RetryPolicy};

const SOURCE: &str = "query::store";

const METRIC_ENTRIES: &str = "callboard_query_entries";
const METRIC_EVICT: &str = "callboard_query_evict_total";

/// Type-erased cached value. Typed access downcasts to the namespace's type.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Type-erased fetch function registered for a key.
pub type FetchFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Payload, QueryError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    Idle,
    Pending,
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Per-query fetch behaviour.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub stale_time: Duration,
    pub retry: RetryPolicy,
    pub backoff: Backoff,
    pub timeout: Duration,
}

/// A fetch function together with the options it was registered with.
#[derive(Clone)]
pub struct Fetcher {
    pub fetch: FetchFn,
    pub options: FetchOptions,
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

struct EntryState {
    status: QueryStatus,
    value: Option<Payload>,
    error: Option<QueryError>,
    fetched_at: Option<Instant>,
    stale_at: Option<Instant>,
    created_at: Instant,
    updated_at: OffsetDateTime,
    subscriber_count: usize,
    fetcher: Option<Fetcher>,
}

impl EntryState {
    fn new() -> Self {
        Self {
            status: QueryStatus::Idle,
            value: None,
            error: None,
            fetched_at: None,
            stale_at: None,
            created_at: Instant::now(),
            updated_at: OffsetDateTime::now_utc(),
            subscriber_count: 0,
            fetcher: None,
        }
    }

    fn snapshot(&self, key: &QueryKey) -> EntrySnapshot {
        EntrySnapshot {
            key: key.clone(),
            status: self.status,
            value: self.value.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            stale_at: self.stale_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            subscriber_count: self.subscriber_count,
        }
    }

    fn apply(&mut self, patch: EntryPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(value) = patch.value {
            self.value = Some(value);
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
        if let Some(fetched_at) = patch.fetched_at {
            self.fetched_at = Some(fetched_at);
        }
        if let Some(stale_at) = patch.stale_at {
            self.stale_at = Some(stale_at);
        }
        if self.status == QueryStatus::Success {
            self.error = None;
        }
        self.updated_at = OffsetDateTime::now_utc();
    }
}

/// Read-only copy of a cache entry.
#[derive(Clone)]
pub struct EntrySnapshot {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub value: Option<Payload>,
    pub error: Option<QueryError>,
    pub fetched_at: Option<Instant>,
    pub stale_at: Option<Instant>,
    pub created_at: Instant,
    /// Wall-clock time of the last transition.
    pub updated_at: OffsetDateTime,
    pub subscriber_count: usize,
}

impl EntrySnapshot {
    /// Entries that were never fetched or whose `stale_at` has passed are stale.
    pub fn is_stale(&self, now: Instant) -> bool {
        self.stale_at.is_none_or(|stale_at| now >= stale_at)
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

impl fmt::Debug for EntrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntrySnapshot")
            .field("key", &self.key)
            .field("status", &self.status)
            .field("has_value", &self.value.is_some())
            .field("error", &self.error)
            .field("fetched_at", &self.fetched_at)
            .field("stale_at", &self.stale_at)
            .field("subscriber_count", &self.subscriber_count)
            .finish()
    }
}

/// Partial update of an entry. `None` fields are left untouched.
///
/// A value can only be replaced, never cleared: failed refreshes keep the
/// last good data.
#[derive(Default)]
pub struct EntryPatch {
    pub status: Option<QueryStatus>,
    pub value: Option<Payload>,
    pub error: Option<Option<QueryError>>,
    pub fetched_at: Option<Instant>,
    pub stale_at: Option<Instant>,
}

impl EntryPatch {
    pub fn pending() -> Self {
        Self {
            status: Some(QueryStatus::Pending),
            ..Default::default()
        }
    }

    pub fn success(value: Payload, now: Instant, stale_time: Duration) -> Self {
        Self {
            status: Some(QueryStatus::Success),
            value: Some(value),
            error: Some(None),
            fetched_at: Some(now),
            stale_at: Some(now + stale_time),
        }
    }

    pub fn failure(error: QueryError) -> Self {
        Self {
            status: Some(QueryStatus::Error),
            error: Some(Some(error)),
            ..Default::default()
        }
    }
}

/// Outcome of [`EntryStore::invalidate`].
#[derive(Debug, Default)]
pub struct Invalidation {
    /// Every key that was marked stale.
    pub stale: Vec<QueryKey>,
    /// Observed keys that should be refetched now.
    pub refetch: Vec<(QueryKey, Fetcher)>,
}

pub struct EntryStore {
    entries: RwLock<LruCache<QueryKey, EntryState>>,
    bus: Arc<NotificationBus>,
    max_entries: Option<NonZeroUsize>,
}

impl EntryStore {
    pub fn new(bus: Arc<NotificationBus>, max_entries: Option<NonZeroUsize>) -> Self {
        Self {
            entries: RwLock::new(LruCache::unbounded()),
            bus,
            max_entries,
        }
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    pub fn get(&self, key: &QueryKey) -> Option<EntrySnapshot> {
        rw_write(&self.entries, SOURCE, "get")
            .get(key)
            .map(|state| state.snapshot(key))
    }

    /// Merges `patch` into the entry for `key`, creating it if absent.
    pub fn upsert(&self, key: &QueryKey, patch: EntryPatch) -> EntrySnapshot {
        let snapshot = {
            let mut entries = rw_write(&self.entries, SOURCE, "upsert");
            let state = entries.get_or_insert_mut(key.clone(), EntryState::new);
            state.apply(patch);
            let snapshot = state.snapshot(key);
            self.enforce_capacity(&mut entries);
            gauge!(METRIC_ENTRIES).set(entries.len() as f64);
            snapshot
        };
        self.bus.publish(key);
        snapshot
    }

    /// Registers `callback` for `key` and counts it as a subscriber.
    pub fn subscribe(self: &Arc<Self>, key: &QueryKey, callback: Callback) -> Subscription {
        {
            let mut entries = rw_write(&self.entries, SOURCE, "subscribe");
            let state = entries.get_or_insert_mut(key.clone(), EntryState::new);
            state.subscriber_count += 1;
            gauge!(METRIC_ENTRIES).set(entries.len() as f64);
        }
        let id = self.bus.subscribe(key.clone(), callback);
        debug!(key = %key, subscriber = id, "Query subscriber added");
        Subscription {
            store: Arc::clone(self),
            key: key.clone(),
            id,
        }
    }

    fn release(&self, key: &QueryKey, id: SubscriberId) {
        if !self.bus.unsubscribe(key, id) {
            return;
        }
        if let Some(state) = rw_write(&self.entries, SOURCE, "release").peek_mut(key) {
            state.subscriber_count = state.subscriber_count.saturating_sub(1);
        }
        debug!(key = %key, subscriber = id, "Query subscriber removed");
    }

    /// Remembers how `key` is fetched so invalidation can refetch it.
    pub fn register_fetcher(&self, key: &QueryKey, fetcher: Fetcher) {
        rw_write(&self.entries, SOURCE, "register_fetcher")
            .get_or_insert_mut(key.clone(), EntryState::new)
            .fetcher = Some(fetcher);
    }

    pub fn fetcher(&self, key: &QueryKey) -> Option<Fetcher> {
        rw_read(&self.entries, SOURCE, "fetcher")
            .peek(key)
            .and_then(|state| state.fetcher.clone())
    }

    /// Marks every entry under `prefix` stale without dropping its value.
    pub fn invalidate(&self, prefix: &QueryKey, now: Instant) -> Invalidation {
        let mut invalidation = Invalidation::default();
        {
            let mut entries = rw_write(&self.entries, SOURCE, "invalidate");
            for (key, state) in entries.iter_mut() {
                if !key.starts_with(prefix) {
                    continue;
                }
                state.stale_at = Some(state.stale_at.map_or(now, |at| at.min(now)));
                state.updated_at = OffsetDateTime::now_utc();
                invalidation.stale.push(key.clone());
                if state.subscriber_count > 0
                    && let Some(fetcher) = &state.fetcher
                {
                    invalidation.refetch.push((key.clone(), fetcher.clone()));
                }
            }
        }

        counter!("callboard_query_invalidate_total").increment(invalidation.stale.len() as u64);
        debug!(
            prefix = %prefix,
            stale = invalidation.stale.len(),
            refetch = invalidation.refetch.len(),
            "Query prefix invalidated"
        );
        self.bus.batch(|| {
            for key in &invalidation.stale {
                self.bus.publish(key);
            }
        });
        invalidation
    }

    /// Snapshots of all entries whose key starts with `prefix`.
    pub fn find(&self, prefix: &QueryKey) -> Vec<EntrySnapshot> {
        rw_read(&self.entries, SOURCE, "find")
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, state)| state.snapshot(key))
            .collect()
    }

    /// Removes unobserved entries matching `predicate`.
    ///
    /// Entries with subscribers or a fetch in progress are always kept.
    pub fn evict_where(&self, predicate: impl Fn(&EntrySnapshot) -> bool) -> Vec<QueryKey> {
        let mut entries = rw_write(&self.entries, SOURCE, "evict_where");
        let doomed: Vec<QueryKey> = entries
            .iter()
            .filter(|(_, state)| Self::evictable(state))
            .filter(|(key, state)| predicate(&state.snapshot(key)))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        gauge!(METRIC_ENTRIES).set(entries.len() as f64);
        doomed
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
        gauge!(METRIC_ENTRIES).set(0.0);
    }

    fn evictable(state: &EntryState) -> bool {
        state.subscriber_count == 0 && state.status != QueryStatus::Pending
    }

    /// Drops least recently used, unobserved entries above the bound.
    fn enforce_capacity(&self, entries: &mut LruCache<QueryKey, EntryState>) {
        let Some(max) = self.max_entries else {
            return;
        };
        let excess = entries.len().saturating_sub(max.get());
        if excess == 0 {
            return;
        }
        let victims: Vec<QueryKey> = entries
            .iter()
            .rev()
            .filter(|(_, state)| Self::evictable(state))
            .take(excess)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &victims {
            entries.pop(key);
            debug!(key = %key, "Query entry evicted over capacity");
        }
        counter!(METRIC_EVICT, "reason" => "capacity").increment(victims.len() as u64);
    }
}

/// Keeps a callback registered; dropping it unsubscribes.
pub struct Subscription {
    store: Arc<EntryStore>,
    key: QueryKey,
    id: SubscriberId,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.store.release(&self.key, self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::query::bus::Notification;
    use crate::query_key;

    fn store(max_entries: usize) -> Arc<EntryStore> {
        Arc::new(EntryStore::new(
            Arc::new(NotificationBus::new()),
            NonZeroUsize::new(max_entries),
        ))
    }

    fn noop() -> Callback {
        Arc::new(|_: &Notification| {})
    }

    fn payload(n: u32) -> Payload {
        Arc::new(n)
    }

    #[tokio::test(start_paused = true)]
    async fn upsert_creates_and_merges() {
        let store = store(0);
        let key = query_key!["admins", 1, 10, ""];
        assert!(store.get(&key).is_none());

        let pending = store.upsert(&key, EntryPatch::pending());
        assert_eq!(pending.status, QueryStatus::Pending);
        assert!(pending.value.is_none());

        let now = Instant::now();
        let done = store.upsert(
            &key,
            EntryPatch::success(payload(7), now, Duration::from_secs(60)),
        );
        assert_eq!(done.status, QueryStatus::Success);
        assert_eq!(done.stale_at, Some(now + Duration::from_secs(60)));
        assert!(!done.is_stale(now));
        assert!(done.is_stale(now + Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_previous_value() {
        let store = store(0);
        let key = query_key!["settings", 1, 10];
        let now = Instant::now();
        store.upsert(&key, EntryPatch::success(payload(1), now, Duration::ZERO));
        let failed = store.upsert(&key, EntryPatch::failure(QueryError::transient("down")));

        assert_eq!(failed.status, QueryStatus::Error);
        assert!(failed.has_value());
        assert_eq!(failed.error, Some(QueryError::transient("down")));
    }

    #[tokio::test(start_paused = true)]
    async fn upsert_notifies_subscribers() {
        let store = store(0);
        let key = query_key!["dashboard", "main"];
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let _sub = store.subscribe(
            &key,
            Arc::new(move |_: &Notification| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        store.upsert(&key, EntryPatch::pending());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_drop_decrements_count() {
        let store = store(0);
        let key = query_key!["managers", 1, 10, ""];
        let first = store.subscribe(&key, noop());
        let second = store.subscribe(&key, noop());
        assert_eq!(store.get(&key).map(|e| e.subscriber_count), Some(2));

        drop(first);
        assert_eq!(store.get(&key).map(|e| e.subscriber_count), Some(1));
        drop(second);
        let entry = store.get(&key).expect("entry survives unsubscribe");
        assert_eq!(entry.subscriber_count, 0);
        assert_eq!(entry.status, QueryStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_marks_prefix_matches_only() {
        let store = store(0);
        let now = Instant::now();
        let hour = Duration::from_secs(3600);
        let list = query_key!["managers", 1, 10, ""];
        let view = query_key!["managers", "view", 3, "all"];
        let calls = query_key!["calls", "catalog", 1];
        for key in [&list, &view, &calls] {
            store.upsert(key, EntryPatch::success(payload(1), now, hour));
        }

        let invalidation = store.invalidate(&query_key!["managers"], now);

        assert_eq!(invalidation.stale.len(), 2);
        assert!(invalidation.refetch.is_empty());
        assert!(store.get(&list).expect("list").is_stale(now));
        assert!(store.get(&view).expect("view").is_stale(now));
        assert!(!store.get(&calls).expect("calls").is_stale(now));
        assert!(store.get(&list).expect("list").has_value());
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_bound_skips_observed_entries() {
        let store = store(2);
        let now = Instant::now();
        let observed = query_key!["calls", 1];
        let _sub = store.subscribe(&observed, noop());
        store.upsert(&observed, EntryPatch::success(payload(1), now, Duration::ZERO));
        store.upsert(&query_key!["calls", 2], EntryPatch::success(payload(2), now, Duration::ZERO));
        store.upsert(&query_key!["calls", 3], EntryPatch::success(payload(3), now, Duration::ZERO));

        assert_eq!(store.len(), 2);
        assert!(store.get(&observed).is_some());
        assert!(store.get(&query_key!["calls", 2]).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn evict_where_keeps_subscribed_entries() {
        let store = store(0);
        let kept = query_key!["processes", "statistics"];
        let dropped = query_key!["processes", "catalog", 1];
        let _sub = store.subscribe(&kept, noop());
        store.upsert(&dropped, EntryPatch::failure(QueryError::transient("x")));

        let evicted = store.evict_where(|_| true);

        assert_eq!(evicted, vec![dropped.clone()]);
        assert!(store.get(&kept).is_some());
        assert!(store.get(&dropped).is_none());
    }
}
