//! Typed query observers.
//!
//! A [`Query`] binds one key to a subscriber, keeps its entry fresh and
//! exposes the cached value as `Arc<T>`. Change notifications from the bus
//! are adapted to an async [`Query::changed`] stream of wake-ups.

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::debug;

use super::bus::Notification;
use super::config::QueryConfig;
use super::error::QueryError;
use super::fetch::FetchExecutor;
use super::keys::QueryKey;
use super::namespace::Namespace;
use super::retry::{Backoff, RetryPolicy};
use super::store::{EntrySnapshot, EntryStore, FetchOptions, Fetcher, Payload, QueryStatus};

type TypedFetch<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync>;

/// Key, fetch function and per-query overrides of a [`Query`].
pub struct QueryOptions<T> {
    key: QueryKey,
    fetch: TypedFetch<T>,
    stale_time: Option<Duration>,
    retry: Option<RetryPolicy>,
    backoff: Option<Backoff>,
    timeout: Option<Duration>,
    enabled: bool,
    refetch_interval: Option<Duration>,
    keep_previous_data: bool,
}

impl<T> QueryOptions<T>
where
    T: Send + Sync + 'static,
{
    pub fn new<F, Fut>(key: QueryKey, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        Self {
            key,
            fetch: Arc::new(move || fetch().boxed()),
            stale_time: None,
            retry: None,
            backoff: None,
            timeout: None,
            enabled: true,
            refetch_interval: None,
            keep_previous_data: false,
        }
    }

    /// Fetches a raw JSON body and decodes it through namespace `N`.
    pub fn decoded<N, F, Fut>(key: QueryKey, fetch: F) -> Self
    where
        N: Namespace<Response = T>,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, QueryError>> + Send + 'static,
    {
        Self::new(key, move || fetch().map(|body| body.and_then(N::decode)))
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disabled queries never fetch on their own.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Refetch periodically while the query is alive.
    pub fn refetch_interval(mut self, period: Duration) -> Self {
        self.refetch_interval = Some(period);
        self
    }

    /// Keep showing the previous key's data until the new key has its own.
    pub fn keep_previous_data(mut self, keep: bool) -> Self {
        self.keep_previous_data = keep;
        self
    }

    pub(crate) fn fetcher(&self, defaults: &QueryConfig) -> Fetcher {
        let fetch = Arc::clone(&self.fetch);
        Fetcher {
            fetch: Arc::new(move || {
                fetch()
                    .map(|result| result.map(|value| Arc::new(value) as Payload))
                    .boxed()
            }),
            options: FetchOptions {
                stale_time: self.stale_time.unwrap_or_else(|| defaults.stale_time()),
                retry: self.retry.clone().unwrap_or_else(|| defaults.query_retry()),
                backoff: self.backoff.clone().unwrap_or_else(|| defaults.backoff()),
                timeout: self.timeout.unwrap_or_else(|| defaults.request_timeout()),
            },
        }
    }
}

impl<T> fmt::Debug for QueryOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("key", &self.key)
            .field("stale_time", &self.stale_time)
            .field("enabled", &self.enabled)
            .field("refetch_interval", &self.refetch_interval)
            .field("keep_previous_data", &self.keep_previous_data)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of a query.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    pub status: QueryStatus,
    pub data: Option<Arc<T>>,
    pub error: Option<QueryError>,
    pub is_fetching: bool,
    pub is_stale: bool,
    /// `data` belongs to the previous key.
    pub is_placeholder_data: bool,
    pub updated_at: Option<OffsetDateTime>,
}

pub(crate) fn downcast<T: Send + Sync + 'static>(payload: Payload) -> Result<Arc<T>, QueryError> {
    payload
        .downcast::<T>()
        .map_err(|_| QueryError::decode(format!("cached value is not a {}", type_name::<T>())))
}

/// Live handle on one cached key.
pub struct Query<T> {
    store: Arc<EntryStore>,
    executor: Arc<FetchExecutor>,
    defaults: Arc<QueryConfig>,
    key: QueryKey,
    fetcher: Fetcher,
    enabled: bool,
    keep_previous_data: bool,
    previous: Option<Payload>,
    notify: Arc<watch::Sender<u64>>,
    changes: watch::Receiver<u64>,
    subscription: super::store::Subscription,
    poller: Option<JoinHandle<()>>,
    _type: PhantomData<fn() -> T>,
}

impl<T> Query<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(
        options: QueryOptions<T>,
        store: Arc<EntryStore>,
        executor: Arc<FetchExecutor>,
        defaults: Arc<QueryConfig>,
    ) -> Self {
        let (sender, changes) = watch::channel(0_u64);
        let notify = Arc::new(sender);
        let fetcher = options.fetcher(&defaults);
        let subscription = store.subscribe(&options.key, wake(&notify));

        let mut query = Self {
            store,
            executor,
            defaults,
            key: options.key,
            fetcher,
            enabled: options.enabled,
            keep_previous_data: options.keep_previous_data,
            previous: None,
            notify,
            changes,
            subscription,
            poller: None,
            _type: PhantomData,
        };
        query.activate(options.refetch_interval);
        query
    }

    /// Starts fetching and polling for the current key if enabled.
    fn activate(&mut self, refetch_interval: Option<Duration>) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        if !self.enabled {
            return;
        }
        self.executor.ensure_fresh(&self.key, self.fetcher.clone());
        if let Some(period) = refetch_interval.filter(|period| !period.is_zero()) {
            self.poller = Some(self.spawn_poller(period));
        }
    }

    fn spawn_poller(&self, period: Duration) -> JoinHandle<()> {
        let executor = Arc::clone(&self.executor);
        let key = self.key.clone();
        let fetcher = self.fetcher.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if executor.is_closed() {
                    break;
                }
                debug!(key = %key, "Query interval refetch");
                executor.refetch(&key, fetcher.clone());
            }
        })
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn entry(&self) -> Option<EntrySnapshot> {
        self.store.get(&self.key)
    }

    pub fn status(&self) -> QueryStatus {
        self.entry().map_or(QueryStatus::Idle, |entry| entry.status)
    }

    /// Cached value of this key, or of the previous key while it has none.
    pub fn data(&self) -> Option<Arc<T>> {
        self.state().data
    }

    pub fn error(&self) -> Option<QueryError> {
        self.entry().and_then(|entry| entry.error)
    }

    /// Pending without any data to show.
    pub fn is_loading(&self) -> bool {
        let state = self.state();
        state.is_fetching && state.data.is_none()
    }

    pub fn is_fetching(&self) -> bool {
        self.executor.in_flight(&self.key).is_some() || self.status() == QueryStatus::Pending
    }

    pub fn is_stale(&self) -> bool {
        self.entry()
            .is_none_or(|entry| entry.is_stale(Instant::now()))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> QueryState<T> {
        let entry = self.entry();
        let own = entry
            .as_ref()
            .and_then(|entry| entry.value.clone())
            .and_then(|payload| downcast::<T>(payload).ok());
        let placeholder = if own.is_none() && self.keep_previous_data {
            self.previous
                .clone()
                .and_then(|payload| downcast::<T>(payload).ok())
        } else {
            None
        };
        let is_placeholder_data = placeholder.is_some();
        let now = Instant::now();

        QueryState {
            status: entry.as_ref().map_or(QueryStatus::Idle, |entry| entry.status),
            data: own.or(placeholder),
            error: entry.as_ref().and_then(|entry| entry.error.clone()),
            is_fetching: self.is_fetching(),
            is_stale: entry.as_ref().is_none_or(|entry| entry.is_stale(now)),
            is_placeholder_data,
            updated_at: entry.map(|entry| entry.updated_at),
        }
    }

    /// Fetches again, ignoring freshness and `enabled`.
    pub async fn refetch(&self) -> Result<Arc<T>, QueryError> {
        self.executor
            .refetch(&self.key, self.fetcher.clone())
            .wait()
            .await
            .and_then(downcast::<T>)
    }

    /// Waits for the current request, or fetches if there is nothing to show.
    ///
    /// Like [`Query::refetch`] this is an explicit request: on a disabled
    /// query with nothing cached it fetches once.
    pub async fn settled(&self) -> Result<Arc<T>, QueryError> {
        if let Some(request) = self.executor.in_flight(&self.key) {
            return request.wait().await.and_then(downcast::<T>);
        }
        match self.entry() {
            Some(entry) if entry.status == QueryStatus::Error => {
                Err(entry.error.unwrap_or(QueryError::Cancelled))
            }
            Some(EntrySnapshot {
                value: Some(value),
                ..
            }) => downcast::<T>(value),
            _ => self.refetch().await,
        }
    }

    /// Waits until the entry publishes a change not yet seen by this handle.
    pub async fn changed(&mut self) {
        // The sender lives as long as `self`, so this cannot fail.
        let _ = self.changes.changed().await;
    }

    /// Rebinds the handle to another key.
    ///
    /// With `keep_previous_data` the current data stays visible as
    /// placeholder until the new key has data of its own.
    pub fn switch(&mut self, options: QueryOptions<T>) {
        if options.key == self.key {
            return;
        }
        self.previous = if options.keep_previous_data {
            self.data().map(|data| data as Payload)
        } else {
            None
        };
        debug!(from = %self.key, to = %options.key, "Query key switched");

        self.subscription = self.store.subscribe(&options.key, wake(&self.notify));
        self.fetcher = options.fetcher(&self.defaults);
        self.key = options.key;
        self.enabled = options.enabled;
        self.keep_previous_data = options.keep_previous_data;
        self.notify.send_modify(|version| *version = version.wrapping_add(1));
        self.activate(options.refetch_interval);
    }
}

impl<T> Drop for Query<T> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key)
            .field("enabled", &self.enabled)
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

fn wake(notify: &Arc<watch::Sender<u64>>) -> super::bus::Callback {
    let notify = Arc::clone(notify);
    Arc::new(move |_: &Notification| {
        notify.send_modify(|version| *version = version.wrapping_add(1));
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::sleep;

    use super::*;
    use crate::query::bus::NotificationBus;
    use crate::query_key;

    struct Harness {
        store: Arc<EntryStore>,
        executor: Arc<FetchExecutor>,
        defaults: Arc<QueryConfig>,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(EntryStore::new(Arc::new(NotificationBus::new()), None));
            Self {
                executor: Arc::new(FetchExecutor::new(Arc::clone(&store))),
                store,
                defaults: Arc::new(QueryConfig::default()),
            }
        }

        fn query<T: Send + Sync + 'static>(&self, options: QueryOptions<T>) -> Query<T> {
            Query::new(
                options,
                Arc::clone(&self.store),
                Arc::clone(&self.executor),
                Arc::clone(&self.defaults),
            )
        }
    }

    fn page(calls: &Arc<AtomicU32>, key: QueryKey, base: u32) -> QueryOptions<u32> {
        let calls = Arc::clone(calls);
        QueryOptions::new(key, move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                sleep(Duration::from_millis(50)).await;
                Ok(base + n)
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn loading_then_data() {
        let harness = Harness::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = harness.query(page(&calls, query_key!["admins", 1, 10, ""], 100));

        assert!(query.is_loading());
        assert_eq!(*query.settled().await.expect("data"), 100);
        assert!(!query.is_loading());
        assert!(!query.is_fetching());
        assert_eq!(query.status(), QueryStatus::Success);
        assert!(!query.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_query_does_not_fetch() {
        let harness = Harness::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = harness
            .query(page(&calls, query_key!["managers", "view", 0, "all"], 0).enabled(false));

        sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(query.status(), QueryStatus::Idle);
        assert!(!query.is_loading());

        assert_eq!(*query.refetch().await.expect("manual refetch"), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_on_disabled_query_fetches_once() {
        let harness = Harness::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query =
            harness.query(page(&calls, query_key!["call", "view", 0], 7).enabled(false));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(*query.settled().await.expect("explicit wait fetches"), 7);
        assert_eq!(*query.settled().await.expect("served from cache"), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn changed_wakes_on_settle() {
        let harness = Harness::new();
        let calls = Arc::new(AtomicU32::new(0));
        let mut query = harness.query(page(&calls, query_key!["dashboard", "main"], 1));

        // Pending transition, then success.
        query.changed().await;
        while query.data().is_none() {
            query.changed().await;
        }
        assert_eq!(query.data().as_deref(), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_refetches_until_dropped() {
        let harness = Harness::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = harness.query(
            page(&calls, query_key!["processes", "statistics"], 0)
                .refetch_interval(Duration::from_secs(300)),
        );
        query.settled().await.expect("first fetch");

        sleep(Duration::from_secs(301)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        drop(query);
        sleep(Duration::from_secs(900)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_keeps_previous_data_as_placeholder() {
        let harness = Harness::new();
        let calls = Arc::new(AtomicU32::new(0));
        let mut query = harness.query(
            page(&calls, query_key!["calls", "catalog", 1], 10).keep_previous_data(true),
        );
        assert_eq!(*query.settled().await.expect("page 1"), 10);

        query.switch(page(&calls, query_key!["calls", "catalog", 2], 20).keep_previous_data(true));
        let state = query.state();
        assert!(state.is_placeholder_data);
        assert!(state.is_fetching);
        assert_eq!(state.data.as_deref(), Some(&10));

        assert_eq!(*query.settled().await.expect("page 2"), 21);
        assert!(!query.state().is_placeholder_data);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_without_keep_previous_data_starts_empty() {
        let harness = Harness::new();
        let calls = Arc::new(AtomicU32::new(0));
        let mut query = harness.query(page(&calls, query_key!["settings", 1, 10], 0));
        query.settled().await.expect("page 1");

        query.switch(page(&calls, query_key!["settings", 2, 10], 0));
        assert!(query.is_loading());
        assert!(query.data().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_type_is_a_decode_error() {
        let harness = Harness::new();
        let calls = Arc::new(AtomicU32::new(0));
        let key = query_key!["call", "view", 4];
        let numbers = harness.query(page(&calls, key.clone(), 0));
        numbers.settled().await.expect("u32 data");

        let text = harness.query(QueryOptions::new(key, || async { Ok(String::from("x")) }));
        assert!(matches!(text.settled().await, Err(QueryError::Decode(_))));
    }
}
