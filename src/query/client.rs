//! The query client: one explicitly constructed cache per application.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

use super::bus::NotificationBus;
use super::config::QueryConfig;
use super::error::QueryError;
use super::fetch::{FetchExecutor, InFlight};
use super::gc::{Collector, SweepReport};
use super::keys::QueryKey;
use super::lock::mutex_lock;
use super::mutation::{Mutation, MutationOptions};
use super::observer::{Query, QueryOptions, downcast};
use super::store::{EntryPatch, EntrySnapshot, EntryStore, Payload};

const SOURCE: &str = "query::client";

struct ClientInner {
    config: Arc<QueryConfig>,
    store: Arc<EntryStore>,
    executor: Arc<FetchExecutor>,
    collector: Arc<Collector>,
    gc_task: Mutex<Option<JoinHandle<()>>>,
}

/// Shared handle on the cache. Clones refer to the same cache.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

impl QueryClient {
    /// Creates a cache and starts its garbage collector.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: QueryConfig) -> Self {
        let bus = Arc::new(NotificationBus::new());
        let store = Arc::new(EntryStore::new(bus, config.max_entries_non_zero()));
        let executor = Arc::new(FetchExecutor::new(Arc::clone(&store)));
        let collector = Arc::new(Collector::new(Arc::clone(&store), config.gc_time()));
        let gc_task = (!config.gc_interval().is_zero())
            .then(|| Arc::clone(&collector).spawn(config.gc_interval()));

        info!(
            stale_time_ms = config.stale_time_ms,
            gc_time_ms = config.gc_time_ms,
            retry = config.retry,
            max_entries = config.max_entries,
            "Query client started"
        );

        Self {
            inner: Arc::new(ClientInner {
                config: Arc::new(config),
                store,
                executor,
                collector,
                gc_task: Mutex::new(gc_task),
            }),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    /// Observes a key, fetching it if absent or stale.
    pub fn query<T>(&self, options: QueryOptions<T>) -> Query<T>
    where
        T: Send + Sync + 'static,
    {
        Query::new(
            options,
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.executor),
            Arc::clone(&self.inner.config),
        )
    }

    pub fn mutation<I, R>(&self, options: MutationOptions<I, R>) -> Mutation<I, R>
    where
        I: Clone + Send + 'static,
        R: Send + 'static,
    {
        Mutation::new(options, Arc::clone(&self.inner.executor), &self.inner.config)
    }

    /// Warms the cache for a key without observing it.
    pub fn prefetch<T>(&self, options: QueryOptions<T>) -> Option<InFlight>
    where
        T: Send + Sync + 'static,
    {
        let fetcher = options.fetcher(&self.inner.config);
        self.inner.executor.ensure_fresh(options.key(), fetcher)
    }

    /// Marks every entry under `prefix` stale; observed ones refetch.
    pub fn invalidate(&self, prefix: &QueryKey) -> Vec<InFlight> {
        self.inner.executor.invalidate(std::slice::from_ref(prefix))
    }

    pub fn invalidate_all(&self, prefixes: &[QueryKey]) -> Vec<InFlight> {
        self.inner.executor.invalidate(prefixes)
    }

    pub fn entry(&self, key: &QueryKey) -> Option<EntrySnapshot> {
        self.inner.store.get(key)
    }

    pub fn query_data<T>(&self, key: &QueryKey) -> Result<Option<Arc<T>>, QueryError>
    where
        T: Send + Sync + 'static,
    {
        self.entry(key)
            .and_then(|entry| entry.value)
            .map(downcast::<T>)
            .transpose()
    }

    /// Writes a value as if it had just been fetched.
    pub fn set_query_data<T>(&self, key: &QueryKey, value: T) -> EntrySnapshot
    where
        T: Send + Sync + 'static,
    {
        let payload: Payload = Arc::new(value);
        self.inner.store.upsert(
            key,
            EntryPatch::success(payload, Instant::now(), self.inner.config.stale_time()),
        )
    }

    /// Refetches stale observed queries after the window regained focus.
    pub fn window_focused(&self) -> Vec<InFlight> {
        if !self.inner.config.refetch_on_window_focus {
            return Vec::new();
        }
        self.refetch_stale_observed("window_focus")
    }

    /// Refetches stale observed queries after the network came back.
    pub fn reconnected(&self) -> Vec<InFlight> {
        if !self.inner.config.refetch_on_reconnect {
            return Vec::new();
        }
        self.refetch_stale_observed("reconnect")
    }

    fn refetch_stale_observed(&self, trigger: &'static str) -> Vec<InFlight> {
        let now = Instant::now();
        let store = &self.inner.store;
        let requests: Vec<InFlight> = store
            .find(&QueryKey::new([]))
            .into_iter()
            .filter(|entry| entry.subscriber_count > 0 && entry.is_stale(now))
            .filter_map(|entry| {
                let fetcher = store.fetcher(&entry.key)?;
                self.inner.executor.ensure_fresh(&entry.key, fetcher)
            })
            .collect();
        info!(trigger, refetching = requests.len(), "Query refetch triggered");
        requests
    }

    /// Runs one garbage-collection sweep now.
    pub fn collect_garbage(&self) -> SweepReport {
        self.inner.collector.sweep(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Stops background work and cancels running and future fetches.
    pub fn shutdown(&self) {
        if let Some(task) = mutex_lock(&self.inner.gc_task, SOURCE, "shutdown").take() {
            task.abort();
        }
        self.inner.executor.shutdown();
        info!(entries = self.inner.store.len(), "Query client shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.executor.is_closed()
    }
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("config", &self.inner.config)
            .field("entries", &self.inner.store.len())
            .finish_non_exhaustive()
    }
}
