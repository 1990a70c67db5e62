//! Fetch executor.
//!
//! Runs registered fetchers for stale keys, at most one request per key.
//! Concurrent callers for the same key join the request already in flight
//! and observe the same result. Requests are driven by a spawned task so
//! they complete even when every caller has gone away.
//!
//! Invalidating a key whose request is running supersedes that request:
//! its response predates the invalidation, so it is discarded and the
//! fetcher runs once more before the request settles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{AbortHandle, Abortable, BoxFuture, FutureExt, Shared};
use metrics::{counter, histogram};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use super::error::QueryError;
use super::keys::QueryKey;
use super::store::{EntryPatch, EntryStore, Fetcher, Payload};

const METRIC_FETCH_TOTAL: &str = "callboard_query_fetch_total";
const METRIC_DEDUP_TOTAL: &str = "callboard_query_dedup_total";
const METRIC_RETRY_TOTAL: &str = "callboard_query_retry_total";
const METRIC_FETCH_MS: &str = "callboard_query_fetch_ms";

type SharedResult = Shared<BoxFuture<'static, Result<Payload, QueryError>>>;

/// Handle on a request in flight. Cloning it adds another awaiter.
#[derive(Clone)]
pub struct InFlight {
    id: u64,
    key: QueryKey,
    result: SharedResult,
    abort: Option<AbortHandle>,
    superseded: Arc<AtomicBool>,
}

impl InFlight {
    fn settled(key: QueryKey, result: Result<Payload, QueryError>) -> Self {
        Self {
            id: 0,
            key,
            result: futures::future::ready(result).boxed().shared(),
            abort: None,
            superseded: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Waits for the request to settle.
    pub async fn wait(self) -> Result<Payload, QueryError> {
        self.result.await
    }
}

impl std::fmt::Debug for InFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

pub struct FetchExecutor {
    store: Arc<EntryStore>,
    in_flight: Arc<DashMap<QueryKey, InFlight>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl FetchExecutor {
    pub fn new(store: Arc<EntryStore>) -> Self {
        Self {
            store,
            in_flight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Fetches `key` unless its entry is still fresh.
    ///
    /// Returns `None` when nothing had to be done, otherwise the request
    /// the caller started or joined.
    pub fn ensure_fresh(&self, key: &QueryKey, fetcher: Fetcher) -> Option<InFlight> {
        self.store.register_fetcher(key, fetcher.clone());
        if let Some(entry) = self.store.get(key)
            && !entry.is_stale(Instant::now())
        {
            return None;
        }
        Some(self.start_or_join(key, fetcher, false))
    }

    /// Fetches `key` regardless of freshness, still joining a running request.
    pub fn refetch(&self, key: &QueryKey, fetcher: Fetcher) -> InFlight {
        self.store.register_fetcher(key, fetcher.clone());
        self.start_or_join(key, fetcher, false)
    }

    /// Marks every entry under `prefixes` stale and refetches the observed ones.
    ///
    /// A request already running for an observed key is superseded rather
    /// than joined. Notifications for the whole call are delivered as one
    /// batch.
    pub fn invalidate(&self, prefixes: &[QueryKey]) -> Vec<InFlight> {
        let now = Instant::now();
        self.store.bus().batch(|| {
            let mut requests: Vec<InFlight> = Vec::new();
            for prefix in prefixes {
                for (key, fetcher) in self.store.invalidate(prefix, now).refetch {
                    let request = self.start_or_join(&key, fetcher, true);
                    if requests.iter().all(|known| known.id != request.id) {
                        requests.push(request);
                    }
                }
            }
            requests
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self, key: &QueryKey) -> Option<InFlight> {
        self.in_flight.get(key).map(|entry| entry.value().clone())
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Cancels running requests and refuses new ones.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let keys: Vec<QueryKey> = self.in_flight.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, request)) = self.in_flight.remove(&key) {
                if let Some(abort) = &request.abort {
                    abort.abort();
                }
                self.store
                    .upsert(&key, EntryPatch::failure(QueryError::Cancelled));
                debug!(key = %key, request = request.id, "Query fetch cancelled");
            }
        }
    }

    fn start_or_join(&self, key: &QueryKey, fetcher: Fetcher, supersede: bool) -> InFlight {
        if self.is_closed() {
            return InFlight::settled(key.clone(), Err(QueryError::Cancelled));
        }

        let request = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(existing) => {
                let request = existing.get();
                if supersede {
                    // Read by the request under the same shard lock before it retires.
                    request.superseded.store(true, Ordering::SeqCst);
                    debug!(key = %key, request = request.id, "Query fetch superseded");
                } else {
                    counter!(METRIC_DEDUP_TOTAL).increment(1);
                    debug!(key = %key, request = request.id, "Query fetch joined");
                }
                return request.clone();
            }
            Entry::Vacant(slot) => {
                let request = self.prepare(key.clone(), fetcher);
                slot.insert(request.clone());
                request
            }
        };

        // The map guard is released here; publishing may re-enter the executor.
        self.store.upsert(key, EntryPatch::pending());
        debug!(key = %key, request = request.id, "Query fetch started");
        tokio::spawn(request.result.clone());
        request
    }

    fn prepare(&self, key: QueryKey, fetcher: Fetcher) -> InFlight {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let store = Arc::clone(&self.store);
        let in_flight = Arc::clone(&self.in_flight);
        let superseded = Arc::new(AtomicBool::new(false));
        let task_superseded = Arc::clone(&superseded);
        let task_key = key.clone();

        let run = async move {
            let mut fetcher = fetcher;
            loop {
                let started = Instant::now();
                let result = execute(&task_key, &fetcher).await;
                if task_superseded.swap(false, Ordering::SeqCst) {
                    debug!(key = %task_key, request = id, "Query fetch discarded, refetching");
                    fetcher = store.fetcher(&task_key).unwrap_or(fetcher);
                    continue;
                }
                settle(&store, &task_key, id, &fetcher, &result, started);

                let retired = in_flight
                    .remove_if(&task_key, |_, request| {
                        request.id == id && !request.superseded.load(Ordering::SeqCst)
                    })
                    .is_some();
                if retired || !task_superseded.swap(false, Ordering::SeqCst) {
                    return result;
                }
                // Invalidated between the store write and retirement.
                store.upsert(&task_key, EntryPatch::pending());
                fetcher = store.fetcher(&task_key).unwrap_or(fetcher);
            }
        };

        let (abort, registration) = AbortHandle::new_pair();
        let result = Abortable::new(run, registration)
            .map(|outcome| outcome.unwrap_or(Err(QueryError::Cancelled)))
            .boxed()
            .shared();

        InFlight {
            id,
            key,
            result,
            abort: Some(abort),
            superseded,
        }
    }
}

/// Writes the outcome of a request into the store.
fn settle(
    store: &EntryStore,
    key: &QueryKey,
    id: u64,
    fetcher: &Fetcher,
    result: &Result<Payload, QueryError>,
    started: Instant,
) {
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(value) => {
            store.upsert(
                key,
                EntryPatch::success(
                    Arc::clone(value),
                    Instant::now(),
                    fetcher.options.stale_time,
                ),
            );
            counter!(METRIC_FETCH_TOTAL, "outcome" => "success").increment(1);
            info!(key = %key, request = id, elapsed_ms, "Query fetch succeeded");
        }
        Err(error) => {
            store.upsert(key, EntryPatch::failure(error.clone()));
            counter!(METRIC_FETCH_TOTAL, "outcome" => "error", "kind" => error.kind())
                .increment(1);
            warn!(
                key = %key,
                request = id,
                elapsed_ms,
                error = %error,
                "Query fetch failed"
            );
        }
    }
}

/// Runs attempts until one succeeds or the retry policy gives up.
async fn execute(key: &QueryKey, fetcher: &Fetcher) -> Result<Payload, QueryError> {
    let options = &fetcher.options;
    let mut failures = 0_u32;
    loop {
        let started = Instant::now();
        let outcome = match timeout(options.timeout, (fetcher.fetch)()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(QueryError::Timeout(options.timeout)),
        };
        histogram!(METRIC_FETCH_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        failures += 1;
        if !options.retry.should_retry(failures, &error) {
            return Err(error);
        }

        let delay = options.backoff.delay(failures - 1);
        counter!(METRIC_RETRY_TOTAL, "kind" => error.kind()).increment(1);
        debug!(
            key = %key,
            attempt = failures,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Query fetch attempt failed, retrying"
        );
        sleep(delay).await;
    }
}
