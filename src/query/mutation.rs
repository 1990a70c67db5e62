//! Mutation executor.
//!
//! A [`Mutation`] runs a write operation, retries it per policy and, once it
//! succeeds, invalidates the declared key prefixes before the success hook
//! runs. Mutations are never deduplicated.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use metrics::{counter, histogram};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::QueryConfig;
use super::error::QueryError;
use super::fetch::FetchExecutor;
use super::keys::QueryKey;
use super::lock::mutex_lock;
use super::retry::{Backoff, RetryPolicy};

const SOURCE: &str = "query::mutation";

const METRIC_MUTATION_TOTAL: &str = "callboard_query_mutation_total";
const METRIC_MUTATION_MS: &str = "callboard_query_mutation_ms";

type MutateFn<I, R> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<R, QueryError>> + Send + Sync>;
type SuccessHook<R> = Arc<dyn Fn(&R) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&QueryError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

/// One invocation of a mutation.
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub id: Uuid,
    pub status: MutationStatus,
    /// Retries performed so far, excluding the first attempt.
    pub retry_count: u32,
    pub invalidates: Vec<QueryKey>,
    pub started_at: OffsetDateTime,
}

/// How a mutation runs and what it invalidates.
pub struct MutationOptions<I, R> {
    mutate: MutateFn<I, R>,
    invalidates: Vec<QueryKey>,
    retry: Option<RetryPolicy>,
    backoff: Option<Backoff>,
    timeout: Option<Duration>,
    on_success: Option<SuccessHook<R>>,
    on_error: Option<ErrorHook>,
}

impl<I, R> MutationOptions<I, R>
where
    I: Send + 'static,
    R: Send + 'static,
{
    pub fn new<F, Fut>(mutate: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, QueryError>> + Send + 'static,
    {
        Self {
            mutate: Arc::new(move |input| mutate(input).boxed()),
            invalidates: Vec::new(),
            retry: None,
            backoff: None,
            timeout: None,
            on_success: None,
            on_error: None,
        }
    }

    /// Adds a key prefix to invalidate after success.
    pub fn invalidates(mut self, prefix: QueryKey) -> Self {
        self.invalidates.push(prefix);
        self
    }

    /// Replaces every prefix declared so far.
    pub fn set_invalidates(mut self, prefixes: Vec<QueryKey>) -> Self {
        self.invalidates = prefixes;
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

    pub fn on_success(mut self, hook: impl Fn(&R) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&QueryError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }
}

impl<I, R> fmt::Debug for MutationOptions<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOptions")
            .field("invalidates", &self.invalidates)
            .field("retry", &self.retry)
            .field("backoff", &self.backoff)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

struct MutationState {
    status: MutationStatus,
    error: Option<QueryError>,
    running: usize,
    last: Option<MutationRecord>,
}

struct MutationInner<I, R> {
    mutate: MutateFn<I, R>,
    invalidates: Vec<QueryKey>,
    retry: RetryPolicy,
    backoff: Backoff,
    timeout: Duration,
    on_success: Option<SuccessHook<R>>,
    on_error: Option<ErrorHook>,
    executor: Arc<FetchExecutor>,
    state: Mutex<MutationState>,
}

/// Handle on a write operation, cloneable and shareable across tasks.
pub struct Mutation<I, R> {
    inner: Arc<MutationInner<I, R>>,
}

impl<I, R> Clone for Mutation<I, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, R> Mutation<I, R>
where
    I: Clone + Send + 'static,
    R: Send + 'static,
{
    pub(crate) fn new(
        options: MutationOptions<I, R>,
        executor: Arc<FetchExecutor>,
        defaults: &QueryConfig,
    ) -> Self {
        Self {
            inner: Arc::new(MutationInner {
                mutate: options.mutate,
                invalidates: options.invalidates,
                retry: options
                    .retry
                    .unwrap_or_else(|| defaults.mutation_retry_policy()),
                backoff: options.backoff.unwrap_or_else(|| defaults.backoff()),
                timeout: options.timeout.unwrap_or_else(|| defaults.request_timeout()),
                on_success: options.on_success,
                on_error: options.on_error,
                executor,
                state: Mutex::new(MutationState {
                    status: MutationStatus::Idle,
                    error: None,
                    running: 0,
                    last: None,
                }),
            }),
        }
    }

    /// Runs the mutation in the background.
    pub fn mutate(&self, input: I) -> JoinHandle<Result<R, QueryError>> {
        let this = self.clone();
        tokio::spawn(async move { this.mutate_async(input).await })
    }

    /// Runs the mutation and waits for its result.
    pub async fn mutate_async(&self, input: I) -> Result<R, QueryError> {
        let inner = &self.inner;
        let mut record = MutationRecord {
            id: Uuid::new_v4(),
            status: MutationStatus::Pending,
            retry_count: 0,
            invalidates: inner.invalidates.clone(),
            started_at: OffsetDateTime::now_utc(),
        };
        if inner.executor.is_closed() {
            return Err(QueryError::Cancelled);
        }
        self.begin(&record);
        debug!(mutation = %record.id, "Mutation started");

        let started = Instant::now();
        let result = self.run(input, &mut record).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_MUTATION_MS).record(elapsed_ms);

        match &result {
            Ok(value) => {
                let refetching = inner.executor.invalidate(&inner.invalidates);
                record.status = MutationStatus::Success;
                self.finish(&record, None);
                counter!(METRIC_MUTATION_TOTAL, "outcome" => "success").increment(1);
                info!(
                    mutation = %record.id,
                    retries = record.retry_count,
                    invalidated = inner.invalidates.len(),
                    refetching = refetching.len(),
                    elapsed_ms,
                    "Mutation succeeded"
                );
                if let Some(hook) = &inner.on_success {
                    hook(value);
                }
            }
            Err(error) => {
                record.status = MutationStatus::Error;
                self.finish(&record, Some(error.clone()));
                counter!(METRIC_MUTATION_TOTAL, "outcome" => "error", "kind" => error.kind())
                    .increment(1);
                warn!(
                    mutation = %record.id,
                    retries = record.retry_count,
                    error = %error,
                    "Mutation failed"
                );
                if let Some(hook) = &inner.on_error {
                    hook(error);
                }
            }
        }
        result
    }

    async fn run(&self, input: I, record: &mut MutationRecord) -> Result<R, QueryError> {
        let inner = &self.inner;
        let mut failures = 0_u32;
        loop {
            let outcome = match timeout(inner.timeout, (inner.mutate)(input.clone())).await {
                Ok(outcome) => outcome,
                Err(_) => Err(QueryError::Timeout(inner.timeout)),
            };
            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            failures += 1;
            if !inner.retry.should_retry(failures, &error) {
                return Err(error);
            }
            let delay = inner.backoff.delay(failures - 1);
            record.retry_count = failures;
            debug!(
                mutation = %record.id,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Mutation attempt failed, retrying"
            );
            sleep(delay).await;
        }
    }
}

impl<I, R> Mutation<I, R> {
    fn begin(&self, record: &MutationRecord) {
        let mut state = mutex_lock(&self.inner.state, SOURCE, "begin");
        state.running += 1;
        state.status = MutationStatus::Pending;
        state.error = None;
        state.last = Some(record.clone());
    }

    fn finish(&self, record: &MutationRecord, error: Option<QueryError>) {
        let mut state = mutex_lock(&self.inner.state, SOURCE, "finish");
        state.running = state.running.saturating_sub(1);
        state.status = if state.running > 0 {
            MutationStatus::Pending
        } else {
            record.status
        };
        state.error = error;
        state.last = Some(record.clone());
    }

    /// Whether any invocation is still running.
    pub fn is_pending(&self) -> bool {
        mutex_lock(&self.inner.state, SOURCE, "is_pending").running > 0
    }

    pub fn status(&self) -> MutationStatus {
        mutex_lock(&self.inner.state, SOURCE, "status").status
    }

    /// Error of the most recently settled invocation.
    pub fn error(&self) -> Option<QueryError> {
        mutex_lock(&self.inner.state, SOURCE, "error").error.clone()
    }

    pub fn last_record(&self) -> Option<MutationRecord> {
        mutex_lock(&self.inner.state, SOURCE, "last_record").last.clone()
    }

    pub fn invalidates(&self) -> &[QueryKey] {
        &self.inner.invalidates
    }

    /// Returns to `Idle`, forgetting the last error.
    pub fn reset(&self) {
        let mut state = mutex_lock(&self.inner.state, SOURCE, "reset");
        if state.running == 0 {
            state.status = MutationStatus::Idle;
        }
        state.error = None;
    }
}

impl<I, R> fmt::Debug for Mutation<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("invalidates", &self.inner.invalidates)
            .field("retry", &self.inner.retry)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::query::bus::NotificationBus;
    use crate::query::store::{EntryPatch, EntryStore, Payload};
    use crate::query_key;

    fn executor() -> (Arc<EntryStore>, Arc<FetchExecutor>) {
        let store = Arc::new(EntryStore::new(Arc::new(NotificationBus::new()), None));
        let executor = Arc::new(FetchExecutor::new(Arc::clone(&store)));
        (store, executor)
    }

    #[tokio::test(start_paused = true)]
    async fn success_invalidates_before_hook() {
        let (store, executor) = executor();
        let key = query_key!["managers", 1, 10, ""];
        let payload: Payload = Arc::new(1_u32);
        store.upsert(
            &key,
            EntryPatch::success(payload, Instant::now(), Duration::from_secs(300)),
        );

        let hook_store = Arc::clone(&store);
        let hook_key = key.clone();
        let stale_in_hook = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&stale_in_hook);
        let mutation = Mutation::new(
            MutationOptions::new(|name: String| async move { Ok(name.len()) })
                .invalidates(query_key!["managers"])
                .on_success(move |_| {
                    let stale = hook_store
                        .get(&hook_key)
                        .map(|e| e.is_stale(Instant::now()));
                    *seen.lock().expect("hook lock") = stale;
                }),
            executor,
            &QueryConfig::default(),
        );

        assert_eq!(mutation.mutate_async("Anna".into()).await, Ok(4));
        assert_eq!(*stale_in_hook.lock().expect("hook lock"), Some(true));
        assert_eq!(mutation.status(), MutationStatus::Success);
        assert!(!mutation.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_retries_once_then_reports() {
        let (_store, executor) = executor();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&calls);
        let errors = Arc::new(AtomicU32::new(0));
        let on_error = Arc::clone(&errors);
        let mutation = Mutation::new(
            MutationOptions::new(move |_: ()| {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(QueryError::from_status(500, "boom")) }
            })
            .on_error(move |_| {
                on_error.fetch_add(1, Ordering::SeqCst);
            }),
            executor,
            &QueryConfig::default(),
        );

        let started = Instant::now();
        let err = mutation.mutate_async(()).await.expect_err("fails");

        assert_eq!(err.status(), Some(500));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(mutation.error(), Some(err));
        assert_eq!(mutation.last_record().map(|r| r.retry_count), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_is_not_retried() {
        let (_store, executor) = executor();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&calls);
        let mutation = Mutation::new(
            MutationOptions::new(move |_: u64| {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(QueryError::from_status(422, "invalid")) }
            }),
            executor,
            &QueryConfig::default(),
        );

        assert!(mutation.mutate_async(7).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(mutation.status(), MutationStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_invocations_both_execute() {
        let (_store, executor) = executor();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&calls);
        let mutation = Mutation::new(
            MutationOptions::new(move |_: ()| {
                counted.fetch_add(1, Ordering::SeqCst);
                async {
                    sleep(Duration::from_millis(10)).await;
                    Ok(())
                }
            }),
            executor,
            &QueryConfig::default(),
        );

        let first = mutation.mutate(());
        let second = mutation.mutate(());
        tokio::task::yield_now().await;
        assert!(mutation.is_pending());

        first.await.expect("join").expect("first");
        second.await.expect("join").expect("second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!mutation.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn narrowed_invalidation_leaves_siblings_fresh() {
        let (store, executor) = executor();
        let first = query_key!["admins", 1, 10, ""];
        let second = query_key!["admins", 2, 10, ""];
        for key in [&first, &second] {
            let payload: Payload = Arc::new(0_u32);
            store.upsert(
                key,
                EntryPatch::success(payload, Instant::now(), Duration::from_secs(300)),
            );
        }

        let mutation = Mutation::new(
            MutationOptions::new(|_: ()| async { Ok(()) })
                .invalidates(query_key!["admins"])
                .set_invalidates(vec![first.clone()]),
            executor,
            &QueryConfig::default(),
        );
        mutation.mutate_async(()).await.expect("mutation");

        let now = Instant::now();
        assert_eq!(mutation.invalidates(), &[first.clone()]);
        assert!(store.get(&first).expect("first").is_stale(now));
        assert!(!store.get(&second).expect("second").is_stale(now));
    }
}
