//! Staleness accounting and garbage collection of unobserved entries.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info};

use super::keys::QueryKey;
use super::store::{EntrySnapshot, EntryStore};

const METRIC_GC_EVICT: &str = "callboard_query_gc_evict_total";
const METRIC_STALE: &str = "callboard_query_stale_entries";

/// Result of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries past their freshness window after the sweep.
    pub stale: usize,
    pub evicted: Vec<QueryKey>,
}

pub struct Collector {
    store: Arc<EntryStore>,
    gc_time: Duration,
}

impl Collector {
    pub fn new(store: Arc<EntryStore>, gc_time: Duration) -> Self {
        Self { store, gc_time }
    }

    /// Evicts unobserved entries idle for longer than the GC window.
    ///
    /// Idle time counts from the last successful fetch, or from creation
    /// for entries that were never fetched.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let gc_time = self.gc_time;
        let evicted = self
            .store
            .evict_where(|entry| idle_for(entry, now) > gc_time);
        let stale = self
            .store
            .find(&QueryKey::new([]))
            .iter()
            .filter(|entry| entry.is_stale(now))
            .count();

        counter!(METRIC_GC_EVICT).increment(evicted.len() as u64);
        gauge!(METRIC_STALE).set(stale as f64);
        for key in &evicted {
            debug!(key = %key, "Query entry collected");
        }
        if !evicted.is_empty() {
            info!(
                evicted = evicted.len(),
                stale,
                remaining = self.store.len(),
                "Query cache sweep finished"
            );
        }
        SweepReport { stale, evicted }
    }

    /// Sweeps every `period` until the returned task is aborted.
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep(Instant::now());
            }
        })
    }
}

fn idle_for(entry: &EntrySnapshot, now: Instant) -> Duration {
    now.saturating_duration_since(entry.fetched_at.unwrap_or(entry.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::bus::{Notification, NotificationBus};
    use crate::query::store::{EntryPatch, Payload, QueryStatus};
    use crate::query_key;

    const GC: Duration = Duration::from_secs(600);

    fn setup() -> (Arc<EntryStore>, Collector) {
        let store = Arc::new(EntryStore::new(Arc::new(NotificationBus::new()), None));
        let collector = Collector::new(Arc::clone(&store), GC);
        (store, collector)
    }

    fn fill(store: &EntryStore, key: &QueryKey) {
        let payload: Payload = Arc::new("cached");
        store.upsert(
            key,
            EntryPatch::success(payload, Instant::now(), Duration::from_secs(60)),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_only_after_gc_window() {
        let (store, collector) = setup();
        let key = query_key!["calls", "catalog", 1];
        fill(&store, &key);

        tokio::time::advance(GC).await;
        let report = collector.sweep(Instant::now());
        assert!(report.evicted.is_empty());
        assert_eq!(report.stale, 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        let report = collector.sweep(Instant::now());
        assert_eq!(report.evicted, vec![key.clone()]);
        assert!(store.get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribed_entries_survive() {
        let (store, collector) = setup();
        let key = query_key!["dashboard", "main"];
        fill(&store, &key);
        let subscription = store.subscribe(&key, Arc::new(|_: &Notification| {}));

        tokio::time::advance(GC * 3).await;
        assert!(collector.sweep(Instant::now()).evicted.is_empty());

        drop(subscription);
        assert_eq!(collector.sweep(Instant::now()).evicted, vec![key]);
    }

    #[tokio::test(start_paused = true)]
    async fn never_fetched_entries_age_from_creation() {
        let (store, collector) = setup();
        let key = query_key!["admins", 1, 10, ""];
        store.upsert(&key, EntryPatch::failure(crate::query::QueryError::transient("x")));
        assert_eq!(store.get(&key).map(|e| e.status), Some(QueryStatus::Error));

        tokio::time::advance(GC + Duration::from_secs(1)).await;
        assert_eq!(collector.sweep(Instant::now()).evicted, vec![key]);
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_sweeps_periodically() {
        let (store, collector) = setup();
        let key = query_key!["settings", 1, 10];
        fill(&store, &key);

        let task = Arc::new(collector).spawn(Duration::from_secs(60));
        tokio::time::sleep(GC + Duration::from_secs(61)).await;
        assert!(store.get(&key).is_none());
        task.abort();
    }
}
