//! Subscriber notification bus.
//!
//! Maps each key to the callbacks observing it. Publishing invokes the
//! callbacks of that exact key synchronously, outside of any lock. Inside
//! [`NotificationBus::batch`] publishes are collected and delivered once per
//! key when the outermost batch ends.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use time::OffsetDateTime;
use tracing::trace;
use uuid::Uuid;

use super::keys::QueryKey;
use super::lock::{mutex_lock, rw_read, rw_write};

const SOURCE: &str = "query::bus";

/// Monotonic sequence number of delivered notifications.
pub type Epoch = u64;

/// Handle identifying one registered callback.
pub type SubscriberId = u64;

pub type Callback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// A state change of one key, as seen by its subscribers.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub epoch: Epoch,
    pub key: QueryKey,
    pub timestamp: OffsetDateTime,
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    pending: Vec<QueryKey>,
    seen: HashSet<QueryKey>,
}

pub struct NotificationBus {
    subscribers: RwLock<HashMap<QueryKey, Vec<(SubscriberId, Callback)>>>,
    next_subscriber: AtomicU64,
    epoch_counter: AtomicU64,
    batch: Mutex<BatchState>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_subscriber: AtomicU64::new(1),
            epoch_counter: AtomicU64::new(0),
            batch: Mutex::new(BatchState::default()),
        }
    }

    pub fn subscribe(&self, key: QueryKey, callback: Callback) -> SubscriberId {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        rw_write(&self.subscribers, SOURCE, "subscribe")
            .entry(key)
            .or_default()
            .push((id, callback));
        id
    }

    /// Removes a callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, key: &QueryKey, id: SubscriberId) -> bool {
        let mut subscribers = rw_write(&self.subscribers, SOURCE, "unsubscribe");
        let Some(callbacks) = subscribers.get_mut(key) else {
            return false;
        };
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        let removed = callbacks.len() != before;
        if callbacks.is_empty() {
            subscribers.remove(key);
        }
        removed
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        rw_read(&self.subscribers, SOURCE, "subscriber_count")
            .get(key)
            .map_or(0, Vec::len)
    }

    /// Notifies the subscribers of `key`, or defers it while a batch is open.
    pub fn publish(&self, key: &QueryKey) {
        {
            let mut batch = mutex_lock(&self.batch, SOURCE, "publish");
            if batch.depth > 0 {
                if batch.seen.insert(key.clone()) {
                    batch.pending.push(key.clone());
                }
                return;
            }
        }
        self.deliver(key);
    }

    /// Runs `f`, collapsing its publishes into one notification per key.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        mutex_lock(&self.batch, SOURCE, "batch.open").depth += 1;
        let guard = BatchGuard { bus: self };
        let result = f();
        drop(guard);
        result
    }

    fn close_batch(&self) {
        let pending = {
            let mut batch = mutex_lock(&self.batch, SOURCE, "batch.close");
            batch.depth = batch.depth.saturating_sub(1);
            if batch.depth > 0 {
                return;
            }
            batch.seen.clear();
            std::mem::take(&mut batch.pending)
        };
        for key in &pending {
            self.deliver(key);
        }
    }

    fn deliver(&self, key: &QueryKey) {
        let callbacks: Vec<Callback> = rw_read(&self.subscribers, SOURCE, "deliver")
            .get(key)
            .map(|entries| entries.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();
        if callbacks.is_empty() {
            return;
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            epoch: self.epoch_counter.fetch_add(1, Ordering::SeqCst),
            key: key.clone(),
            timestamp: OffsetDateTime::now_utc(),
        };
        trace!(
            key = %key,
            epoch = notification.epoch,
            subscribers = callbacks.len(),
            "Query notification delivered"
        );
        for callback in callbacks {
            callback(&notification);
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Closes the batch even if the batched closure panics.
struct BatchGuard<'a> {
    bus: &'a NotificationBus,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.bus.close_batch();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::query_key;

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let callback: Callback = Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    #[test]
    fn publish_reaches_only_exact_key() {
        let bus = NotificationBus::new();
        let (managers, cb_managers) = counter();
        let (page, cb_page) = counter();
        bus.subscribe(query_key!["managers"], cb_managers);
        bus.subscribe(query_key!["managers", 1], cb_page);

        bus.publish(&query_key!["managers", 1]);

        assert_eq!(managers.load(Ordering::SeqCst), 0);
        assert_eq!(page.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn batch_collapses_repeated_publishes() {
        let bus = NotificationBus::new();
        let (count, cb) = counter();
        let (other, cb_other) = counter();
        bus.subscribe(query_key!["calls"], cb);
        bus.subscribe(query_key!["admins"], cb_other);

        bus.batch(|| {
            bus.publish(&query_key!["calls"]);
            bus.batch(|| bus.publish(&query_key!["calls"]));
            bus.publish(&query_key!["admins"]);
            assert_eq!(count.load(Ordering::SeqCst), 0);
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = NotificationBus::new();
        let (count, cb) = counter();
        let key = query_key!["settings", 1, 10];
        let id = bus.subscribe(key.clone(), cb);
        assert_eq!(bus.subscriber_count(&key), 1);

        assert!(bus.unsubscribe(&key, id));
        assert!(!bus.unsubscribe(&key, id));
        bus.publish(&key);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(&key), 0);
    }

    #[test]
    fn epochs_increase_per_delivery() {
        let bus = NotificationBus::new();
        let epochs = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&epochs);
        bus.subscribe(
            query_key!["dashboard", "main"],
            Arc::new(move |n: &Notification| sink.lock().expect("sink lock").push(n.epoch)),
        );

        bus.publish(&query_key!["dashboard", "main"]);
        bus.publish(&query_key!["dashboard", "main"]);

        let epochs = epochs.lock().expect("epochs lock");
        assert_eq!(epochs.len(), 2);
        assert!(epochs[0] < epochs[1]);
    }
}
