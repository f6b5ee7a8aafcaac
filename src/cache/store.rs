//! In-memory query cache.
//!
//! Entries are keyed by [`QueryKey`]. At most one fetch is outstanding per key
//! unless an invalidation supersedes it; every fetch carries a sequence number
//! and only the result of the latest one is committed. Sequence numbers and
//! slot ids are drawn cache-wide, so a removed entry that is re-created never
//! accepts results or releases meant for its predecessor.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::future::BoxFuture;
use metrics::counter;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::entry::{CacheEntry, QueryError, QueryState, QueryStatus};
use super::keys::QueryKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

const METRIC_FETCH_TOTAL: &str = "patisserie_query_fetch_total";
const METRIC_FETCH_DISCARDED_TOTAL: &str = "patisserie_query_fetch_discarded_total";
const METRIC_DEDUP_TOTAL: &str = "patisserie_query_dedup_total";
const METRIC_EVICT_TOTAL: &str = "patisserie_query_evict_total";

/// Produces the payload for one key. Called once per fetch.
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, QueryError>> + Send + Sync>;

/// Called synchronously after every state transition of the subscribed entry.
pub type Listener = Arc<dyn Fn(&CacheEntry) + Send + Sync>;

struct Slot {
    id: u64,
    entry: CacheEntry,
    fetcher: Option<Fetcher>,
    latest_seq: u64,
    fetched_at: Option<Instant>,
    released_at: Option<Instant>,
    listeners: HashMap<u64, Listener>,
    changes: watch::Sender<u64>,
}

impl Slot {
    fn new(id: u64, key: QueryKey) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            id,
            entry: CacheEntry::idle(key),
            fetcher: None,
            latest_seq: 0,
            fetched_at: None,
            released_at: None,
            listeners: HashMap::new(),
            changes,
        }
    }

    fn needs_fetch(&self, stale_after: std::time::Duration) -> bool {
        if self.entry.is_fetching {
            return false;
        }
        match self.entry.status {
            QueryStatus::Idle | QueryStatus::Error => true,
            QueryStatus::Loading => false,
            QueryStatus::Success => {
                self.entry.is_stale
                    || self
                        .fetched_at
                        .is_none_or(|fetched_at| fetched_at.elapsed() >= stale_after)
            }
        }
    }

    /// Start a new fetch generation. Any outstanding fetch becomes stale.
    fn begin_fetch(&mut self, seq: u64) -> Option<FetchJob> {
        let fetcher = self.fetcher.clone()?;
        self.latest_seq = seq;
        self.entry.is_fetching = true;
        if self.entry.data.is_none() {
            self.entry.status = QueryStatus::Loading;
        }
        self.publish();
        Some(FetchJob {
            key: self.entry.key.clone(),
            seq: self.latest_seq,
            fetcher,
        })
    }

    fn publish(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    fn notification(&self) -> Option<Notification> {
        if self.listeners.is_empty() {
            return None;
        }
        Some(Notification {
            entry: self.entry.clone(),
            listeners: self.listeners.values().cloned().collect(),
        })
    }
}

struct FetchJob {
    key: QueryKey,
    seq: u64,
    fetcher: Fetcher,
}

struct Notification {
    entry: CacheEntry,
    listeners: Vec<Listener>,
}

impl Notification {
    fn deliver(self) {
        for listener in self.listeners {
            listener(&self.entry);
        }
    }
}

struct Inner {
    config: CacheConfig,
    slots: Mutex<HashMap<QueryKey, Slot>>,
    next_listener_id: AtomicU64,
    next_slot_id: AtomicU64,
    next_seq: AtomicU64,
}

impl Inner {
    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// Shared handle to the query cache.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                slots: Mutex::new(HashMap::new()),
                next_listener_id: AtomicU64::new(1),
                next_slot_id: AtomicU64::new(1),
                next_seq: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Subscribe to `key`, fetching when there is no usable entry.
    ///
    /// Subscriptions made while a fetch for `key` is outstanding attach to it.
    /// Must be called within a Tokio runtime.
    pub fn subscribe(&self, key: QueryKey, fetcher: Fetcher) -> Subscription {
        self.attach(key, fetcher, None)
    }

    /// Like [`QueryCache::subscribe`], also registering a listener for state transitions.
    pub fn subscribe_with(&self, key: QueryKey, fetcher: Fetcher, listener: Listener) -> Subscription {
        self.attach(key, fetcher, Some(listener))
    }

    fn attach(&self, key: QueryKey, fetcher: Fetcher, listener: Option<Listener>) -> Subscription {
        let listener_id = listener
            .as_ref()
            .map(|_| self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));

        let (job, notification, changes, slot_id) = {
            let mut slots = mutex_lock(&self.inner.slots, SOURCE, "subscribe");
            let slot = slots.entry(key.clone()).or_insert_with(|| {
                Slot::new(
                    self.inner.next_slot_id.fetch_add(1, Ordering::Relaxed),
                    key.clone(),
                )
            });
            slot.fetcher = Some(fetcher);
            slot.entry.subscriber_count += 1;
            slot.released_at = None;
            if let (Some(id), Some(listener)) = (listener_id, listener) {
                slot.listeners.insert(id, listener);
            }

            let job = if slot.needs_fetch(self.inner.config.stale_after) {
                slot.begin_fetch(self.inner.next_seq())
            } else {
                if slot.entry.is_fetching {
                    counter!(METRIC_DEDUP_TOTAL).increment(1);
                    debug!(key = %key, "Subscription attached to in-flight fetch");
                }
                None
            };
            let notification = job.as_ref().and_then(|_| slot.notification());
            (job, notification, slot.changes.subscribe(), slot.id)
        };

        if let Some(notification) = notification {
            notification.deliver();
        }
        if let Some(job) = job {
            self.spawn_fetch(job);
        }

        Subscription {
            cache: self.clone(),
            key,
            slot_id,
            listener_id,
            changes,
            released: false,
        }
    }

    fn spawn_fetch(&self, job: FetchJob) {
        counter!(METRIC_FETCH_TOTAL).increment(1);
        debug!(key = %job.key, seq = job.seq, "Query fetch started");

        let cache = self.clone();
        tokio::spawn(async move {
            let result = (job.fetcher)().await;
            cache.settle(&job.key, job.seq, result);
        });
    }

    fn settle(&self, key: &QueryKey, seq: u64, result: Result<Value, QueryError>) {
        let notification = {
            let mut slots = mutex_lock(&self.inner.slots, SOURCE, "settle");
            let Some(slot) = slots.get_mut(key) else {
                counter!(METRIC_FETCH_DISCARDED_TOTAL).increment(1);
                debug!(key = %key, seq, "Discarded fetch result for removed entry");
                return;
            };

            if seq != slot.latest_seq {
                counter!(METRIC_FETCH_DISCARDED_TOTAL).increment(1);
                warn!(
                    key = %key,
                    seq,
                    latest_seq = slot.latest_seq,
                    "Discarded superseded fetch result"
                );
                return;
            }

            match result {
                Ok(data) => {
                    slot.entry.commit_success(data);
                    slot.fetched_at = Some(Instant::now());
                    debug!(key = %key, seq, "Query fetch succeeded");
                }
                Err(error) => {
                    debug!(key = %key, seq, error = %error, "Query fetch failed");
                    slot.entry.commit_error(error);
                }
            }
            slot.publish();
            slot.notification()
        };

        if let Some(notification) = notification {
            notification.deliver();
        }
    }

    /// Mark entries stale without clearing their data.
    ///
    /// Subscribed entries refetch immediately, superseding any outstanding
    /// fetch. Unsubscribed entries refetch on their next subscription.
    pub fn invalidate<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a QueryKey>,
    {
        let mut jobs = Vec::new();
        let mut notifications = Vec::new();
        {
            let mut slots = mutex_lock(&self.inner.slots, SOURCE, "invalidate");
            for key in keys {
                let Some(slot) = slots.get_mut(key) else {
                    continue;
                };
                slot.entry.is_stale = true;
                debug!(key = %key, subscribers = slot.entry.subscriber_count, "Query invalidated");

                if slot.entry.subscriber_count > 0 {
                    if let Some(job) = slot.begin_fetch(self.inner.next_seq()) {
                        jobs.push(job);
                    }
                } else {
                    slot.publish();
                }
                notifications.extend(slot.notification());
            }
        }

        for notification in notifications {
            notification.deliver();
        }
        for job in jobs {
            self.spawn_fetch(job);
        }
    }

    /// Invalidate every entry whose key starts with `prefix`.
    pub fn invalidate_matching(&self, prefix: &QueryKey) {
        let keys: Vec<QueryKey> = mutex_lock(&self.inner.slots, SOURCE, "invalidate_matching")
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        self.invalidate(keys.iter());
    }

    /// Drop entries entirely. Outstanding fetches for them are discarded on arrival.
    pub fn remove<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a QueryKey>,
    {
        let mut slots = mutex_lock(&self.inner.slots, SOURCE, "remove");
        for key in keys {
            if slots.remove(key).is_some() {
                counter!(METRIC_EVICT_TOTAL, "reason" => "removed").increment(1);
                debug!(key = %key, "Query entry removed");
            }
        }
    }

    pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry> {
        mutex_lock(&self.inner.slots, SOURCE, "entry")
            .get(key)
            .map(|slot| slot.entry.clone())
    }

    pub fn state(&self, key: &QueryKey) -> QueryState {
        self.entry(key)
            .map(|entry| entry.state())
            .unwrap_or_else(QueryState::idle)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.inner.slots, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe, wait for the outstanding fetch to settle, then release.
    pub async fn fetch(&self, key: QueryKey, fetcher: Fetcher) -> Result<Arc<Value>, QueryError> {
        let mut subscription = self.subscribe(key, fetcher);
        let entry = subscription.settled().await;
        match (entry.status, entry.data, entry.error) {
            (QueryStatus::Success, Some(data), _) => Ok(data),
            (_, _, Some(error)) => Err(error),
            (_, _, None) => Err(QueryError::NotFound),
        }
    }

    /// Evict unsubscribed entries released longer than the grace period ago.
    /// Entries with a fetch outstanding are kept.
    pub fn collect_garbage(&self) -> usize {
        let grace = self.inner.config.gc_grace;
        let now = Instant::now();
        let mut slots = mutex_lock(&self.inner.slots, SOURCE, "collect_garbage");
        let before = slots.len();
        slots.retain(|key, slot| {
            let expired = slot.entry.subscriber_count == 0
                && !slot.entry.is_fetching
                && slot
                    .released_at
                    .is_some_and(|released_at| now.duration_since(released_at) >= grace);
            if expired {
                debug!(key = %key, "Evicting unused query entry");
            }
            !expired
        });
        let evicted = before - slots.len();
        if evicted > 0 {
            counter!(METRIC_EVICT_TOTAL, "reason" => "gc").increment(evicted as u64);
        }
        evicted
    }

    /// Run [`QueryCache::collect_garbage`] every `gc_interval` until the cache is dropped.
    pub fn spawn_gc(&self) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.gc_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                QueryCache { inner }.collect_garbage();
            }
        })
    }

    fn release(&self, key: &QueryKey, slot_id: u64, listener_id: Option<u64>) {
        let mut slots = mutex_lock(&self.inner.slots, SOURCE, "release");
        // A slot re-created after `remove` does not own older subscriptions.
        if let Some(slot) = slots.get_mut(key).filter(|slot| slot.id == slot_id) {
            slot.entry.subscriber_count = slot.entry.subscriber_count.saturating_sub(1);
            if let Some(id) = listener_id {
                slot.listeners.remove(&id);
            }
            if slot.entry.subscriber_count == 0 {
                slot.released_at = Some(Instant::now());
            }
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("config", &self.inner.config)
            .field("entries", &self.len())
            .finish()
    }
}

/// Active interest in one key. Dropping it releases the subscription.
pub struct Subscription {
    cache: QueryCache,
    key: QueryKey,
    slot_id: u64,
    listener_id: Option<u64>,
    changes: watch::Receiver<u64>,
    released: bool,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn state(&self) -> QueryState {
        self.cache.state(&self.key)
    }

    /// Wait until no fetch is outstanding for the key and return the entry.
    pub async fn settled(&mut self) -> CacheEntry {
        loop {
            self.changes.borrow_and_update();
            match self.cache.entry(&self.key) {
                Some(entry) if !entry.is_fetching => return entry,
                Some(_) => {}
                None => return CacheEntry::idle(self.key.clone()),
            }
            if self.changes.changed().await.is_err() {
                return self
                    .cache
                    .entry(&self.key)
                    .unwrap_or_else(|| CacheEntry::idle(self.key.clone()));
            }
        }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.cache.release(&self.key, self.slot_id, self.listener_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use futures::FutureExt;
    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;
    use crate::application::gateway::GatewayError;

    fn counting_fetcher(calls: Arc<AtomicUsize>, value: Value) -> Fetcher {
        Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let value = value.clone();
            async move { Ok(value) }.boxed()
        })
    }

    /// Fetcher whose Nth call resolves when the Nth sender fires.
    fn gated_fetcher(gates: Arc<Mutex<Vec<oneshot::Receiver<Result<Value, QueryError>>>>>) -> Fetcher {
        Arc::new(move || {
            let gate = gates.lock().expect("gates").remove(0);
            async move { gate.await.unwrap_or(Err(GatewayError::Timeout)) }.boxed()
        })
    }

    fn key() -> QueryKey {
        QueryKey::new(["products"])
    }

    #[tokio::test]
    async fn concurrent_subscriptions_share_one_fetch() {
        let cache = QueryCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone(), json!(["torta"]));

        let mut first = cache.subscribe(key(), fetcher.clone());
        let _second = cache.subscribe(key(), fetcher.clone());
        let _third = cache.subscribe(key(), fetcher);

        let entry = first.settled().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(entry.status, QueryStatus::Success);
        assert_eq!(entry.subscriber_count, 3);
    }

    #[tokio::test]
    async fn superseded_fetch_result_is_discarded() {
        let cache = QueryCache::default();
        let (send_a, recv_a) = oneshot::channel();
        let (send_b, recv_b) = oneshot::channel();
        let gates = Arc::new(Mutex::new(vec![recv_a, recv_b]));

        let mut subscription = cache.subscribe(key(), gated_fetcher(gates));
        tokio::task::yield_now().await;
        cache.invalidate([&key()]);
        tokio::task::yield_now().await;

        send_b.send(Ok(json!("fresh"))).expect("send b");
        tokio::task::yield_now().await;
        send_a.send(Ok(json!("old"))).expect("send a");
        tokio::task::yield_now().await;

        let entry = subscription.settled().await;
        assert_eq!(entry.data.as_deref(), Some(&json!("fresh")));
    }

    #[tokio::test]
    async fn failed_refetch_keeps_last_good_data() {
        let cache = QueryCache::default();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let fetcher: Fetcher = Arc::new(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Ok(json!(["kuchen"]))
                } else {
                    Err(GatewayError::Network("offline".into()))
                }
            }
            .boxed()
        });

        let mut subscription = cache.subscribe(key(), fetcher);
        subscription.settled().await;
        cache.invalidate([&key()]);
        let entry = subscription.settled().await;

        assert_eq!(entry.status, QueryStatus::Error);
        assert_eq!(entry.data.as_deref(), Some(&json!(["kuchen"])));
        assert_eq!(entry.error, Some(GatewayError::Network("offline".into())));
    }

    #[tokio::test]
    async fn invalidating_unsubscribed_entry_defers_refetch() {
        let cache = QueryCache::new(CacheConfig {
            stale_after: Duration::from_secs(3600),
            ..CacheConfig::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone(), json!([]));

        let data = cache.fetch(key(), fetcher.clone()).await.expect("fetch");
        assert_eq!(*data, json!([]));

        cache.invalidate([&key()]);
        tokio::task::yield_now().await;
        let entry = cache.entry(&key()).expect("entry kept");
        assert!(entry.is_stale);
        assert_eq!(entry.data.as_deref(), Some(&json!([])));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let mut again = cache.subscribe(key(), fetcher);
        again.settled().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fresh_entry_is_served_within_stale_window() {
        let cache = QueryCache::new(CacheConfig {
            stale_after: Duration::from_secs(3600),
            ..CacheConfig::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone(), json!([1]));

        cache.fetch(key(), fetcher.clone()).await.expect("first");
        cache.fetch(key(), fetcher).await.expect("second");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listeners_observe_transitions() {
        let cache = QueryCache::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Listener = Arc::new(move |entry: &CacheEntry| {
            sink.lock().expect("sink").push(entry.status);
        });

        let mut subscription = cache.subscribe_with(
            key(),
            counting_fetcher(Arc::new(AtomicUsize::new(0)), json!([])),
            listener,
        );
        subscription.settled().await;

        assert_eq!(
            *seen.lock().expect("seen"),
            vec![QueryStatus::Loading, QueryStatus::Success]
        );
    }

    #[tokio::test]
    async fn remove_drops_entry_and_late_result() {
        let cache = QueryCache::default();
        let (send, recv) = oneshot::channel();
        let gates = Arc::new(Mutex::new(vec![recv]));

        let subscription = cache.subscribe(key(), gated_fetcher(gates));
        cache.remove([&key()]);
        send.send(Ok(json!("late"))).expect("send");
        tokio::task::yield_now().await;

        assert!(cache.entry(&key()).is_none());
        drop(subscription);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn late_result_from_removed_entry_is_not_committed() {
        let cache = QueryCache::default();
        let (send_old, recv_old) = oneshot::channel();
        let (send_new, recv_new) = oneshot::channel();
        let gates = Arc::new(Mutex::new(vec![recv_old, recv_new]));
        let fetcher = gated_fetcher(gates);

        let first = cache.subscribe(key(), fetcher.clone());
        tokio::task::yield_now().await;
        drop(first);
        cache.remove([&key()]);

        let mut second = cache.subscribe(key(), fetcher);
        tokio::task::yield_now().await;
        send_new.send(Ok(json!("new"))).expect("send new");
        let entry = second.settled().await;
        assert_eq!(entry.data.as_deref(), Some(&json!("new")));

        send_old.send(Ok(json!("old"))).expect("send old");
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let entry = cache.entry(&key()).expect("entry");
        assert_eq!(entry.data.as_deref(), Some(&json!("new")));
    }

    #[tokio::test]
    async fn subscription_outliving_remove_leaves_new_entry_counted() {
        let cache = QueryCache::default();
        let fetcher = counting_fetcher(Arc::new(AtomicUsize::new(0)), json!([]));

        let stale = cache.subscribe(key(), fetcher.clone());
        cache.remove([&key()]);
        let mut live = cache.subscribe(key(), fetcher);
        live.settled().await;

        drop(stale);
        let entry = cache.entry(&key()).expect("entry");
        assert_eq!(entry.subscriber_count, 1);

        live.unsubscribe();
        assert_eq!(cache.entry(&key()).expect("entry").subscriber_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_collection_keeps_entries_with_fetch_in_flight() {
        let cache = QueryCache::new(CacheConfig {
            gc_grace: Duration::from_secs(30),
            ..CacheConfig::default()
        });
        let (send, recv) = oneshot::channel();
        let gates = Arc::new(Mutex::new(vec![recv]));

        let subscription = cache.subscribe(key(), gated_fetcher(gates));
        tokio::task::yield_now().await;
        drop(subscription);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.collect_garbage(), 0);

        send.send(Ok(json!(["torta"]))).expect("send");
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        let entry = cache.entry(&key()).expect("entry");
        assert_eq!(entry.status, QueryStatus::Success);
        assert_eq!(entry.data.as_deref(), Some(&json!(["torta"])));
    }

    #[tokio::test]
    async fn invalidate_matching_hits_only_prefixed_keys() {
        let cache = QueryCache::new(CacheConfig {
            stale_after: Duration::from_secs(3600),
            ..CacheConfig::default()
        });
        let fetcher = counting_fetcher(Arc::new(AtomicUsize::new(0)), json!({}));
        let detail = QueryKey::new(["products", "7"]);
        let other = QueryKey::new(["categories"]);

        cache.fetch(detail.clone(), fetcher.clone()).await.expect("detail");
        cache.fetch(other.clone(), fetcher).await.expect("other");
        cache.invalidate_matching(&key());

        assert!(cache.entry(&detail).expect("detail").is_stale);
        assert!(!cache.entry(&other).expect("other").is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribed_entries_are_collected_after_grace() {
        let cache = QueryCache::new(CacheConfig {
            gc_grace: Duration::from_secs(30),
            ..CacheConfig::default()
        });
        let fetcher = counting_fetcher(Arc::new(AtomicUsize::new(0)), json!([]));

        let held = cache.subscribe(QueryKey::new(["categories"]), fetcher.clone());
        cache.fetch(key(), fetcher).await.expect("fetch");

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.collect_garbage(), 0);

        tokio::time::advance(Duration::from_secs(25)).await;
        assert_eq!(cache.collect_garbage(), 1);
        assert!(cache.entry(&key()).is_none());
        assert!(cache.entry(held.key()).is_some());
    }
}
