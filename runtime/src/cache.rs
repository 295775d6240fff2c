//! Keyed query cache.
//!
//! One entry per [`QueryKey`]. Entries are created by the first subscription
//! and live until [`QueryCache::remove`] or [`QueryCache::clear`]; there is
//! no TTL and no eviction.
//!
//! # Request deduplication
//!
//! While a fetch for a key is in flight, every new subscriber awaits that same
//! fetch. N concurrent subscribers to one key produce one request.
//!
//! # Stale-response guard
//!
//! Every request (and every direct write) takes a fresh generation from a
//! counter shared by the whole cache, and each entry remembers the newest one
//! issued for it. A response is applied only if its generation is still the
//! entry's newest when it arrives. Generations never repeat, so a response
//! from before a `remove` or `clear` cannot match the entry created after it. A slow response from a
//! superseded request (earlier refetch, pre-invalidation fetch, or a fetch
//! overtaken by an optimistic write) is discarded.
//!
//! Fetches run on spawned tasks: a subscriber that stops waiting (dropped or
//! cancelled) does not abort the request, and the result still lands in the
//! cache for the next reader.

use crate::error::SyncError;
use eventdesk_client::codec::{decode_collection, decode_entity};
use eventdesk_client::{ClientError, ResourceClient};
use eventdesk_core::cancel::CancellationToken;
use eventdesk_core::environment::{Clock, SystemClock};
use eventdesk_core::key::{Filters, QueryKey};
use eventdesk_core::resource::{Resource, ResourceKind};
use eventdesk_core::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Snapshot of one cached query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheEntry {
    /// Last successfully fetched payload, `None` until the first success
    pub data: Option<Arc<Value>>,
    /// A request for this key is in flight
    pub loading: bool,
    /// When `data` was fetched
    pub fetched_at: Option<DateTime<Utc>>,
    /// Error of the most recent completed request, cleared on success
    pub error: Option<ClientError>,
    /// Invalidated since `data` was fetched
    pub stale: bool,
}

impl CacheEntry {
    fn needs_fetch(&self) -> bool {
        self.data.is_none() || self.stale
    }
}

type InFlight = Shared<BoxFuture<'static, ()>>;

struct Slot {
    state: watch::Sender<CacheEntry>,
    /// Generation of the most recently issued request or write
    generation: u64,
    /// Request whose response will be applied, with its generation
    in_flight: Option<(u64, InFlight)>,
    subscribers: Arc<AtomicUsize>,
}

impl Slot {
    fn new() -> Self {
        let (state, _rx) = watch::channel(CacheEntry::default());
        Self {
            state,
            generation: 0,
            in_flight: None,
            subscribers: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn active_subscribers(&self) -> usize {
        self.subscribers.load(Ordering::Acquire)
    }
}

struct Inner {
    client: Arc<dyn ResourceClient>,
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<QueryKey, Slot>>,
    generations: AtomicU64,
}

impl Inner {
    fn slots(&self) -> MutexGuard<'_, HashMap<QueryKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Store the outcome of request `generation`, unless it was superseded
    fn apply(&self, key: &QueryKey, generation: u64, result: Result<Value, ClientError>) {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(key) else {
            debug!(key = %key, generation, "Entry removed before response arrived");
            return;
        };

        if generation != slot.generation {
            debug!(
                key = %key,
                generation,
                current = slot.generation,
                "Discarding response from superseded request"
            );
            metrics::counter!("query_cache.superseded").increment(1);
            return;
        }

        slot.in_flight = None;
        let now = self.clock.now();
        slot.state.send_modify(|entry| {
            entry.loading = false;
            match result {
                Ok(value) => {
                    entry.data = Some(Arc::new(value));
                    entry.fetched_at = Some(now);
                    entry.error = None;
                    entry.stale = false;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Query failed");
                    metrics::counter!("query_cache.errors").increment(1);
                    entry.error = Some(e);
                }
            }
        });
    }
}

/// Keyed cache of remote query results
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    /// Cache backed by `client`, timestamps from the system clock
    #[must_use]
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self::with_clock(client, Arc::new(SystemClock))
    }

    /// Cache with an injected clock
    #[must_use]
    pub fn with_clock(client: Arc<dyn ResourceClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                clock,
                slots: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to `key`, fetching it if needed
    ///
    /// Creates the entry on first subscription. Joins the in-flight request
    /// if there is one, fetches if the entry has no data or is stale, and
    /// otherwise returns immediately with the cached data. Resolves once the
    /// newest request for the key has settled; a failed request is reported
    /// through [`CacheEntry::error`].
    pub async fn subscribe(&self, key: QueryKey) -> Subscription {
        let (rx, guard) = {
            let mut slots = self.inner.slots();
            let created = !slots.contains_key(&key);
            let slot = slots.entry(key.clone()).or_insert_with(Slot::new);
            let guard = SubscriberGuard::new(&slot.subscribers);

            if created {
                debug!(key = %key, "Cache entry created");
            }

            let needs_fetch = slot.state.borrow().needs_fetch();
            if slot.in_flight.is_some() {
                metrics::counter!("query_cache.deduplicated").increment(1);
                debug!(key = %key, "Joining in-flight request");
            } else if needs_fetch {
                metrics::counter!("query_cache.misses").increment(1);
                self.start_fetch(&key, slot);
            } else {
                metrics::counter!("query_cache.hits").increment(1);
            }

            (slot.state.subscribe(), guard)
        };

        self.settle(&key).await;

        Subscription {
            key,
            rx,
            _guard: guard,
        }
    }

    /// Subscribe, giving up if `token` is cancelled first
    ///
    /// The underlying request keeps running and still populates the cache.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if the token fires before the entry settles.
    pub async fn subscribe_until_cancelled(
        &self,
        key: QueryKey,
        token: &CancellationToken,
    ) -> Result<Subscription, SyncError> {
        Ok(token.run_until_cancelled(self.subscribe(key)).await?)
    }

    /// Subscribe and return the payload
    ///
    /// # Errors
    ///
    /// Returns the request error if the entry has no data to serve.
    pub async fn fetch(&self, key: QueryKey) -> Result<Arc<Value>, SyncError> {
        let entry = self.subscribe(key).await.entry();
        match (entry.data, entry.error) {
            (Some(data), _) => Ok(data),
            (None, Some(e)) => Err(e.into()),
            (None, None) => Ok(Arc::new(Value::Null)),
        }
    }

    /// Cached, typed list of `T` matching `filters`
    ///
    /// # Errors
    ///
    /// Returns the request error if nothing is cached, or a decode error.
    pub async fn query<T: Resource>(&self, filters: Filters) -> Result<Vec<T>, SyncError> {
        let data = self.fetch(QueryKey::new(T::KIND, filters)).await?;
        Ok(decode_collection((*data).clone())?)
    }

    /// Issue a new request for `key` and wait for the entry to settle
    ///
    /// Always hits the network, superseding any request already in flight.
    /// Creates the entry if it does not exist.
    pub async fn refetch(&self, key: &QueryKey) -> CacheEntry {
        let pending = {
            let mut slots = self.inner.slots();
            let slot = slots.entry(key.clone()).or_insert_with(Slot::new);
            self.start_fetch(key, slot)
        };

        pending.await;
        self.settle(key).await;
        self.entry(key).unwrap_or_default()
    }

    /// Mark `key` stale
    ///
    /// A missing entry is left missing. An entry with active subscribers (or
    /// a request in flight) is refetched in the background; otherwise the
    /// next subscription refetches it. Returns whether an entry existed.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let mut slots = self.inner.slots();
        let Some(slot) = slots.get_mut(key) else {
            debug!(key = %key, "Invalidate on missing entry ignored");
            return false;
        };

        self.invalidate_slot(key, slot);
        true
    }

    /// Invalidate every entry of `resource`, returning how many existed
    pub fn invalidate_resource(&self, resource: ResourceKind) -> usize {
        let mut slots = self.inner.slots();
        let mut count = 0;
        for (key, slot) in slots.iter_mut().filter(|(k, _)| k.resource() == resource) {
            self.invalidate_slot(key, slot);
            count += 1;
        }
        debug!(resource = %resource, count, "Invalidated resource");
        count
    }

    fn invalidate_slot(&self, key: &QueryKey, slot: &mut Slot) {
        slot.state.send_modify(|entry| entry.stale = true);
        metrics::counter!("query_cache.invalidations").increment(1);

        // A request issued before the invalidation may carry outdated data
        if slot.active_subscribers() > 0 || slot.in_flight.is_some() {
            self.start_fetch(key, slot);
        }
    }

    /// Write `value` into `key` directly (optimistic update)
    ///
    /// Supersedes any request in flight so its response cannot overwrite
    /// the written value. Creates the entry if it does not exist.
    pub fn set_data(&self, key: &QueryKey, value: Value) {
        let mut slots = self.inner.slots();
        let slot = slots.entry(key.clone()).or_insert_with(Slot::new);
        slot.generation = self.inner.next_generation();
        slot.in_flight = None;

        let now = self.inner.clock.now();
        slot.state.send_modify(|entry| {
            entry.data = Some(Arc::new(value));
            entry.loading = false;
            entry.fetched_at = Some(now);
            entry.error = None;
            entry.stale = false;
        });
        debug!(key = %key, generation = slot.generation, "Cache entry written directly");
    }

    /// Current snapshot of `key`, without creating or fetching it
    #[must_use]
    pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.inner
            .slots()
            .get(key)
            .map(|slot| slot.state.borrow().clone())
    }

    /// Number of live subscriptions to `key`
    #[must_use]
    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.inner
            .slots()
            .get(key)
            .map_or(0, Slot::active_subscribers)
    }

    /// Drop the entry for `key`; waiting subscribers see [`SyncError::EntryRemoved`]
    pub fn remove(&self, key: &QueryKey) -> bool {
        self.inner.slots().remove(key).is_some()
    }

    /// Drop every entry (e.g. on logout)
    pub fn clear(&self) {
        let mut slots = self.inner.slots();
        debug!(entries = slots.len(), "Clearing query cache");
        slots.clear();
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.slots().len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.slots().is_empty()
    }

    /// Issue a request under a fresh generation; caller holds the lock
    fn start_fetch(&self, key: &QueryKey, slot: &mut Slot) -> InFlight {
        let generation = self.inner.next_generation();
        slot.generation = generation;
        slot.state.send_modify(|entry| entry.loading = true);

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let result = inner.client.fetch(&task_key).await;
            inner.apply(&task_key, generation, result);
        });

        let log_key = key.clone();
        let pending = task
            .map(move |joined| {
                if let Err(e) = joined {
                    error!(key = %log_key, generation, error = %e, "Fetch task failed");
                }
            })
            .boxed()
            .shared();

        debug!(key = %key, generation, "Fetch issued");
        metrics::counter!("query_cache.fetches").increment(1);
        slot.in_flight = Some((generation, pending.clone()));
        pending
    }

    /// Wait until no request for `key` is in flight
    ///
    /// Follows supersessions: if the awaited request was overtaken by a newer
    /// one, waits for that one too.
    async fn settle(&self, key: &QueryKey) {
        loop {
            let Some((generation, pending)) = self
                .inner
                .slots()
                .get(key)
                .and_then(|slot| slot.in_flight.clone())
            else {
                return;
            };

            pending.await;

            // The task ended without applying its own response (panic)
            let mut slots = self.inner.slots();
            if let Some(slot) = slots.get_mut(key) {
                if slot
                    .in_flight
                    .as_ref()
                    .is_some_and(|(current, _)| *current == generation)
                {
                    slot.in_flight = None;
                    slot.state.send_modify(|entry| entry.loading = false);
                }
            }
        }
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

struct SubscriberGuard(Arc<AtomicUsize>);

impl SubscriberGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A live view of one cache entry
///
/// Dropping it unsubscribes.
pub struct Subscription {
    key: QueryKey,
    rx: watch::Receiver<CacheEntry>,
    _guard: SubscriberGuard,
}

impl Subscription {
    /// The subscribed key
    #[must_use]
    pub const fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Current snapshot
    #[must_use]
    pub fn entry(&self) -> CacheEntry {
        self.rx.borrow().clone()
    }

    /// Current payload decoded as `T`
    ///
    /// # Errors
    ///
    /// Returns a decode error if the payload does not match `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, SyncError> {
        let data = self.rx.borrow().data.clone();
        data.map(|value| decode_entity((*value).clone()))
            .transpose()
            .map_err(SyncError::from)
    }

    /// Current payload decoded as a list of `T` (empty before the first success)
    ///
    /// # Errors
    ///
    /// Returns a decode error if the payload is not a list of `T`.
    pub fn items<T: DeserializeOwned>(&self) -> Result<Vec<T>, SyncError> {
        let data = self.rx.borrow().data.clone();
        match data {
            Some(value) => Ok(decode_collection((*value).clone())?),
            None => Ok(Vec::new()),
        }
    }

    /// Wait for the next change to the entry
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::EntryRemoved`] if the entry is removed from the cache.
    pub async fn changed(&mut self) -> Result<CacheEntry, SyncError> {
        self.rx
            .changed()
            .await
            .map_err(|_| SyncError::EntryRemoved(self.key.to_string()))?;
        Ok(self.entry())
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
