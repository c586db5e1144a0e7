//! Query coordination over the [`QueryCache`].
//!
//! A [`QueryClient`] decides when a key needs fetching, issues the fetch as a spawned
//! task and commits the settled result back into the cache. A [`QueryObserver`] is one
//! consumer's view onto a key: it subscribes to the entry, kicks off fetches when the
//! key changes and exposes the derived [`QueryState`].
//!
//! Fetch failures never reach the caller. They are retried a fixed number of times and
//! then recorded on the entry.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::{counter, histogram};
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::entry::{CacheEntry, EntryPatch, QueryStatus};
use super::error::QueryError;
use super::keys::QueryKey;
use super::store::{QueryCache, Subscription};
use super::token::{FetchToken, TokenIssuer};

const SOURCE: &str = "cache::query";

const METRIC_FETCH_TOTAL: &str = "roster_query_fetch_total";
const METRIC_CACHE_HIT_TOTAL: &str = "roster_query_cache_hit_total";
const METRIC_DEDUP_TOTAL: &str = "roster_query_dedup_total";
const METRIC_SUPERSEDED_TOTAL: &str = "roster_query_superseded_total";
const METRIC_RETRY_TOTAL: &str = "roster_query_retry_total";
const METRIC_FETCH_MS: &str = "roster_query_fetch_ms";

/// Produces the data for one key. Must be safe to call repeatedly.
pub type QueryFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync>;

/// Wrap an async closure as a [`QueryFn`], flattening its error into a [`QueryError`].
pub fn query_fn<T, E, F, Fut>(fetch: F) -> QueryFn<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: std::error::Error + 'static,
{
    Arc::new(move || {
        let future = fetch();
        async move { future.await.map_err(|err| QueryError::from_error(&err)) }.boxed()
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Show the previous key's data as a placeholder while a new key loads.
    pub keep_previous_data: bool,
}

impl QueryOptions {
    pub fn keep_previous_data() -> Self {
        Self {
            keep_previous_data: true,
        }
    }
}

struct ClientInner<T> {
    config: CacheConfig,
    cache: Arc<QueryCache<T>>,
    tokens: TokenIssuer,
    fetchers: DashMap<QueryKey, QueryFn<T>>,
}

impl<T> ClientInner<T> {
    fn is_current(&self, key: &QueryKey, token: FetchToken) -> bool {
        self.cache
            .get(key)
            .is_some_and(|entry| entry.fetch_token == Some(token))
    }
}

/// Shared handle to the query cache and its fetch bookkeeping.
pub struct QueryClient<T> {
    inner: Arc<ClientInner<T>>,
}

impl<T> Clone for QueryClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

enum Decision {
    Fresh,
    Joined,
    Issued(FetchToken),
}

impl<T> QueryClient<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                cache: Arc::new(QueryCache::new()),
                tokens: TokenIssuer::new(),
                fetchers: DashMap::new(),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<QueryCache<T>> {
        &self.inner.cache
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Start observing `key`, fetching it unless a fresh result is cached.
    pub fn observe(&self, key: QueryKey, fetch: QueryFn<T>, options: QueryOptions) -> QueryObserver<T> {
        let (sender, receiver) = watch::channel(0_u64);
        let version = Arc::new(sender);
        let subscription = subscribe_versioned(&self.inner.cache, &key, &version);

        let observer = QueryObserver {
            client: self.clone(),
            key,
            fetch,
            options,
            version,
            receiver,
            subscription,
        };
        self.prefetch(&observer.key, Arc::clone(&observer.fetch));
        observer
    }

    /// Fetch `key` unless it is fresh or already being fetched.
    ///
    /// Returns the token of the fetch this call issued, if any. A caller that finds a
    /// live fetch joins it instead of issuing another one.
    pub fn prefetch(&self, key: &QueryKey, fetch: QueryFn<T>) -> Option<FetchToken> {
        self.inner.fetchers.insert(key.clone(), Arc::clone(&fetch));

        let now = Instant::now();
        let stale_time = self.inner.config.stale_time();
        let tokens = &self.inner.tokens;
        let mut decision = Decision::Fresh;

        let claimed = self.inner.cache.set_with(key, |entry| {
            // A fetch started before an invalidation may return outdated data.
            if entry.is_fetching() && entry.fetch_token.is_some() && !entry.is_invalidated {
                decision = Decision::Joined;
                return None;
            }
            if entry.is_fresh(now, stale_time) {
                return None;
            }
            let token = tokens.issue();
            decision = Decision::Issued(token);
            Some(
                EntryPatch::new()
                    .status(QueryStatus::Loading)
                    .token(token)
                    .invalidated(false),
            )
        });
        if let Err(err) = claimed {
            warn!(target_module = SOURCE, key = %key, error = %err, "Failed to claim fetch");
            return None;
        }

        let resource = resource_label(key);
        match decision {
            Decision::Fresh => {
                counter!(METRIC_CACHE_HIT_TOTAL, "resource" => resource).increment(1);
                None
            }
            Decision::Joined => {
                counter!(METRIC_DEDUP_TOTAL, "resource" => resource).increment(1);
                debug!(target_module = SOURCE, key = %key, "Joined in-flight fetch");
                None
            }
            Decision::Issued(token) => {
                self.spawn_fetch(key.clone(), fetch, token);
                Some(token)
            }
        }
    }

    /// Fetch `key` regardless of freshness, superseding any fetch in flight.
    pub fn refetch(&self, key: &QueryKey, fetch: QueryFn<T>) -> Option<FetchToken> {
        self.inner.fetchers.insert(key.clone(), Arc::clone(&fetch));

        let token = self.inner.tokens.issue();
        let patch = EntryPatch::new()
            .status(QueryStatus::Loading)
            .token(token)
            .invalidated(false);
        if let Err(err) = self.inner.cache.set(key, patch) {
            warn!(target_module = SOURCE, key = %key, error = %err, "Failed to start refetch");
            return None;
        }
        self.spawn_fetch(key.clone(), fetch, token);
        Some(token)
    }

    /// Invalidate every entry matching `predicate` and refetch the observed ones.
    ///
    /// Unobserved entries are only marked, so they refetch on their next observation.
    pub fn invalidate_queries(&self, predicate: impl Fn(&QueryKey) -> bool) -> Vec<QueryKey> {
        let keys = self.inner.cache.invalidate(predicate);
        for key in &keys {
            if self.inner.cache.subscriber_count(key) == 0 {
                continue;
            }
            let fetch = self
                .inner
                .fetchers
                .get(key)
                .map(|registered| Arc::clone(registered.value()));
            if let Some(fetch) = fetch {
                self.refetch(key, fetch);
            }
        }
        keys
    }

    /// Evict entries unobserved for longer than the configured gc time.
    pub fn collect_garbage(&self) -> Vec<QueryKey> {
        let Some(gc_time) = self.inner.config.gc_time() else {
            return Vec::new();
        };
        let evicted = self.inner.cache.evict_unobserved(Instant::now(), gc_time);
        for key in &evicted {
            self.inner.fetchers.remove(key);
        }
        evicted
    }

    fn spawn_fetch(&self, key: QueryKey, fetch: QueryFn<T>, token: FetchToken) {
        counter!(METRIC_FETCH_TOTAL, "resource" => resource_label(&key)).increment(1);
        debug!(target_module = SOURCE, key = %key, token = %token, "Fetch issued");
        tokio::spawn(run_fetch(Arc::clone(&self.inner), key, fetch, token));
    }
}

async fn run_fetch<T>(inner: Arc<ClientInner<T>>, key: QueryKey, fetch: QueryFn<T>, token: FetchToken)
where
    T: Send + Sync + 'static,
{
    let started_at = Instant::now();
    let mut attempt = 0_u32;

    let result = loop {
        match fetch().await {
            Ok(data) => break Ok(data),
            Err(err) if attempt < inner.config.retry => {
                attempt += 1;
                if !inner.is_current(&key, token) {
                    record_superseded(&key, token);
                    return;
                }
                counter!(METRIC_RETRY_TOTAL, "resource" => resource_label(&key)).increment(1);
                debug!(
                    target_module = SOURCE,
                    key = %key,
                    attempt,
                    error = %err,
                    "Fetch failed; retrying"
                );
                sleep(inner.config.retry_delay()).await;
                if !inner.is_current(&key, token) {
                    record_superseded(&key, token);
                    return;
                }
            }
            Err(err) => break Err(err),
        }
    };

    let outcome = if result.is_ok() { "ok" } else { "error" };
    histogram!(METRIC_FETCH_MS, "outcome" => outcome)
        .record(started_at.elapsed().as_secs_f64() * 1000.0);

    let patch = match result {
        Ok(data) => EntryPatch::new()
            .status(QueryStatus::Success)
            .data(Arc::new(data))
            .clear_error()
            .placeholder(false)
            .fetched_at(Instant::now()),
        Err(err) => {
            warn!(target_module = SOURCE, key = %key, error = %err, "Fetch failed");
            EntryPatch::new()
                .status(QueryStatus::Error)
                .error(err)
                .discard_placeholder()
                .placeholder(false)
        }
    };

    match inner.cache.set_if_current(&key, token, patch) {
        Ok(true) => {}
        Ok(false) => record_superseded(&key, token),
        Err(err) => warn!(target_module = SOURCE, key = %key, error = %err, "Failed to commit fetch"),
    }
}

fn record_superseded(key: &QueryKey, token: FetchToken) {
    counter!(METRIC_SUPERSEDED_TOTAL, "resource" => resource_label(key)).increment(1);
    debug!(target_module = SOURCE, key = %key, token = %token, "Dropped superseded fetch result");
}

fn resource_label(key: &QueryKey) -> String {
    key.resource_name().unwrap_or("unknown").to_string()
}

fn subscribe_versioned<T>(
    cache: &Arc<QueryCache<T>>,
    key: &QueryKey,
    version: &Arc<watch::Sender<u64>>,
) -> Subscription<T> {
    let version = Arc::clone(version);
    cache.subscribe(key, move |_| version.send_modify(|value| *value += 1))
}

// ============================================================================
// Observer
// ============================================================================

/// Derived view of a cache entry for one observer.
#[derive(Debug)]
pub struct QueryState<T> {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub data: Option<Arc<T>>,
    pub error: Option<QueryError>,
    /// `data` belongs to a previous key.
    pub is_placeholder_data: bool,
    pub is_fetching: bool,
    pub is_invalidated: bool,
    pub fetched_at: Option<Instant>,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            is_placeholder_data: self.is_placeholder_data,
            is_fetching: self.is_fetching,
            is_invalidated: self.is_invalidated,
            fetched_at: self.fetched_at,
        }
    }
}

impl<T> QueryState<T> {
    fn from_entry(entry: CacheEntry<T>, options: QueryOptions) -> Self {
        let data = if entry.is_placeholder && !options.keep_previous_data {
            None
        } else {
            entry.data
        };
        Self {
            key: entry.key,
            status: entry.status,
            is_placeholder_data: entry.is_placeholder && data.is_some(),
            data,
            error: entry.error,
            is_fetching: entry.status == QueryStatus::Loading,
            is_invalidated: entry.is_invalidated,
            fetched_at: entry.fetched_at,
        }
    }

    /// No data of its own yet and a fetch is running.
    pub fn is_loading(&self) -> bool {
        self.is_fetching && (self.data.is_none() || self.is_placeholder_data)
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }
}

/// One consumer's subscription to a query key.
///
/// Dropping the observer unsubscribes it; fetches already running still settle into
/// the cache.
pub struct QueryObserver<T> {
    client: QueryClient<T>,
    key: QueryKey,
    fetch: QueryFn<T>,
    options: QueryOptions,
    version: Arc<watch::Sender<u64>>,
    receiver: watch::Receiver<u64>,
    subscription: Subscription<T>,
}

impl<T> QueryObserver<T>
where
    T: Send + Sync + 'static,
{
    pub fn key(&self) -> &QueryKey {
        self.subscription.key()
    }

    pub fn options(&self) -> QueryOptions {
        self.options
    }

    pub fn state(&self) -> QueryState<T> {
        let entry = self
            .client
            .cache()
            .get(&self.key)
            .unwrap_or_else(|| CacheEntry::new(self.key.clone()));
        QueryState::from_entry(entry, self.options)
    }

    /// Switch to `key`, fetching it unless a fresh result is cached.
    ///
    /// With `keep_previous_data`, the current key's data stands in as a placeholder
    /// until the new key settles.
    pub fn set_query(&mut self, key: QueryKey, fetch: QueryFn<T>) {
        self.fetch = fetch;
        if key == self.key {
            self.client.prefetch(&self.key, Arc::clone(&self.fetch));
            return;
        }

        let previous = if self.options.keep_previous_data {
            self.client.cache().get(&self.key).and_then(|entry| entry.data)
        } else {
            None
        };

        self.subscription = subscribe_versioned(self.client.cache(), &key, &self.version);
        self.key = key;
        self.client.prefetch(&self.key, Arc::clone(&self.fetch));

        if let Some(previous) = previous {
            let placeholder = EntryPatch::new().data(previous).placeholder(true);
            let applied = self.client.cache().set_if(
                &self.key,
                |entry| entry.data.is_none() && entry.is_fetching(),
                placeholder,
            );
            if let Err(err) = applied {
                warn!(target_module = SOURCE, key = %self.key, error = %err, "Failed to set placeholder");
            }
        }
        self.version.send_modify(|value| *value += 1);
    }

    /// Fetch the current key again regardless of freshness.
    pub fn refetch(&self) -> Option<FetchToken> {
        self.client.refetch(&self.key, Arc::clone(&self.fetch))
    }

    /// Wait for the next change to the observed entry.
    pub async fn changed(&mut self) {
        // The sender lives in `self`, so this never reports a closed channel.
        let _ = self.receiver.changed().await;
    }

    /// Wait until `predicate` holds for the observed state.
    pub async fn wait_until(&mut self, predicate: impl Fn(&QueryState<T>) -> bool) -> QueryState<T> {
        loop {
            self.receiver.borrow_and_update();
            let state = self.state();
            if predicate(&state) {
                return state;
            }
            self.changed().await;
        }
    }

    /// Wait until no fetch is running for the observed key.
    pub async fn settled(&mut self) -> QueryState<T> {
        self.wait_until(|state| !state.is_fetching).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    fn config() -> CacheConfig {
        CacheConfig {
            retry_delay_ms: 10,
            ..Default::default()
        }
    }

    fn key(page: u32) -> QueryKey {
        QueryKey::resource("users").with(page)
    }

    /// Fetch that sleeps, then returns `value`, counting its calls.
    fn counted(value: u32, latency_ms: u64) -> (Arc<AtomicUsize>, QueryFn<u32>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fetch: QueryFn<u32> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                sleep(Duration::from_millis(latency_ms)).await;
                Ok(value)
            }
            .boxed()
        });
        (calls, fetch)
    }

    /// Fetch that fails the first `failures` calls.
    fn flaky(failures: usize) -> (Arc<AtomicUsize>, QueryFn<u32>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fetch: QueryFn<u32> = Arc::new(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                sleep(Duration::from_millis(50)).await;
                if call < failures {
                    Err(QueryError::new("backend unavailable"))
                } else {
                    Ok(42)
                }
            }
            .boxed()
        });
        (calls, fetch)
    }

    /// Fetch whose calls resolve only when the test sends their value.
    fn controlled() -> (Arc<Mutex<VecDeque<oneshot::Sender<u32>>>>, QueryFn<u32>) {
        let senders = Arc::new(Mutex::new(VecDeque::new()));
        let queue = Arc::clone(&senders);
        let fetch: QueryFn<u32> = Arc::new(move || {
            let (tx, rx) = oneshot::channel();
            queue.lock().expect("sender queue").push_back(tx);
            async move { rx.await.map_err(|_| QueryError::new("fetch abandoned")) }.boxed()
        });
        (senders, fetch)
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_observers_share_one_fetch() {
        let client = QueryClient::new(config());
        let (calls, fetch) = counted(5, 100);

        let mut first = client.observe(key(1), Arc::clone(&fetch), QueryOptions::default());
        let mut second = client.observe(key(1), fetch, QueryOptions::default());

        let a = first.settled().await;
        let b = second.settled().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.data.as_deref(), Some(&5));
        assert_eq!(b.data.as_deref(), Some(&5));
        assert_eq!(client.cache().subscriber_count(&key(1)), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn newest_issued_fetch_wins_regardless_of_completion_order() {
        let client = QueryClient::new(config());
        let (senders, fetch) = controlled();

        let mut observer = client.observe(key(1), fetch, QueryOptions::default());
        observer.refetch();

        // Spawned fetches register their senders once polled.
        tokio::task::yield_now().await;
        let (older, newer) = {
            let mut queue = senders.lock().expect("sender queue");
            (
                queue.pop_front().expect("first fetch issued"),
                queue.pop_front().expect("second fetch issued"),
            )
        };

        newer.send(2).expect("newer fetch is waiting");
        let state = observer.settled().await;
        assert_eq!(state.data.as_deref(), Some(&2));

        older.send(1).expect("older fetch is waiting");
        sleep(Duration::from_millis(10)).await;

        let state = observer.state();
        assert_eq!(state.data.as_deref(), Some(&2));
        assert_eq!(state.status, QueryStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn keep_previous_data_shows_placeholder_while_loading() {
        let client = QueryClient::new(config());
        let (_, first_fetch) = counted(1, 100);
        let (_, second_fetch) = counted(2, 100);

        let mut observer = client.observe(key(1), first_fetch, QueryOptions::keep_previous_data());
        observer.settled().await;

        observer.set_query(key(2), second_fetch);
        let loading = observer.state();
        assert!(loading.is_fetching);
        assert!(loading.is_placeholder_data);
        assert_eq!(loading.data.as_deref(), Some(&1));

        let settled = observer.settled().await;
        assert!(!settled.is_placeholder_data);
        assert_eq!(settled.data.as_deref(), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn without_keep_previous_data_new_key_starts_empty() {
        let client = QueryClient::new(config());
        let (_, first_fetch) = counted(1, 100);
        let (_, second_fetch) = counted(2, 100);

        let mut observer = client.observe(key(1), first_fetch, QueryOptions::default());
        observer.settled().await;
        observer.set_query(key(2), second_fetch);

        let loading = observer.state();
        assert!(loading.is_loading());
        assert!(loading.data.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn single_failure_is_retried_silently() {
        let client = QueryClient::new(config());
        let (calls, fetch) = flaky(1);

        let mut observer = client.observe(key(1), fetch, QueryOptions::default());
        let state = observer.settled().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(state.is_success());
        assert_eq!(state.data.as_deref(), Some(&42));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failure_surfaces_error_and_refetch_recovers() {
        let client = QueryClient::new(config());
        let (calls, fetch) = flaky(2);

        let mut observer = client.observe(key(1), fetch, QueryOptions::default());
        let state = observer.settled().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(state.is_error());
        assert_eq!(
            state.error.as_ref().map(QueryError::message),
            Some("backend unavailable")
        );

        observer.refetch();
        let state = observer.settled().await;
        assert!(state.is_success());
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn error_keeps_previously_fetched_data() {
        let client = QueryClient::new(config());
        let (_, good) = counted(9, 10);
        let (_, bad) = flaky(usize::MAX);

        let mut observer = client.observe(key(1), good, QueryOptions::default());
        observer.settled().await;
        client.refetch(&key(1), bad);

        let state = observer.settled().await;
        assert!(state.is_error());
        assert_eq!(state.data.as_deref(), Some(&9));
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_are_served_without_fetching() {
        let client = QueryClient::new(config());
        let (calls, fetch) = counted(3, 100);

        let mut observer = client.observe(key(1), Arc::clone(&fetch), QueryOptions::default());
        observer.settled().await;
        drop(observer);

        let again = client.observe(key(1), Arc::clone(&fetch), QueryOptions::default());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(again.state().is_success());
        drop(again);

        sleep(client.config().stale_time()).await;
        let mut stale = client.observe(key(1), fetch, QueryOptions::default());
        let revalidating = stale.state();
        assert!(revalidating.is_fetching);
        assert!(!revalidating.is_loading());
        assert_eq!(revalidating.data.as_deref(), Some(&3));

        stale.settled().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_refetches_only_observed_keys() {
        let client = QueryClient::new(config());
        let (observed_calls, observed_fetch) = counted(1, 10);
        let (idle_calls, idle_fetch) = counted(2, 10);

        let mut observer = client.observe(key(1), observed_fetch, QueryOptions::default());
        observer.settled().await;
        let mut idle = client.observe(key(2), idle_fetch, QueryOptions::default());
        idle.settled().await;
        drop(idle);

        let mut invalidated = client.invalidate_queries(|key| key.is_resource("users"));
        invalidated.sort();
        assert_eq!(invalidated, vec![key(1), key(2)]);

        assert!(observer.state().is_fetching);
        observer.settled().await;
        assert_eq!(observed_calls.load(Ordering::SeqCst), 2);
        assert_eq!(idle_calls.load(Ordering::SeqCst), 1);
        assert!(client.cache().get(&key(2)).is_some_and(|e| e.is_invalidated));
        assert!(client.cache().get(&key(1)).is_some_and(|e| !e.is_invalidated));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_during_an_unobserved_fetch_survives_its_completion() {
        let client = QueryClient::new(config());
        let (calls, fetch) = counted(4, 100);

        let observer = client.observe(key(1), Arc::clone(&fetch), QueryOptions::default());
        drop(observer);
        client.invalidate_queries(|key| key.is_resource("users"));
        sleep(Duration::from_millis(150)).await;

        let entry = client.cache().get(&key(1)).expect("entry kept");
        assert_eq!(entry.status, QueryStatus::Success);
        assert!(entry.is_invalidated);

        let mut again = client.observe(key(1), fetch, QueryOptions::default());
        assert!(again.state().is_fetching);
        again.settled().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(client.cache().get(&key(1)).is_some_and(|e| !e.is_invalidated));
    }

    #[tokio::test(start_paused = true)]
    async fn observing_an_invalidated_in_flight_key_issues_a_new_fetch() {
        let client = QueryClient::new(config());
        let (calls, fetch) = counted(4, 100);

        let first = client.observe(key(1), Arc::clone(&fetch), QueryOptions::default());
        drop(first);
        client.invalidate_queries(|key| key.is_resource("users"));

        let mut second = client.observe(key(1), fetch, QueryOptions::default());
        let state = second.settled().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(state.data.as_deref(), Some(&4));
        assert!(!state.is_invalidated);
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_collection_evicts_unobserved_entries() {
        let client = QueryClient::new(config());
        let (_, fetch) = counted(1, 10);

        let mut observer = client.observe(key(1), fetch, QueryOptions::default());
        observer.settled().await;
        assert!(client.collect_garbage().is_empty());

        drop(observer);
        sleep(client.config().gc_time().expect("gc enabled by default")).await;

        assert_eq!(client.collect_garbage(), vec![key(1)]);
        assert!(client.cache().is_empty());
    }
}
