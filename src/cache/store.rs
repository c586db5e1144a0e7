//! Keyed query cache storage.
//!
//! One [`CacheEntry`] per [`QueryKey`] plus the listeners subscribed to it. All
//! mutation goes through `set`, `set_with`, `set_if_current` and `invalidate`; each of
//! them applies the patch under the write lock, then notifies the key's listeners with
//! a snapshot of the entry after the lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use metrics::gauge;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::util::lock::{rw_read, rw_write};

use super::entry::{CacheEntry, EntryPatch};
use super::error::CacheError;
use super::keys::QueryKey;
use super::token::FetchToken;

const SOURCE: &str = "cache::store";
const METRIC_CACHE_ENTRIES: &str = "roster_cache_entries";

/// Callback invoked with the entry snapshot after every change to its key.
pub type Listener<T> = Arc<dyn Fn(&CacheEntry<T>) + Send + Sync>;

struct Slot<T> {
    entry: CacheEntry<T>,
    listeners: Vec<(u64, Listener<T>)>,
    /// Set while no listener is attached; drives garbage collection.
    unobserved_since: Option<Instant>,
}

impl<T> Slot<T> {
    fn new(key: QueryKey) -> Self {
        Self {
            entry: CacheEntry::new(key),
            listeners: Vec::new(),
            unobserved_since: Some(Instant::now()),
        }
    }

    fn listeners(&self) -> Vec<Listener<T>> {
        self.listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

type Notification<T> = (CacheEntry<T>, Vec<Listener<T>>);

/// In-memory store of query results.
pub struct QueryCache<T> {
    slots: RwLock<HashMap<QueryKey, Slot<T>>>,
    next_listener_id: AtomicU64,
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> QueryCache<T> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Snapshot of the entry for `key`.
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry<T>> {
        rw_read(&self.slots, SOURCE, "get")
            .get(key)
            .map(|slot| slot.entry.clone())
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        rw_read(&self.slots, SOURCE, "subscriber_count")
            .get(key)
            .map_or(0, |slot| slot.listeners.len())
    }

    pub fn len(&self) -> usize {
        rw_read(&self.slots, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        rw_read(&self.slots, SOURCE, "keys").keys().cloned().collect()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Merge `patch` into the entry for `key`, creating it if absent.
    pub fn set(&self, key: &QueryKey, patch: EntryPatch<T>) -> Result<(), CacheError> {
        self.set_with(key, |_| Some(patch)).map(|_| ())
    }

    /// Merge `patch` only if `predicate` holds for the current entry.
    ///
    /// An absent entry is evaluated as a fresh `Idle` one.
    pub fn set_if(
        &self,
        key: &QueryKey,
        predicate: impl FnOnce(&CacheEntry<T>) -> bool,
        patch: EntryPatch<T>,
    ) -> Result<bool, CacheError> {
        self.set_with(key, |entry| predicate(entry).then_some(patch))
    }

    /// Merge `patch` only if `token` is still the latest fetch issued for `key`.
    pub fn set_if_current(
        &self,
        key: &QueryKey,
        token: FetchToken,
        patch: EntryPatch<T>,
    ) -> Result<bool, CacheError> {
        self.set_if(key, |entry| entry.fetch_token == Some(token), patch)
    }

    /// Decide and apply a patch atomically.
    ///
    /// `decide` sees the current entry under the write lock and returns the patch to
    /// apply, or `None` to leave the entry alone. Returns whether a patch was applied.
    /// An entry that did not exist is only created when a patch is applied.
    pub fn set_with(
        &self,
        key: &QueryKey,
        decide: impl FnOnce(&CacheEntry<T>) -> Option<EntryPatch<T>>,
    ) -> Result<bool, CacheError> {
        let (notification, created, total) = {
            let mut slots = rw_write(&self.slots, SOURCE, "set");
            let created = !slots.contains_key(key);
            if created {
                let mut fresh = Slot::new(key.clone());
                let Some(patch) = decide(&fresh.entry) else {
                    return Ok(false);
                };
                patch.apply(&mut fresh.entry)?;
                let notification = (fresh.entry.clone(), Vec::new());
                slots.insert(key.clone(), fresh);
                (notification, true, slots.len())
            } else {
                let Some(slot) = slots.get_mut(key) else {
                    return Ok(false);
                };
                let Some(patch) = decide(&slot.entry) else {
                    return Ok(false);
                };
                patch.apply(&mut slot.entry)?;
                let notification = (slot.entry.clone(), slot.listeners());
                (notification, false, slots.len())
            }
        };

        if created {
            gauge!(METRIC_CACHE_ENTRIES).set(total as f64);
        }
        trace!(
            target_module = SOURCE,
            key = %key,
            status = notification.0.status.as_str(),
            listeners = notification.1.len(),
            "Cache entry updated"
        );
        notify(notification);
        Ok(true)
    }

    /// Mark every entry whose key satisfies `predicate` as invalidated.
    ///
    /// Returns the affected keys. Subscribers of each key are notified.
    pub fn invalidate(&self, predicate: impl Fn(&QueryKey) -> bool) -> Vec<QueryKey> {
        let notifications: Vec<Notification<T>> = {
            let mut slots = rw_write(&self.slots, SOURCE, "invalidate");
            slots
                .iter_mut()
                .filter(|(key, _)| predicate(key))
                .map(|(_, slot)| {
                    slot.entry.is_invalidated = true;
                    (slot.entry.clone(), slot.listeners())
                })
                .collect()
        };

        let keys: Vec<QueryKey> = notifications
            .iter()
            .map(|(entry, _)| entry.key.clone())
            .collect();
        debug!(target_module = SOURCE, invalidated = keys.len(), "Invalidated cache entries");
        for notification in notifications {
            notify(notification);
        }
        keys
    }

    /// Drop the entry for `key` along with its listeners.
    pub fn remove(&self, key: &QueryKey) -> Option<CacheEntry<T>> {
        let (removed, total) = {
            let mut slots = rw_write(&self.slots, SOURCE, "remove");
            let removed = slots.remove(key);
            (removed, slots.len())
        };
        gauge!(METRIC_CACHE_ENTRIES).set(total as f64);
        removed.map(|slot| slot.entry)
    }

    pub fn clear(&self) {
        rw_write(&self.slots, SOURCE, "clear").clear();
        gauge!(METRIC_CACHE_ENTRIES).set(0.0);
    }

    /// Evict entries that have had no subscriber for at least `older_than`.
    ///
    /// Entries with a fetch in flight are kept.
    pub fn evict_unobserved(&self, now: Instant, older_than: Duration) -> Vec<QueryKey> {
        let (evicted, total) = {
            let mut slots = rw_write(&self.slots, SOURCE, "evict_unobserved");
            let evicted: Vec<QueryKey> = slots
                .iter()
                .filter(|(_, slot)| {
                    slot.listeners.is_empty()
                        && !slot.entry.is_fetching()
                        && slot
                            .unobserved_since
                            .is_some_and(|since| now.saturating_duration_since(since) >= older_than)
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in &evicted {
                slots.remove(key);
            }
            (evicted, slots.len())
        };

        if !evicted.is_empty() {
            gauge!(METRIC_CACHE_ENTRIES).set(total as f64);
            debug!(target_module = SOURCE, evicted = evicted.len(), "Evicted unobserved entries");
        }
        evicted
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Register `listener` for changes to `key`, creating the entry if absent.
    ///
    /// The listener stays registered until the returned [`Subscription`] is dropped.
    pub fn subscribe(
        self: &Arc<Self>,
        key: &QueryKey,
        listener: impl Fn(&CacheEntry<T>) + Send + Sync + 'static,
    ) -> Subscription<T> {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (created, total) = {
            let mut slots = rw_write(&self.slots, SOURCE, "subscribe");
            let created = !slots.contains_key(key);
            let slot = slots
                .entry(key.clone())
                .or_insert_with(|| Slot::new(key.clone()));
            slot.listeners.push((id, Arc::new(listener)));
            slot.unobserved_since = None;
            (created, slots.len())
        };
        if created {
            gauge!(METRIC_CACHE_ENTRIES).set(total as f64);
        }

        Subscription {
            cache: Arc::downgrade(self),
            key: key.clone(),
            id,
        }
    }

    fn unsubscribe(&self, key: &QueryKey, id: u64) {
        let mut slots = rw_write(&self.slots, SOURCE, "unsubscribe");
        if let Some(slot) = slots.get_mut(key) {
            slot.listeners.retain(|(listener_id, _)| *listener_id != id);
            if slot.listeners.is_empty() {
                slot.unobserved_since = Some(Instant::now());
            }
        }
    }
}

fn notify<T>((entry, listeners): Notification<T>) {
    for listener in listeners {
        listener(&entry);
    }
}

/// Handle for a registered listener. Dropping it unsubscribes.
pub struct Subscription<T> {
    cache: Weak<QueryCache<T>>,
    key: QueryKey,
    id: u64,
}

impl<T> Subscription<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.unsubscribe(&self.key, self.id);
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::cache::entry::QueryStatus;
    use crate::cache::token::TokenIssuer;

    fn key(page: u32) -> QueryKey {
        QueryKey::resource("users").with(page)
    }

    fn recorder() -> (Arc<Mutex<Vec<QueryStatus>>>, impl Fn(&CacheEntry<u32>) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |entry: &CacheEntry<u32>| {
            sink.lock().expect("recorder lock").push(entry.status);
        })
    }

    #[test]
    fn set_creates_entry_and_notifies_subscribers() {
        let cache = Arc::new(QueryCache::<u32>::new());
        let (seen, listener) = recorder();
        let _subscription = cache.subscribe(&key(1), listener);

        cache
            .set(&key(1), EntryPatch::new().status(QueryStatus::Loading))
            .expect("idle -> loading");
        cache
            .set(
                &key(1),
                EntryPatch::new()
                    .status(QueryStatus::Success)
                    .data(Arc::new(3)),
            )
            .expect("loading -> success");

        let entry = cache.get(&key(1)).expect("entry exists");
        assert_eq!(entry.data.as_deref(), Some(&3));
        assert_eq!(
            *seen.lock().expect("recorder lock"),
            vec![QueryStatus::Loading, QueryStatus::Success]
        );
    }

    #[test]
    fn listeners_may_read_the_store() {
        let cache = Arc::new(QueryCache::<u32>::new());
        let reader = Arc::clone(&cache);
        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);
        let _subscription = cache.subscribe(&key(1), move |entry| {
            let stored = reader.get(&entry.key).map(|stored| stored.status);
            *sink.lock().expect("observed lock") = stored;
        });

        cache
            .set(&key(1), EntryPatch::new().status(QueryStatus::Loading))
            .expect("idle -> loading");

        assert_eq!(
            *observed.lock().expect("observed lock"),
            Some(QueryStatus::Loading)
        );
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let cache = QueryCache::<u32>::new();

        let result = cache.set(&key(1), EntryPatch::new().status(QueryStatus::Success));

        assert!(matches!(result, Err(CacheError::InvalidTransition { .. })));
        assert!(cache.get(&key(1)).is_none());
    }

    #[test]
    fn set_if_current_drops_superseded_tokens() {
        let cache = QueryCache::<u32>::new();
        let issuer = TokenIssuer::new();
        let first = issuer.issue();
        let second = issuer.issue();

        cache
            .set(
                &key(1),
                EntryPatch::new()
                    .status(QueryStatus::Loading)
                    .token(second),
            )
            .expect("idle -> loading");

        let stale = cache
            .set_if_current(
                &key(1),
                first,
                EntryPatch::new()
                    .status(QueryStatus::Success)
                    .data(Arc::new(1)),
            )
            .expect("patch is valid");
        let current = cache
            .set_if_current(
                &key(1),
                second,
                EntryPatch::new()
                    .status(QueryStatus::Success)
                    .data(Arc::new(2)),
            )
            .expect("patch is valid");

        assert!(!stale);
        assert!(current);
        assert_eq!(cache.get(&key(1)).and_then(|e| e.data).as_deref(), Some(&2));
    }

    #[test]
    fn set_if_current_does_not_recreate_removed_entries() {
        let cache = QueryCache::<u32>::new();
        let token = TokenIssuer::new().issue();

        let applied = cache
            .set_if_current(&key(1), token, EntryPatch::new().invalidated(true))
            .expect("patch is valid");

        assert!(!applied);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_marks_matching_family_only() {
        let cache = Arc::new(QueryCache::<u32>::new());
        let other = QueryKey::resource("settings");
        for page in 1..=3 {
            cache
                .set(&key(page), EntryPatch::new().status(QueryStatus::Loading))
                .expect("idle -> loading");
        }
        cache
            .set(&other, EntryPatch::new().status(QueryStatus::Loading))
            .expect("idle -> loading");
        let (seen, listener) = recorder();
        let _subscription = cache.subscribe(&key(2), listener);

        let mut invalidated = cache.invalidate(|key| key.is_resource("users"));
        invalidated.sort();

        assert_eq!(invalidated, vec![key(1), key(2), key(3)]);
        assert!(cache.get(&key(2)).is_some_and(|e| e.is_invalidated));
        assert!(cache.get(&other).is_some_and(|e| !e.is_invalidated));
        assert_eq!(seen.lock().expect("recorder lock").len(), 1);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let cache = Arc::new(QueryCache::<u32>::new());
        let (seen, listener) = recorder();

        let subscription = cache.subscribe(&key(1), listener);
        assert_eq!(cache.subscriber_count(&key(1)), 1);
        subscription.unsubscribe();
        assert_eq!(cache.subscriber_count(&key(1)), 0);

        cache
            .set(&key(1), EntryPatch::new().status(QueryStatus::Loading))
            .expect("idle -> loading");
        assert!(seen.lock().expect("recorder lock").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_only_long_unobserved_entries() {
        let cache = Arc::new(QueryCache::<u32>::new());
        let gc_time = Duration::from_secs(60);

        cache
            .set(&key(1), EntryPatch::new().invalidated(true))
            .expect("no status change");
        let _watched = cache.subscribe(&key(2), |_| {});

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.evict_unobserved(Instant::now(), gc_time).is_empty());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.evict_unobserved(Instant::now(), gc_time), vec![key(1)]);
        assert_eq!(cache.keys(), vec![key(2)]);
    }
}
