//! Trailing-edge debouncing of rapidly changing values.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::trace;

use crate::util::lock::mutex_lock;

const SOURCE: &str = "cache::debounce";

struct Pending<V> {
    value: V,
    handle: JoinHandle<()>,
    /// Set by the timer task right before it commits.
    fired: Arc<AtomicBool>,
}

/// Delays propagation of a value until it has stopped changing for `delay`.
///
/// At most one timer is pending per instance: each [`push`](Self::push) aborts the
/// previous timer and starts a new one. Subscribers observe only committed values.
/// Dropping the debouncer aborts the pending timer, so nothing commits afterwards.
/// Every commit wakes subscribers, even when the value equals the previous one.
///
/// `push` spawns onto the current Tokio runtime and must be called from within one.
pub struct Debouncer<V> {
    delay: Duration,
    committed: Arc<watch::Sender<V>>,
    pending: Mutex<Option<Pending<V>>>,
}

impl<V> Debouncer<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(initial: V, delay: Duration) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            delay,
            committed: Arc::new(sender),
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `value` to be committed once `delay` passes without another push.
    pub fn push(&self, value: V) {
        let mut pending = mutex_lock(&self.pending, SOURCE, "push");
        if let Some(previous) = pending.take() {
            previous.handle.abort();
        }

        let deadline = Instant::now() + self.delay;
        let sender = Arc::clone(&self.committed);
        let scheduled = value.clone();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            flag.store(true, Ordering::SeqCst);
            sender.send_replace(scheduled);
        });
        trace!(
            target_module = SOURCE,
            delay_ms = self.delay.as_millis() as u64,
            "Debounce timer armed"
        );

        *pending = Some(Pending {
            value,
            handle,
            fired,
        });
    }

    /// The last committed value.
    pub fn committed(&self) -> V {
        self.committed.borrow().clone()
    }

    /// Receiver that wakes on every commit.
    pub fn subscribe(&self) -> watch::Receiver<V> {
        self.committed.subscribe()
    }

    /// Whether a pushed value is still waiting for its quiet period.
    pub fn is_pending(&self) -> bool {
        mutex_lock(&self.pending, SOURCE, "is_pending")
            .as_ref()
            .is_some_and(|pending| !pending.fired.load(Ordering::SeqCst))
    }

    /// Commit the pending value now, skipping the rest of its quiet period.
    pub fn flush(&self) {
        let pending = mutex_lock(&self.pending, SOURCE, "flush").take();
        if let Some(Pending { value, handle, .. }) = pending {
            handle.abort();
            self.committed.send_replace(value);
        }
    }
}

impl<V> Drop for Debouncer<V> {
    fn drop(&mut self) {
        let pending = match self.pending.get_mut() {
            Ok(pending) => pending.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(pending) = pending {
            pending.handle.abort();
        }
    }
}
