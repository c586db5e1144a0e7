//! Fire-and-forget operator notifications.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info};

use crate::util::lock::mutex_lock;

const SOURCE: &str = "application::notify";

pub const DEFAULT_TOAST_TTL: Duration = Duration::from_millis(4000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
            NotificationKind::Info => "info",
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, kind: NotificationKind);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub message: String,
    pub kind: NotificationKind,
    pub expires_at: Instant,
}

/// Toasts that dismiss themselves after a fixed time to live.
#[derive(Debug)]
pub struct ToastQueue {
    ttl: Duration,
    next_id: AtomicU64,
    toasts: Mutex<Vec<Toast>>,
}

impl ToastQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            next_id: AtomicU64::new(1),
            toasts: Mutex::new(Vec::new()),
        }
    }

    /// Toasts not yet expired or dismissed, oldest first.
    pub fn active(&self) -> Vec<Toast> {
        let now = Instant::now();
        let mut toasts = mutex_lock(&self.toasts, SOURCE, "active");
        toasts.retain(|toast| toast.expires_at > now);
        toasts.clone()
    }

    pub fn last(&self) -> Option<Toast> {
        self.active().pop()
    }

    /// Remove a toast before it expires. Returns whether it was still shown.
    pub fn dismiss(&self, id: u64) -> bool {
        let mut toasts = mutex_lock(&self.toasts, SOURCE, "dismiss");
        let before = toasts.len();
        toasts.retain(|toast| toast.id != id);
        toasts.len() != before
    }
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(DEFAULT_TOAST_TTL)
    }
}

impl Notifier for ToastQueue {
    fn notify(&self, message: &str, kind: NotificationKind) {
        let toast = Toast {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            message: message.to_string(),
            kind,
            expires_at: Instant::now() + self.ttl,
        };
        mutex_lock(&self.toasts, SOURCE, "notify").push(toast);
    }
}

/// Writes notifications to the log. Used by the command line front end.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, kind: NotificationKind) {
        match kind {
            NotificationKind::Error => error!(target_module = SOURCE, kind = kind.as_str(), "{message}"),
            _ => info!(target_module = SOURCE, kind = kind.as_str(), "{message}"),
        }
    }
}
