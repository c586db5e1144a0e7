//! Cache entries and the partial updates applied to them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::error::{CacheError, QueryError};
use super::keys::QueryKey;
use super::token::FetchToken;

/// Lifecycle status of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Idle => "idle",
            QueryStatus::Loading => "loading",
            QueryStatus::Success => "success",
            QueryStatus::Error => "error",
        }
    }

    /// Whether an entry in this status may move to `next`.
    ///
    /// Staying in the same status is always allowed.
    pub fn can_transition_to(self, next: QueryStatus) -> bool {
        use QueryStatus::*;

        self == next
            || matches!(
                (self, next),
                (Idle, Loading) | (Loading, Success) | (Loading, Error) | (Success, Loading)
                    | (Error, Loading)
            )
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached state for one [`QueryKey`].
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub key: QueryKey,
    pub status: QueryStatus,
    /// Last result, kept visible while a refetch runs.
    pub data: Option<Arc<T>>,
    pub error: Option<QueryError>,
    pub fetched_at: Option<Instant>,
    /// `data` belongs to another key and is only shown until this key settles.
    pub is_placeholder: bool,
    pub is_invalidated: bool,
    /// Latest fetch issued for this key.
    pub fetch_token: Option<FetchToken>,
}

// Manual impl: `T` itself need not be `Clone`, data is shared through `Arc`.
impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            is_placeholder: self.is_placeholder,
            is_invalidated: self.is_invalidated,
            fetch_token: self.fetch_token,
        }
    }
}

impl<T> CacheEntry<T> {
    pub fn new(key: QueryKey) -> Self {
        Self {
            key,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            fetched_at: None,
            is_placeholder: false,
            is_invalidated: false,
            fetch_token: None,
        }
    }

    /// A successful, non-invalidated entry fetched less than `stale_time` ago.
    pub fn is_fresh(&self, now: Instant, stale_time: Duration) -> bool {
        if self.status != QueryStatus::Success || self.is_invalidated || self.is_placeholder {
            return false;
        }
        self.fetched_at
            .is_some_and(|at| now.saturating_duration_since(at) < stale_time)
    }

    /// Data fetched for this key, as opposed to a placeholder.
    pub fn has_own_data(&self) -> bool {
        self.data.is_some() && !self.is_placeholder
    }

    pub fn is_fetching(&self) -> bool {
        self.status == QueryStatus::Loading
    }
}

/// A partial update merged into a [`CacheEntry`].
///
/// Unset fields leave the entry untouched.
#[derive(Debug)]
pub struct EntryPatch<T> {
    status: Option<QueryStatus>,
    data: Option<Arc<T>>,
    clear_data: bool,
    discard_placeholder: bool,
    error: Option<QueryError>,
    clear_error: bool,
    fetched_at: Option<Instant>,
    placeholder: Option<bool>,
    invalidated: Option<bool>,
    token: Option<FetchToken>,
}

impl<T> Default for EntryPatch<T> {
    fn default() -> Self {
        Self {
            status: None,
            data: None,
            clear_data: false,
            discard_placeholder: false,
            error: None,
            clear_error: false,
            fetched_at: None,
            placeholder: None,
            invalidated: None,
            token: None,
        }
    }
}

impl<T> EntryPatch<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: QueryStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn data(mut self, data: Arc<T>) -> Self {
        self.data = Some(data);
        self.clear_data = false;
        self
    }

    pub fn clear_data(mut self) -> Self {
        self.data = None;
        self.clear_data = true;
        self
    }

    /// Drop `data` only if it is a placeholder.
    pub fn discard_placeholder(mut self) -> Self {
        self.discard_placeholder = true;
        self
    }

    pub fn error(mut self, error: QueryError) -> Self {
        self.error = Some(error);
        self.clear_error = false;
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = None;
        self.clear_error = true;
        self
    }

    pub fn fetched_at(mut self, at: Instant) -> Self {
        self.fetched_at = Some(at);
        self
    }

    pub fn placeholder(mut self, placeholder: bool) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    pub fn invalidated(mut self, invalidated: bool) -> Self {
        self.invalidated = Some(invalidated);
        self
    }

    pub fn token(mut self, token: FetchToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Validate the status transition, then merge into `entry`.
    ///
    /// On error the entry is left unchanged.
    pub(crate) fn apply(self, entry: &mut CacheEntry<T>) -> Result<(), CacheError> {
        if let Some(next) = self.status {
            if !entry.status.can_transition_to(next) {
                return Err(CacheError::InvalidTransition {
                    key: entry.key.clone(),
                    from: entry.status,
                    to: next,
                });
            }
        }

        // Placeholder handling first, so an explicit `placeholder` below wins.
        if self.discard_placeholder && entry.is_placeholder {
            entry.data = None;
            entry.is_placeholder = false;
        }
        if let Some(status) = self.status {
            entry.status = status;
        }
        if self.clear_data {
            entry.data = None;
        }
        if let Some(data) = self.data {
            entry.data = Some(data);
        }
        if self.clear_error {
            entry.error = None;
        }
        if let Some(error) = self.error {
            entry.error = Some(error);
        }
        if let Some(at) = self.fetched_at {
            entry.fetched_at = Some(at);
        }
        if let Some(placeholder) = self.placeholder {
            entry.is_placeholder = placeholder;
        }
        if let Some(invalidated) = self.invalidated {
            entry.is_invalidated = invalidated;
        }
        if let Some(token) = self.token {
            entry.fetch_token = Some(token);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> CacheEntry<u32> {
        CacheEntry::new(QueryKey::resource("users").with(1_u32))
    }

    #[test]
    fn allowed_transitions() {
        use QueryStatus::*;

        assert!(Idle.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Success));
        assert!(Loading.can_transition_to(Error));
        assert!(Success.can_transition_to(Loading));
        assert!(Error.can_transition_to(Loading));
        assert!(Success.can_transition_to(Success));

        assert!(!Idle.can_transition_to(Success));
        assert!(!Idle.can_transition_to(Error));
        assert!(!Success.can_transition_to(Error));
        assert!(!Error.can_transition_to(Success));
        assert!(!Loading.can_transition_to(Idle));
    }

    #[test]
    fn rejected_transition_leaves_entry_untouched() {
        let mut entry = entry();

        let result = EntryPatch::new()
            .status(QueryStatus::Success)
            .data(Arc::new(7))
            .apply(&mut entry);

        assert!(matches!(
            result,
            Err(CacheError::InvalidTransition {
                from: QueryStatus::Idle,
                to: QueryStatus::Success,
                ..
            })
        ));
        assert_eq!(entry.status, QueryStatus::Idle);
        assert!(entry.data.is_none());
    }

    #[test]
    fn discard_placeholder_keeps_own_data() {
        let mut own = entry();
        own.data = Some(Arc::new(1));
        own.status = QueryStatus::Loading;

        EntryPatch::new()
            .status(QueryStatus::Error)
            .discard_placeholder()
            .apply(&mut own)
            .expect("loading -> error is allowed");
        assert_eq!(own.data.as_deref(), Some(&1));

        let mut borrowed = entry();
        borrowed.data = Some(Arc::new(2));
        borrowed.is_placeholder = true;
        borrowed.status = QueryStatus::Loading;

        EntryPatch::new()
            .status(QueryStatus::Error)
            .discard_placeholder()
            .apply(&mut borrowed)
            .expect("loading -> error is allowed");
        assert!(borrowed.data.is_none());
        assert!(!borrowed.is_placeholder);
    }

    #[test]
    fn freshness_requires_success_and_age() {
        let now = Instant::now();
        let stale_time = Duration::from_secs(60);
        let mut entry = entry();
        assert!(!entry.is_fresh(now, stale_time));

        entry.status = QueryStatus::Success;
        entry.fetched_at = Some(now);
        assert!(entry.is_fresh(now + Duration::from_secs(59), stale_time));
        assert!(!entry.is_fresh(now + Duration::from_secs(60), stale_time));

        entry.is_invalidated = true;
        assert!(!entry.is_fresh(now, stale_time));
    }
}
