use std::error::Error as StdError;

use thiserror::Error;

use super::entry::QueryStatus;
use super::keys::QueryKey;

/// A fetch failure captured into query state.
///
/// Cheap to clone so every subscriber can hold the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct QueryError {
    message: String,
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Flatten an error and its source chain into one message.
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut message = error.to_string();
        let mut current = error.source();
        while let Some(inner) = current {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            current = inner.source();
        }
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid status transition for {key}: {from} -> {to}")]
    InvalidTransition {
        key: QueryKey,
        from: QueryStatus,
        to: QueryStatus,
    },
}
