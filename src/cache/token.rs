//! Fetch tokens.
//!
//! Every fetch a [`QueryClient`](super::QueryClient) issues gets a token from a
//! monotonic counter, and the cache entry remembers the latest token issued for its key.
//! A completion that carries any other token was superseded and is dropped, which makes
//! the entry reflect the most recently *issued* fetch rather than the last to finish.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one issued fetch. Later tokens compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchToken(u64);

impl FetchToken {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FetchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out fetch tokens in issuance order.
#[derive(Debug)]
pub struct TokenIssuer {
    counter: AtomicU64,
}

impl TokenIssuer {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Allocate the next token.
    pub fn issue(&self) -> FetchToken {
        FetchToken(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// The most recently issued token, if any.
    pub fn last_issued(&self) -> Option<FetchToken> {
        match self.counter.load(Ordering::SeqCst) {
            0 => None,
            value => Some(FetchToken(value)),
        }
    }
}

impl Default for TokenIssuer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn tokens_are_monotonic() {
        let issuer = TokenIssuer::new();
        assert_eq!(issuer.last_issued(), None);

        let first = issuer.issue();
        let second = issuer.issue();
        let third = issuer.issue();

        assert!(first < second);
        assert!(second < third);
        assert_eq!(issuer.last_issued(), Some(third));
    }

    #[test]
    fn tokens_are_unique_across_threads() {
        let issuer = Arc::new(TokenIssuer::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let issuer = Arc::clone(&issuer);
                thread::spawn(move || (0..100).map(|_| issuer.issue()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for token in handle.join().expect("issuer thread should not panic") {
                assert!(seen.insert(token), "duplicate token {token}");
            }
        }
        assert_eq!(seen.len(), 400);
    }
}
