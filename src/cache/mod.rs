//! Client-side query cache.
//!
//! - [`QueryCache`]: keyed entries with synchronous change notification
//! - [`QueryClient`] / [`QueryObserver`]: freshness checks, fetch deduplication,
//!   supersession of stale results, retries and invalidation
//! - [`Mutation`]: write operations with status and settlement hooks
//! - [`Debouncer`]: trailing-edge debouncing of input values
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! stale_time_ms = 300000
//! gc_time_ms = 300000
//! retry = 1
//! retry_delay_ms = 250
//! ```

mod config;
mod debounce;
mod entry;
mod error;
mod keys;
mod mutation;
mod query;
mod store;
mod token;

pub use config::CacheConfig;
pub use debounce::Debouncer;
pub use entry::{CacheEntry, EntryPatch, QueryStatus};
pub use error::{CacheError, QueryError};
pub use keys::{KeyPart, QueryKey, resource_family};
pub use mutation::{Mutation, MutationStatus};
pub use query::{QueryClient, QueryFn, QueryObserver, QueryOptions, QueryState, query_fn};
pub use store::{Listener, QueryCache, Subscription};
pub use token::{FetchToken, TokenIssuer};
