//! Roster: the data-fetching core of a user directory admin console.
//!
//! The interesting part lives in [`cache`]: a keyed query cache that serves stale data
//! while revalidating, joins concurrent fetches for the same key, drops superseded
//! results, and is invalidated by mutations. [`application::admin::users_list`] wires it
//! into the Users screen.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;

pub(crate) mod util;
