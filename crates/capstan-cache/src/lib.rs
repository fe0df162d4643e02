//! Token caching for Capstan.
//!
//! Provides [`TokenCache`], an in-memory TTL cache specialized in storing
//! short-lived credentials, with at-most-one-fetch-per-key semantics for
//! concurrent callers.

mod token_cache;

pub use token_cache::{Expiring, TokenCache, TokenCacheConfig};
