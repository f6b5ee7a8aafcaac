//! Query cache for backend reads.
//!
//! Each [`QueryKey`] maps to one [`CacheEntry`] with loading/error/success
//! state. Concurrent subscriptions share one outstanding fetch, invalidation
//! keeps data visible while a refetch runs, and results from superseded
//! fetches are discarded.
//!
//! ```toml
//! [cache]
//! stale_after_ms = 0
//! gc_grace_ms = 300000
//! gc_interval_ms = 60000
//! ```

mod config;
mod entry;
mod keys;
pub(crate) mod lock;
mod store;

pub use config::CacheConfig;
pub use entry::{CacheEntry, QueryError, QueryState, QueryStatus};
pub use keys::{KeyPart, QueryKey};
pub use store::{Fetcher, Listener, QueryCache, Subscription};
