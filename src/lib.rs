//! swrcache library
//!
//! A read-through cache with time-to-live, an in-process tier, a persistent
//! tier, and stale-while-revalidate background refresh. The `cli` and `fetch`
//! modules back the `swrcache` binary and are exposed for integration tests.

pub mod cache;
pub mod cli;
pub mod fetch;

pub use cache::{CacheConfig, CacheEntry, SwrCache};
