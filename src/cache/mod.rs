//! Two-tier stale-while-revalidate cache
//!
//! Values live in an in-process map and in a persistent string store. Reads
//! prefer the in-process tier, fall back to a fresh persisted entry (served
//! immediately while a background task refreshes it), and only await the
//! caller's loader when neither tier has usable data.

mod clock;
mod entry;
mod entry_store;
mod reader;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use entry_store::{EntryStore, DEFAULT_NAMESPACE};
pub use reader::{CacheConfig, CacheStats, SwrCache};
pub use store::{FileStore, MemoryStore, PersistentStore, StoreError};
