//! Tessera block cache
//!
//! Rendered block output is cached per request shape with
//! stale-while-revalidate semantics: expired entries are still served while
//! a single background refresh rebuilds them.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! refresh_lease_seconds = 60
//! ```

mod clock;
mod config;
mod keys;
pub(crate) mod lock;
mod manager;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, DEFAULT_REFRESH_LEASE_SECS};
pub use keys::{BlockCacheKey, KeyShape, digest};
pub use manager::{CacheLookup, CacheManager, CacheSetError};
pub use store::{CacheEntry, CacheLink, DocumentStore, EntryStatus, MemoryDocumentStore, StoreError};
