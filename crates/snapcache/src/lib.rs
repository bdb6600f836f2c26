//! # snapcache
//!
//! Fixed-capacity LRU cache that readers and writers share without locks.
//!
//! ## Architecture
//! - **Snapshot**: immutable arena-backed recency list + AHash index
//! - **SnapCache**: one atomically swappable `Arc<Snapshot>`; `get`/`set`
//!   derive a new snapshot and publish it with compare-and-swap, rebuilding
//!   from the latest snapshot whenever another thread wins the race
//! - **Keys**: integers, floats and text share one canonical text form
//!
//! ## Example
//! ```
//! use snapcache::SnapCache;
//!
//! let cache = SnapCache::new(2)?;
//! cache.set("a", 1);
//! cache.set("b", 2);
//! assert_eq!(cache.get("a"), Some(1));
//!
//! cache.set("c", 3); // evicts "b"
//! assert_eq!(cache.get("b"), None);
//! assert_eq!(cache.get("c"), Some(3));
//! # Ok::<(), snapcache::Error>(())
//! ```

#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod key;
mod snapshot;
mod stats;

pub use cache::SnapCache;
pub use config::CacheConfig;
pub use error::{Error, Result};
pub use key::{CanonicalKey, Key};
pub use snapshot::{Iter, Snapshot};
pub use stats::CacheStats;
