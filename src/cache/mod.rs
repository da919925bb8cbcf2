//! Cache module - small typed caches built on Moka.
//!
//! Used for things that are read far more often than they change:
//! - staff authorization lookups (users.json)
//! - per-user collection lists between page flips
//!
//! ```rust
//! let lists: TypedCache<u64, Arc<Vec<Collection>>> =
//!     TypedCache::new("collection_lists", CacheConfig::browse_session());
//! lists.insert(user_id, Arc::new(collections));
//! ```

mod config;
mod typed;

pub use config::CacheConfig;
pub use typed::TypedCache;
