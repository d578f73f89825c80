//! Result cache for parsed model output.

pub mod result_cache;
pub mod store;

pub use result_cache::{CacheEntry, DEFAULT_NAMESPACE, DEFAULT_TTL, ResultCache};
pub use store::{CacheStore, MemoryStore};
