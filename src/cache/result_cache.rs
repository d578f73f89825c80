//! Content-addressed memoization of parsed model output.
//!
//! Cache key is a SHA-256 digest of `(primary text, context)`, where the
//! context is serialized as canonical JSON (object keys sorted). Values are
//! [`CacheEntry`] records carrying their own expiry so a stale payload is
//! never returned, even from a store that does not expire keys.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::CacheError;

use super::store::CacheStore;

/// Namespace prefix for triage assessment keys.
pub const DEFAULT_NAMESPACE: &str = "ai_triage:";

/// Default TTL (1 hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// A cached payload and its validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: Value,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(payload: Value, ttl: Duration) -> Self {
        let stored_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        Self {
            payload,
            stored_at,
            expires_at: stored_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result cache over any [`CacheStore`].
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    namespace: String,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Derive the cache key for `(text, context)`.
    ///
    /// Uses length-prefixed encoding so `("a:b", "c")` and `("a", "b:c")`
    /// never collide. Equal contexts always serialize identically because
    /// `serde_json::Map` keeps keys sorted.
    pub fn key(&self, text: &str, context: &Value) -> String {
        let context_json = context.to_string();
        let mut hasher = Sha256::new();
        hasher.update((text.len() as u64).to_le_bytes());
        hasher.update(text.as_bytes());
        hasher.update((context_json.len() as u64).to_le_bytes());
        hasher.update(context_json.as_bytes());
        format!("{}{:x}", self.namespace, hasher.finalize())
    }

    /// Look up a payload. Never fails: backend errors, corrupt entries, and
    /// expired entries are all misses. Corrupt and expired entries are
    /// deleted.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, "Cache lookup failed, treating as miss: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if !entry.is_expired_at(Utc::now()) => {
                debug!(key, "Cache hit");
                Some(entry.payload)
            }
            Ok(_) => {
                debug!(key, "Cache entry expired, removing");
                self.evict(key).await;
                None
            }
            Err(e) => {
                warn!(key, "Cache entry is corrupt, removing: {}", e);
                self.evict(key).await;
                None
            }
        }
    }

    /// Store a payload under `key` for the configured TTL, replacing any
    /// existing entry.
    pub async fn put(&self, key: &str, payload: &Value) -> Result<(), CacheError> {
        let entry = CacheEntry::new(payload.clone(), self.ttl);
        let serialized = serde_json::to_string(&entry).map_err(CacheError::Serialize)?;
        self.store.set_ex(key, serialized, self.ttl).await
    }

    /// Remove `key`. Backend failures are logged, not returned.
    pub async fn evict(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key, "Failed to evict cache entry: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    fn cache_with_store() -> (ResultCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ResultCache::new(store.clone(), DEFAULT_TTL), store)
    }

    #[test]
    fn test_key_is_deterministic_and_fixed_length() {
        let (cache, _) = cache_with_store();
        let a = cache.key("sore throat", &json!({"age": 40, "name": "Ann"}));
        let b = cache.key("sore throat", &json!({"name": "Ann", "age": 40}));
        assert_eq!(a, b);
        assert!(a.starts_with(DEFAULT_NAMESPACE));
        assert_eq!(a.len(), DEFAULT_NAMESPACE.len() + 64);
    }

    #[test]
    fn test_key_depends_on_context() {
        let (cache, _) = cache_with_store();
        let a = cache.key("sore throat", &json!({"age": 40}));
        let b = cache.key("sore throat", &json!({"age": 41}));
        let c = cache.key("sore throat", &json!({}));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_key_resists_separator_collisions() {
        let (cache, _) = cache_with_store();
        assert_ne!(
            cache.key("a::{}", &json!({})),
            cache.key("a", &json!("{}::{}"))
        );
    }

    #[test]
    fn test_custom_namespace() {
        let (cache, _) = cache_with_store();
        let cache = cache.with_namespace("summary:");
        assert!(cache.key("x", &Value::Null).starts_with("summary:"));
    }

    #[tokio::test]
    async fn test_put_then_get_returns_identical_payload() {
        let (cache, _) = cache_with_store();
        let payload = json!({
            "summary": "Three days of ear pain",
            "urgency_level": 2,
            "urgency_label": "low",
            "recommended_action": "routine appointment",
            "notes": null
        });
        let key = cache.key("ear pain", &json!({}));

        cache.put(&key, &payload).await.unwrap();
        assert_eq!(cache.get(&key).await, Some(payload));
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_entry() {
        let (cache, _) = cache_with_store();
        cache.put("k", &json!({"v": 1})).await.unwrap();
        cache.put("k", &json!({"v": 2})).await.unwrap();
        assert_eq!(cache.get("k").await, Some(json!({"v": 2})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_ttl_is_a_miss() {
        let (cache, store) = cache_with_store();
        cache.put("k", &json!({"v": 1})).await.unwrap();

        tokio::time::advance(DEFAULT_TTL + Duration::from_secs(1)).await;
        assert_eq!(cache.get("k").await, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_stale_entry_is_never_returned() {
        // The store still holds the key, but the entry's own expiry has passed.
        let (cache, store) = cache_with_store();
        let stale = CacheEntry {
            payload: json!({"v": 1}),
            stored_at: Utc::now() - chrono::Duration::hours(2),
            expires_at: Utc::now() - chrono::Duration::hours(1),
        };
        store
            .set_ex("k", serde_json::to_string(&stale).unwrap(), DEFAULT_TTL)
            .await
            .unwrap();

        assert_eq!(cache.get("k").await, None);
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_evicted_and_missed() {
        let (cache, store) = cache_with_store();
        store
            .set_ex("k", "{not json".to_string(), DEFAULT_TTL)
            .await
            .unwrap();

        assert_eq!(cache.get("k").await, None);
        assert!(store.get("k").await.unwrap().is_none());
    }

    struct FailingStore;

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }

        async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_backend_failure_fails_open_on_get() {
        let cache = ResultCache::new(Arc::new(FailingStore), DEFAULT_TTL);
        assert_eq!(cache.get("k").await, None);
        assert!(matches!(
            cache.put("k", &json!(1)).await,
            Err(CacheError::Backend(_))
        ));
    }

    #[test]
    fn test_entry_expiry_window() {
        let entry = CacheEntry::new(json!(1), Duration::from_secs(60));
        assert!(!entry.is_expired_at(entry.stored_at));
        assert!(entry.is_expired_at(entry.stored_at + chrono::Duration::seconds(60)));
    }
}
