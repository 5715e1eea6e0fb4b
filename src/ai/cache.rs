//! Response Cache
//!
//! In-memory TTL cache of generation responses keyed by a digest of the
//! request parameters. Entries are never returned past their TTL; expired
//! entries are dropped lazily on access. Nothing is persisted.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::ai::provider::GenerationResponse;
use crate::constants::cache::DEFAULT_TTL_SECS;

#[derive(Debug, Clone)]
struct CacheEntry {
    response: GenerationResponse,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

/// Process-wide response cache shared by all adapters
#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    enabled: bool,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            enabled: true,
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fresh response for `key`, if any
    pub fn get(&self, key: &str) -> Option<GenerationResponse> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_fresh(self.ttl) => return Some(entry.response.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| !entry.is_fresh(self.ttl));
        }
        None
    }

    /// Insert or replace, stamping the current time
    pub fn set(&self, key: String, response: GenerationResponse) {
        if !self.enabled {
            return;
        }
        self.entries.insert(
            key,
            CacheEntry {
                response,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet dropped
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(self.ttl));
        before.saturating_sub(self.entries.len())
    }
}

// =============================================================================
// Key Derivation
// =============================================================================

/// Digest of the request parameters that determine a response
///
/// Fields are length-prefixed so distinct inputs never concatenate to the same
/// bytes. `scope` separates entries made under an overriding credential.
pub fn cache_key(
    prompt: &str,
    model: &str,
    temperature: f32,
    max_tokens: usize,
    scope: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    let temperature = temperature.to_bits().to_le_bytes();
    let max_tokens = (max_tokens as u64).to_le_bytes();

    for field in [
        prompt.as_bytes(),
        model.as_bytes(),
        &temperature[..],
        &max_tokens[..],
    ] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field);
    }

    match scope {
        Some(scope) => {
            hasher.update([1u8]);
            hasher.update(scope.as_bytes());
        }
        None => hasher.update([0u8]),
    }

    format!("{:x}", hasher.finalize())
}

/// Short non-reversible identifier of a credential
pub fn credential_fingerprint(credential: &SecretString) -> String {
    let digest = Sha256::digest(credential.expose_secret().as_bytes());
    format!("{:x}", digest).chars().take(16).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn response(content: &str) -> GenerationResponse {
        GenerationResponse {
            content: content.to_string(),
            model_used: "gpt-4o-mini".to_string(),
            token_count: Some(12),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_set_then_get() {
        let cache = ResponseCache::default();
        cache.set("k".into(), response("hello"));

        let hit = cache.get("k").unwrap();
        assert_eq!(hit.content, "hello");
        assert_eq!(cache.len(), 1);
        assert!(cache.get("other").is_none());
    }

    #[test]
    fn test_expired_entry_is_absent_and_dropped() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.set("k".into(), response("stale"));
        assert_eq!(cache.len(), 1);

        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let cache = ResponseCache::new(Duration::ZERO);
        cache.set("a".into(), response("1"));
        cache.set("b".into(), response("2"));
        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_upsert_and_clear() {
        let cache = ResponseCache::default();
        cache.set("k".into(), response("first"));
        cache.set("k".into(), response("second"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k").unwrap().content, "second");

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = ResponseCache::disabled();
        cache.set("k".into(), response("x"));
        assert!(cache.is_empty());
        assert!(!cache.is_enabled());
    }

    #[test]
    fn test_cache_key_identity_and_sensitivity() {
        let base = cache_key("prompt", "gpt-4o", 0.7, 1000, None);
        assert_eq!(base, cache_key("prompt", "gpt-4o", 0.7, 1000, None));

        assert_ne!(base, cache_key("prompt ", "gpt-4o", 0.7, 1000, None));
        assert_ne!(base, cache_key("prompt", "gpt-4o-mini", 0.7, 1000, None));
        assert_ne!(base, cache_key("prompt", "gpt-4o", 0.2, 1000, None));
        assert_ne!(base, cache_key("prompt", "gpt-4o", 0.7, 1001, None));
        assert_ne!(base, cache_key("prompt", "gpt-4o", 0.7, 1000, Some("abc")));
        assert_ne!(
            cache_key("ab", "c", 0.7, 1, None),
            cache_key("a", "bc", 0.7, 1, None)
        );
    }

    #[test]
    fn test_credential_fingerprint() {
        let a = credential_fingerprint(&SecretString::from("sk-one"));
        let b = credential_fingerprint(&SecretString::from("sk-two"));
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
        assert!(!a.contains("sk-"));
    }
}
