//! In-memory Cache

use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

use super::{CacheError, PersistentCache};

/// Process-local cache with an optional byte quota.
///
/// The quota counts key and value lengths of every stored entry.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<FxHashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryCache {
    /// Unbounded cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache that rejects writes once `quota` bytes are stored.
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::default(),
            quota: Some(quota),
        }
    }

    /// Bytes currently stored.
    pub fn used_bytes(&self) -> usize {
        self.entries()
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }

    fn entries(&self) -> MutexGuard<'_, FxHashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PersistentCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self.entries();

        if let Some(quota) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(key, value)| key.len() + value.len())
                .sum();

            if others + key.len() + value.len() > quota {
                return Err(CacheError::QuotaExceeded);
            }
        }

        entries.insert(key.to_string(), value.to_string());

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries().remove(key);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn set_replaces_previous_value() -> TestResult {
        let cache = MemoryCache::new();

        cache.set("k", "one")?;
        cache.set("k", "two")?;

        assert_eq!(cache.get("k")?, Some("two".to_string()));

        Ok(())
    }

    #[test]
    fn quota_rejects_oversized_writes_and_keeps_old_value() -> TestResult {
        let cache = MemoryCache::with_quota(8);

        cache.set("k", "1234")?;

        let result = cache.set("k", "123456789");

        assert!(
            matches!(result, Err(CacheError::QuotaExceeded)),
            "expected QuotaExceeded, got {result:?}"
        );
        assert_eq!(cache.get("k")?, Some("1234".to_string()));

        Ok(())
    }

    #[test]
    fn replacing_an_entry_frees_its_old_bytes() -> TestResult {
        let cache = MemoryCache::with_quota(8);

        cache.set("k", "1234567")?;
        cache.set("k", "7654321")?;

        assert_eq!(cache.used_bytes(), 8);

        Ok(())
    }

    #[test]
    fn removing_missing_key_is_fine() -> TestResult {
        let cache = MemoryCache::new();

        cache.remove("missing")?;

        assert_eq!(cache.get("missing")?, None);

        Ok(())
    }
}
