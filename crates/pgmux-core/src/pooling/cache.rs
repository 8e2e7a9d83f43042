//! In-process query cache keyed by `CacheKey`

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::invalidation::CacheInvalidator;
use super::keys::{CacheKey, KeyPart, PROJECTS};

#[derive(Debug, Clone)]
struct CachedEntry {
    value: Value,
    stored_at: Instant,
}

/// Concurrent map from cache key to the last fetched JSON value.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: DashMap<CacheKey, CachedEntry>,
    max_age: Option<Duration>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries older than `max_age` read as absent
    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_age: Some(max_age),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let entry = self.entries.get(key)?;
        if let Some(max_age) = self.max_age {
            if entry.stored_at.elapsed() > max_age {
                return None;
            }
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: CacheKey, value: Value) {
        self.entries.insert(
            key,
            CachedEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }

    /// Returns whether an entry was removed
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every key under `["projects", project_ref]`
    pub fn invalidate_project(&self, project_ref: &str) -> usize {
        let prefix = [KeyPart::from(PROJECTS), KeyPart::from(project_ref)];
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = !key.starts_with(&prefix);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl CacheInvalidator for QueryCache {
    async fn invalidate(&self, key: &CacheKey) {
        self.remove(key);
    }
}

#[async_trait]
impl<T: CacheInvalidator + ?Sized> CacheInvalidator for std::sync::Arc<T> {
    async fn invalidate(&self, key: &CacheKey) {
        (**self).invalidate(key).await;
    }
}
