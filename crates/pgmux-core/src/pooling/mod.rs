//! Connection-pooling cache keys and their invalidation rules

mod cache;
mod invalidation;
pub mod keys;

pub use cache::QueryCache;
pub use invalidation::{
    backend_for_container, configuration_invalidation_keys, container_invalidation_keys,
    monitoring_invalidation_keys, CacheInvalidator, InvalidationOptions, PoolingCacheInvalidation,
    PoolingMutation,
};
pub use keys::{
    extract_project_ref, is_pooling_key, CacheKey, KeyPart, PoolingBackend, ServiceKeys,
    UnifiedKeys,
};
