//! Mutation-driven invalidation of pooling cache keys

use async_trait::async_trait;
use tracing::debug;

use super::keys::{self, CacheKey, PoolingBackend};
use crate::event_bus::EventSender;
use crate::DomainEvent;

/// A change to pooling state, naming what the caller knows about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolingMutation {
    /// Pool size, mode or other configuration changed
    Configuration { backend: PoolingBackend },
    /// Live statistics or health moved
    Monitoring { backend: PoolingBackend },
    /// A pooler container started, stopped or restarted
    ContainerStatus { container_name: Option<String> },
}

impl PoolingMutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Monitoring { .. } => "monitoring",
            Self::ContainerStatus { .. } => "container_status",
        }
    }

    /// Every key whose cached value this mutation may have made stale
    pub fn invalidation_keys(&self, project_ref: &str) -> Vec<CacheKey> {
        match self {
            Self::Configuration { backend } => {
                configuration_invalidation_keys(project_ref, *backend)
            }
            Self::Monitoring { backend } => monitoring_invalidation_keys(project_ref, *backend),
            Self::ContainerStatus { container_name } => {
                container_invalidation_keys(project_ref, container_name.as_deref())
            }
        }
    }
}

/// Everything derived from pooling configuration: the unified views, the
/// legacy configuration key and every view of the written backend. Keys of
/// the other backend are left alone.
///
/// Any new cached pooling view must be added here as well.
pub fn configuration_invalidation_keys(
    project_ref: &str,
    backend: PoolingBackend,
) -> Vec<CacheKey> {
    let mut out = keys::unified(project_ref).all();
    out.push(keys::legacy_configuration(project_ref));
    out.extend(keys::service_specific(project_ref, backend).all());
    dedup(out)
}

/// Statistics and health only, for lightweight refreshes. Never includes a
/// configuration key.
pub fn monitoring_invalidation_keys(project_ref: &str, backend: PoolingBackend) -> Vec<CacheKey> {
    let unified = keys::unified(project_ref);
    let mut out = vec![unified.statistics, unified.health, unified.unified];
    out.extend(keys::service_specific(project_ref, backend).monitoring());
    dedup(out)
}

/// Container keys, plus health wherever container liveness is the health
/// signal. An unnamed container is treated as a pooler container; a named
/// container that belongs to neither backend never touches health.
pub fn container_invalidation_keys(
    project_ref: &str,
    container_name: Option<&str>,
) -> Vec<CacheKey> {
    let mut out = vec![keys::containers(project_ref)];
    let backend = container_name
        .map(backend_for_container)
        .unwrap_or(Some(PoolingBackend::Supavisor));
    let affects_health = backend.is_some_and(|b| b.ties_health_to_containers());
    if affects_health {
        out.push(keys::health(project_ref, None));
        out.push(keys::health(project_ref, Some(PoolingBackend::Supavisor)));
    }
    dedup(out)
}

/// Which backend a container belongs to, judged from its name
pub fn backend_for_container(container_name: &str) -> Option<PoolingBackend> {
    let name = container_name.to_ascii_lowercase();
    if name.contains("pgbouncer") {
        Some(PoolingBackend::PgBouncer)
    } else if name.contains("supavisor") || name.contains("pooler") {
        Some(PoolingBackend::Supavisor)
    } else {
        None
    }
}

fn dedup(keys: Vec<CacheKey>) -> Vec<CacheKey> {
    let mut out: Vec<CacheKey> = Vec::with_capacity(keys.len());
    for key in keys {
        if !out.contains(&key) {
            out.push(key);
        }
    }
    out
}

/// Anything that can drop cached values by key
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, key: &CacheKey);
}

/// Extra Supavisor views included in a full refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationOptions {
    pub include_recommendations: bool,
    pub include_containers: bool,
}

impl Default for InvalidationOptions {
    fn default() -> Self {
        Self {
            include_recommendations: true,
            include_containers: true,
        }
    }
}

/// Applies pooling invalidation closures to a cache
pub struct PoolingCacheInvalidation<C: CacheInvalidator> {
    cache: C,
    events: EventSender,
}

impl<C: CacheInvalidator> PoolingCacheInvalidation<C> {
    pub fn new(cache: C) -> Self {
        Self {
            cache,
            events: EventSender::detached(),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Invalidate the closure of one mutation. Returns the keys dropped.
    pub async fn invalidate_mutation(
        &self,
        project_ref: &str,
        mutation: &PoolingMutation,
    ) -> Vec<CacheKey> {
        let keys = mutation.invalidation_keys(project_ref);
        self.apply(project_ref, mutation.kind(), &keys).await;
        keys
    }

    pub async fn invalidate_configuration(
        &self,
        project_ref: &str,
        backend: PoolingBackend,
    ) -> Vec<CacheKey> {
        self.invalidate_mutation(project_ref, &PoolingMutation::Configuration { backend })
            .await
    }

    pub async fn invalidate_monitoring(
        &self,
        project_ref: &str,
        backend: PoolingBackend,
    ) -> Vec<CacheKey> {
        self.invalidate_mutation(project_ref, &PoolingMutation::Monitoring { backend })
            .await
    }

    pub async fn invalidate_container_status(
        &self,
        project_ref: &str,
        container_name: Option<&str>,
    ) -> Vec<CacheKey> {
        let mutation = PoolingMutation::ContainerStatus {
            container_name: container_name.map(str::to_string),
        };
        self.invalidate_mutation(project_ref, &mutation).await
    }

    /// Unified keys, the legacy key and the named backend's views. Supavisor
    /// recommendations and containers are opt-out.
    pub async fn invalidate_all(
        &self,
        project_ref: &str,
        backend: PoolingBackend,
        options: InvalidationOptions,
    ) -> Vec<CacheKey> {
        let mut out = keys::unified(project_ref).all();
        out.push(keys::legacy_configuration(project_ref));
        match keys::service_specific(project_ref, backend) {
            keys::ServiceKeys::PgBouncer { config, status } => {
                out.push(config);
                out.push(status);
            }
            keys::ServiceKeys::Supavisor {
                config,
                stats,
                health,
                recommendations,
                containers,
            } => {
                out.extend([config, stats, health]);
                if options.include_recommendations {
                    out.push(recommendations);
                }
                if options.include_containers {
                    out.push(containers);
                }
            }
        }
        let out = dedup(out);
        self.apply(project_ref, "all", &out).await;
        out
    }

    async fn apply(&self, project_ref: &str, kind: &str, keys: &[CacheKey]) {
        for key in keys {
            self.cache.invalidate(key).await;
        }
        debug!(
            project_ref = %project_ref,
            mutation = kind,
            keys = keys.len(),
            "[PoolingCache] Invalidated keys"
        );
        self.events.emit(DomainEvent::PoolingCacheInvalidated {
            project_ref: project_ref.to_string(),
            mutation: kind.to_string(),
            keys: keys.len(),
        });
    }
}
