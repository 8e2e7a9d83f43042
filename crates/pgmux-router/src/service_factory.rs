//! Service Factory - wires the router components together
//!
//! The daemon and the integration tests build their collaborators
//! (repository, driver, service clients, admin, cache) and hand them over
//! here; everything downstream is constructed the same way for both.

use std::sync::Arc;

use pgmux_core::pooling::{CacheInvalidator, PoolingCacheInvalidation};
use pgmux_core::{AuthFailureLog, CredentialResolver, EventSender, ProjectRepository, Settings};

use crate::lifecycle::{DatabaseAdmin, LifecycleSettings, ProjectLifecycle, SharedInvalidation};
use crate::pool::{ConnectionFactory, DatabaseEndpoint, PoolRegistry};
use crate::services::{ServiceClient, ServiceConfigManager};

/// Externally provided collaborators
pub struct RouterDependencies {
    pub projects: Arc<dyn ProjectRepository>,
    pub connection_factory: Arc<dyn ConnectionFactory>,
    pub service_clients: Vec<Arc<dyn ServiceClient>>,
    pub admin: Arc<dyn DatabaseAdmin>,
    pub cache: Arc<dyn CacheInvalidator>,
}

/// Bundle of all router services
#[derive(Clone)]
pub struct RouterServices {
    pub registry: Arc<PoolRegistry>,
    pub service_manager: Arc<ServiceConfigManager>,
    pub failures: Arc<AuthFailureLog>,
    pub invalidation: SharedInvalidation,
    pub lifecycle: Arc<ProjectLifecycle>,
}

impl RouterServices {
    /// Drain every pool
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }

    /// Drop in-memory configuration state
    pub fn reset(&self) {
        self.service_manager.reset();
    }
}

pub struct ServiceFactory;

impl ServiceFactory {
    pub fn create_router_services(
        deps: RouterDependencies,
        settings: &Settings,
        events: EventSender,
    ) -> RouterServices {
        let resolver = CredentialResolver::new(settings.default_credentials.clone());
        let failures = Arc::new(AuthFailureLog::new(settings.auth_failure_log_capacity));

        let registry = Arc::new(
            PoolRegistry::new(deps.connection_factory, settings.pool.clone())
                .with_events(events.clone()),
        );

        let service_manager = Arc::new(
            ServiceConfigManager::new(
                Arc::clone(&deps.projects),
                resolver.clone(),
                deps.service_clients,
                Arc::clone(&failures),
            )
            .with_events(events.clone()),
        );

        let invalidation: SharedInvalidation =
            Arc::new(PoolingCacheInvalidation::new(deps.cache).with_events(events.clone()));

        let lifecycle = Arc::new(
            ProjectLifecycle::new(
                deps.projects,
                Arc::clone(&registry),
                Arc::clone(&service_manager),
                deps.admin,
                Arc::clone(&invalidation),
                resolver,
                LifecycleSettings {
                    endpoint: DatabaseEndpoint::from_settings(settings),
                    data_path: settings.data_path.clone(),
                    pooling_backend: settings.pooling_backend,
                },
            )
            .with_events(events),
        );

        RouterServices {
            registry,
            service_manager,
            failures,
            invalidation,
            lifecycle,
        }
    }
}
