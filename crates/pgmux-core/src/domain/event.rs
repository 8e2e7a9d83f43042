//! Domain Events - project lifecycle and configuration changes
//!
//! Emitted by the pool registry, the service configuration manager and the
//! lifecycle sagas. Consumers (audit log, cache refreshers, the dashboard's
//! push channel) subscribe through the `EventBus`.
//!
//! Events serialize with a `type` field containing the snake_case variant name:
//! ```json
//! { "type": "project_registered", "project_ref": "abc", "read_only": false }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ServiceName;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    // ════════════════════════════════════════════════════════════════════════
    // CONNECTION POOLS
    // ════════════════════════════════════════════════════════════════════════
    /// A pool was created for a project
    ProjectRegistered { project_ref: String, read_only: bool },

    /// A project's pools were drained and closed
    ProjectUnregistered {
        project_ref: String,
        /// Connections that had to be force-closed after the drain timeout
        forced_closures: usize,
    },

    // ════════════════════════════════════════════════════════════════════════
    // SERVICE CONFIGURATION
    // ════════════════════════════════════════════════════════════════════════
    /// A service accepted its configuration
    ServiceConfigured {
        project_ref: String,
        service: ServiceName,
    },

    /// A service rejected its configuration
    ServiceConfigurationFailed {
        project_ref: String,
        service: ServiceName,
        error: String,
    },

    /// A project was configured with the default admin credentials
    FallbackCredentialsUsed { project_ref: String },

    // ════════════════════════════════════════════════════════════════════════
    // PROJECT LIFECYCLE
    // ════════════════════════════════════════════════════════════════════════
    /// Schemas were created in a project database
    ProjectInitialized {
        project_ref: String,
        schemas: Vec<String>,
    },

    /// A project finished provisioning
    ProjectCreated { project_ref: String },

    /// The deletion saga removed a project record
    ProjectDeleted {
        project_ref: String,
        /// Steps that failed but were skipped over
        failed_steps: Vec<String>,
    },

    // ════════════════════════════════════════════════════════════════════════
    // CACHES
    // ════════════════════════════════════════════════════════════════════════
    /// Pooling cache keys were invalidated after a mutation
    PoolingCacheInvalidated {
        project_ref: String,
        mutation: String,
        keys: usize,
    },
}

impl DomainEvent {
    /// Get the event type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ProjectRegistered { .. } => "project_registered",
            Self::ProjectUnregistered { .. } => "project_unregistered",
            Self::ServiceConfigured { .. } => "service_configured",
            Self::ServiceConfigurationFailed { .. } => "service_configuration_failed",
            Self::FallbackCredentialsUsed { .. } => "fallback_credentials_used",
            Self::ProjectInitialized { .. } => "project_initialized",
            Self::ProjectCreated { .. } => "project_created",
            Self::ProjectDeleted { .. } => "project_deleted",
            Self::PoolingCacheInvalidated { .. } => "pooling_cache_invalidated",
        }
    }

    /// Every event is scoped to exactly one project
    pub fn project_ref(&self) -> &str {
        match self {
            Self::ProjectRegistered { project_ref, .. }
            | Self::ProjectUnregistered { project_ref, .. }
            | Self::ServiceConfigured { project_ref, .. }
            | Self::ServiceConfigurationFailed { project_ref, .. }
            | Self::FallbackCredentialsUsed { project_ref }
            | Self::ProjectInitialized { project_ref, .. }
            | Self::ProjectCreated { project_ref }
            | Self::ProjectDeleted { project_ref, .. }
            | Self::PoolingCacheInvalidated { project_ref, .. } => project_ref,
        }
    }
}

/// Event with emission metadata, for persistence and audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEventEnvelope {
    pub emitted_at: DateTime<Utc>,
    pub event: DomainEvent,
}

impl DomainEventEnvelope {
    pub fn new(event: DomainEvent) -> Self {
        Self {
            emitted_at: Utc::now(),
            event,
        }
    }
}
