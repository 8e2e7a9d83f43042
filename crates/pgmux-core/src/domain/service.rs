//! Auxiliary service configuration entities
//!
//! Every project runs four auxiliary services that authenticate against the
//! project's database. The configuration manager keeps one `ServiceConfig`
//! per `(project, service)`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The auxiliary services configured per project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    /// Authentication (GoTrue)
    Gotrue,
    /// Object storage API
    Storage,
    /// Realtime change streams
    Realtime,
    /// REST API (PostgREST)
    Postgrest,
}

impl ServiceName {
    /// All services, in configuration order
    pub const ALL: [ServiceName; 4] = [
        ServiceName::Gotrue,
        ServiceName::Storage,
        ServiceName::Realtime,
        ServiceName::Postgrest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gotrue => "gotrue",
            Self::Storage => "storage",
            Self::Realtime => "realtime",
            Self::Postgrest => "postgrest",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == s)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration state of one `(project, service)` pair.
///
/// `Unconfigured -> Configuring -> Configured`, or `Configuring -> Failed`.
/// `Failed` is sticky: only a later successful configuration run leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Unconfigured,
    Configuring,
    Configured,
    Failed,
}

/// Per-service configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub service: ServiceName,
    pub enabled: bool,
    pub state: ServiceState,
    pub last_updated: DateTime<Utc>,
    pub error_count: u32,
    pub last_error: Option<String>,
}

impl ServiceConfig {
    pub fn new(service: ServiceName) -> Self {
        Self {
            service,
            enabled: true,
            state: ServiceState::Unconfigured,
            last_updated: Utc::now(),
            error_count: 0,
            last_error: None,
        }
    }

    /// Enter `Configuring`
    pub fn begin(&mut self) {
        self.state = ServiceState::Configuring;
        self.last_updated = Utc::now();
    }

    /// `Configuring -> Configured`; clears the last error
    pub fn mark_configured(&mut self) {
        self.state = ServiceState::Configured;
        self.last_error = None;
        self.last_updated = Utc::now();
    }

    /// `Configuring -> Failed`; bumps the error counter
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.state = ServiceState::Failed;
        self.error_count = self.error_count.saturating_add(1);
        self.last_error = Some(error.into());
        self.last_updated = Utc::now();
    }

    pub fn is_configured(&self) -> bool {
        self.state == ServiceState::Configured
    }

    pub fn is_failed(&self) -> bool {
        self.state == ServiceState::Failed
    }
}

/// All service configuration for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectServiceConfig {
    pub project_ref: String,
    /// Database user the services were last configured with
    pub database_user: String,
    pub database_name: String,
    /// Whether the default admin credentials were used
    pub using_fallback_credentials: bool,
    pub services: BTreeMap<ServiceName, ServiceConfig>,
}

impl ProjectServiceConfig {
    pub fn new(
        project_ref: impl Into<String>,
        database_user: impl Into<String>,
        database_name: impl Into<String>,
    ) -> Self {
        Self {
            project_ref: project_ref.into(),
            database_user: database_user.into(),
            database_name: database_name.into(),
            using_fallback_credentials: false,
            services: ServiceName::ALL
                .into_iter()
                .map(|name| (name, ServiceConfig::new(name)))
                .collect(),
        }
    }

    pub fn service(&self, name: ServiceName) -> Option<&ServiceConfig> {
        self.services.get(&name)
    }

    pub fn service_mut(&mut self, name: ServiceName) -> &mut ServiceConfig {
        self.services
            .entry(name)
            .or_insert_with(|| ServiceConfig::new(name))
    }
}
