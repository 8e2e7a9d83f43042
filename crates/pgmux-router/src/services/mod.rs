//! Per-project auxiliary service configuration
//!
//! ```text
//!   configure_project_services(ref)
//!          │
//!          ├─ ProjectRepository::get ── CredentialResolver::resolve
//!          │
//!          └─ join_all ─┬─ gotrue    ─┐
//!                       ├─ storage   ─┤  one lock per (ref, service)
//!                       ├─ realtime  ─┤
//!                       └─ postgrest ─┘
//! ```

mod client;
mod manager;

pub use client::{HttpServiceClient, ServiceClient, ServiceClientError, ServiceCredentials};
pub use manager::{
    ConfigureResult, HealthReport, ProjectHealth, ServiceConfigManager, ServiceConfigurationError,
    ServiceCounts, ServiceHealth, ServiceStats, ServiceTarget,
};
