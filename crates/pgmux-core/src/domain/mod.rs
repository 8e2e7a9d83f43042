//! Domain entities, value objects, and events
//!
//! - Entities (Project, ServiceConfig, AuthFailureLogEntry)
//! - Value Objects (ProjectStatus, ServiceName, ServiceState)
//! - Domain Events (DomainEvent enum)

mod auth_failure;
mod event;
mod project;
mod service;

pub use auth_failure::{AuthFailureLog, AuthFailureLogEntry, DEFAULT_FAILURE_LOG_CAPACITY};
pub use event::{DomainEvent, DomainEventEnvelope};
pub use project::{is_valid_project_ref, Project, ProjectStatus};
pub use service::{ProjectServiceConfig, ServiceConfig, ServiceName, ServiceState};
