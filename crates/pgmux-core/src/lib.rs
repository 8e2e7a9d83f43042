//! # pgmux Core Library
//!
//! Domain logic, entities, and business rules for pgmux.
//!
//! ## Modules
//!
//! - `domain` - Core entities (Project, ServiceConfig, AuthFailureLogEntry)
//! - `repository` - Data access traits
//! - `credentials` - Per-project credential resolution with legacy fallback
//! - `pooling` - Pooling cache keys, invalidation closures, query cache
//! - `config` - Process settings
//! - `event_bus` - Central event distribution system

pub mod config;
pub mod credentials;
pub mod domain;
pub mod event_bus;
pub mod pooling;
pub mod repository;

// Re-export commonly used types
pub use domain::*;
pub use repository::*;

pub use config::{ConfigError, PoolSettings, ServiceEndpoints, Settings};
pub use credentials::{should_use_fallback, CredentialResolver, CredentialSet, DefaultCredentials};
pub use event_bus::{EventBus, EventReceiver, EventSender, SharedEventBus};
