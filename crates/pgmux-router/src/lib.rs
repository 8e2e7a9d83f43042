//! # pgmux Router
//!
//! Tenant routing and configuration consistency for pgmux.
//!
//! ## Modules
//!
//! - `pool` - Per-project connection pools behind a single registry
//! - `services` - Auxiliary service configuration, failure tracking, health
//! - `lifecycle` - Project creation/deletion sagas and schema initialization
//! - `service_factory` - Dependency wiring shared by the daemon and tests
//!
//! All database access for a project goes through [`PoolRegistry`]. A
//! project that is not registered has no pool, and there is no fallback
//! pool to leak into.

mod error;
pub mod lifecycle;
pub mod pool;
pub mod service_factory;
pub mod services;

pub use error::{DriverError, RouterError, RouterResult};
pub use lifecycle::{LifecycleError, LifecycleResult, ProjectLifecycle};
pub use pool::{
    ConnectionFactory, ConnectionInfo, DatabaseEndpoint, DbConnection, PoolKey, PoolRegistry, PoolStats,
    PostgresConnectionFactory, ProjectConnection, ProjectPool, Row,
};
pub use service_factory::{RouterDependencies, RouterServices, ServiceFactory};
pub use services::{ConfigureResult, HealthReport, ServiceConfigManager};
