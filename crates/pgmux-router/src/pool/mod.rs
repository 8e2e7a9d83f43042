//! Connection Pool Registry
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      PoolRegistry                        │
//! │   DashMap<PoolKey { project_ref, read_only }, Pool>      │
//! ├──────────────────────────────────────────────────────────┤
//! │  ProjectPool: semaphore (max) + idle list + drain token  │
//! ├──────────────────────────────────────────────────────────┤
//! │  ConnectionFactory → DbConnection (sqlx PgConnection)    │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod connection;
mod postgres;
mod project_pool;
mod registry;

pub use connection::{ConnectionFactory, ConnectionInfo, DatabaseEndpoint, DbConnection, Row};
pub use postgres::PostgresConnectionFactory;
pub use project_pool::{PoolKey, PoolStats, ProjectConnection, ProjectPool};
pub use registry::PoolRegistry;
