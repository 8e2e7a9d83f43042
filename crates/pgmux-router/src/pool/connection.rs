//! Physical connection abstraction
//!
//! The registry never talks to a database driver directly. It asks a
//! `ConnectionFactory` for `DbConnection`s and owns them for their whole
//! life.

use std::fmt;

use async_trait::async_trait;
use pgmux_core::{CredentialSet, Settings};
use serde_json::Value;

use crate::error::DriverError;

/// One result row, column name to value
pub type Row = serde_json::Map<String, Value>;

/// Where and as whom a project's database is reached
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Read replica; when set the registry also builds a read-only pool
    pub replica_host: Option<String>,
}

impl ConnectionInfo {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            user: user.into(),
            password: password.into(),
            replica_host: None,
        }
    }

    pub fn with_replica(mut self, host: impl Into<String>) -> Self {
        self.replica_host = Some(host.into());
        self
    }

    /// Host a pool of the given kind connects to
    pub fn host_for(&self, read_only: bool) -> &str {
        match (&self.replica_host, read_only) {
            (Some(replica), true) => replica,
            _ => &self.host,
        }
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("replica_host", &self.replica_host)
            .finish()
    }
}

/// The shared database server every project database lives on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseEndpoint {
    pub host: String,
    pub port: u16,
    pub replica_host: Option<String>,
}

impl DatabaseEndpoint {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            host: settings.database_host.clone(),
            port: settings.database_port,
            replica_host: settings.replica_host.clone(),
        }
    }

    /// Connection info for one project database as the resolved user
    pub fn connection_info(&self, database: &str, credentials: &CredentialSet) -> ConnectionInfo {
        let info = ConnectionInfo::new(
            self.host.clone(),
            self.port,
            database,
            credentials.user.clone(),
            credentials.password.clone(),
        );
        match &self.replica_host {
            Some(replica) => info.with_replica(replica.clone()),
            None => info,
        }
    }
}

/// A live session with a project database
#[async_trait]
pub trait DbConnection: Send {
    /// Run a statement with positional parameters and return its rows
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError>;

    /// Run a statement with positional parameters; returns rows affected
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DriverError>;

    /// Run a multi-statement script without parameters
    async fn execute_script(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Gracefully terminate the session
    async fn close(self: Box<Self>);
}

/// Opens physical connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(
        &self,
        info: &ConnectionInfo,
        read_only: bool,
    ) -> Result<Box<dyn DbConnection>, DriverError>;
}
