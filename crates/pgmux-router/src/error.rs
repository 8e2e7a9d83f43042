//! Router error types

use std::time::Duration;

use thiserror::Error;

/// Failure reported by a physical connection
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Statement(String),

    /// The connection is unusable and must not be reused
    #[error("connection lost: {0}")]
    Broken(String),
}

impl DriverError {
    pub fn is_broken(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Broken(_))
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    /// No pool exists for the project. There is never a default pool.
    #[error("project {0} is not registered")]
    NotRegistered(String),

    #[error("connection pool for project {project_ref} exhausted after waiting {waited:?}")]
    PoolExhausted {
        project_ref: String,
        waited: Duration,
    },

    #[error("connection pool for project {0} is closing")]
    PoolClosing(String),

    #[error("failed to connect to database of project {project_ref}: {source}")]
    Connect {
        project_ref: String,
        #[source]
        source: DriverError,
    },

    #[error("statement failed on project {project_ref}: {source}")]
    Query {
        project_ref: String,
        #[source]
        source: DriverError,
    },

    /// The pool was force-closed while the operation was in flight
    #[error("operation on project {0} was cancelled by pool shutdown")]
    Cancelled(String),

    #[error("invalid project ref {0:?}")]
    InvalidProjectRef(String),
}

impl RouterError {
    pub fn project_ref(&self) -> &str {
        match self {
            Self::NotRegistered(r)
            | Self::PoolClosing(r)
            | Self::Cancelled(r)
            | Self::InvalidProjectRef(r) => r,
            Self::PoolExhausted { project_ref, .. }
            | Self::Connect { project_ref, .. }
            | Self::Query { project_ref, .. } => project_ref,
        }
    }
}

pub type RouterResult<T> = Result<T, RouterError>;
