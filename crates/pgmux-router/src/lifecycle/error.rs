//! Lifecycle error types

use std::path::PathBuf;

use thiserror::Error;

use crate::error::RouterError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("project {0} not found")]
    ProjectNotFound(String),

    /// Some schemas were created before one failed
    #[error("initialization failed after creating {schemas_created:?}: {error}")]
    PartialInitializationFailure {
        schemas_created: Vec<String>,
        error: String,
    },

    /// A best-effort teardown step failed; logged and skipped over
    #[error("teardown step {step} failed: {error}")]
    TeardownStepFailure { step: String, error: String },

    #[error("project {0} already exists")]
    ProjectExists(String),

    /// Derived database or role name already belongs to another project
    #[error("{name} for project {project_ref} is already owned by project {owner}")]
    NameConflict {
        project_ref: String,
        name: String,
        owner: String,
    },

    #[error("invalid project ref {0:?}")]
    InvalidProjectRef(String),

    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("database admin error: {0}")]
    Admin(String),

    /// One or more services rejected their configuration
    #[error("service configuration incomplete: {0}")]
    ServiceConfiguration(String),
}

impl LifecycleError {
    /// For repository failures surfaced as `anyhow::Error`
    pub fn repository(err: anyhow::Error) -> Self {
        Self::Repository(format!("{:#}", err))
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
