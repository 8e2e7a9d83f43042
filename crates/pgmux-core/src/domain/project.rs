//! Project entity - one tenant: an isolated database plus its auxiliary services

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a project.
///
/// Values match database storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Record exists, database and services are being created
    #[default]
    Provisioning,
    /// Fully provisioned and serving traffic
    Active,
    /// Provisioning aborted; resources were compensated
    Failed,
    /// Deletion saga in progress
    Deleting,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Active => "active",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provisioning" => Some(Self::Provisioning),
            "active" => Some(Self::Active),
            "failed" => Some(Self::Failed),
            "deleting" => Some(Self::Deleting),
            _ => None,
        }
    }
}

/// A tenant of the dashboard.
///
/// `project_ref` is the stable identity and never changes after creation.
/// The core only ever mutates `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique, immutable reference (used in cache keys, paths and pool keys)
    pub project_ref: String,

    /// Human-readable name
    pub name: String,

    /// Name of the project's PostgreSQL database
    pub database_name: String,

    /// Per-project database role; `None` for projects created before
    /// per-project credentials existed
    pub database_user: Option<String>,

    /// Per-project database password (decrypted); never serialized
    #[serde(skip)]
    pub database_password: Option<String>,

    /// Owning user, used for isolation checks by the page layer
    pub owner_user_id: Option<String>,

    pub status: ProjectStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project in `Provisioning` state
    pub fn new(project_ref: impl Into<String>, database_name: impl Into<String>) -> Self {
        let now = Utc::now();
        let project_ref = project_ref.into();
        Self {
            name: project_ref.clone(),
            project_ref,
            database_name: database_name.into(),
            database_user: None,
            database_password: None,
            owner_user_id: None,
            status: ProjectStatus::Provisioning,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach per-project database credentials
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.database_user = Some(user.into());
        self.database_password = Some(password.into());
        self
    }

    pub fn with_owner(mut self, owner_user_id: impl Into<String>) -> Self {
        self.owner_user_id = Some(owner_user_id.into());
        self
    }

    pub fn with_status(mut self, status: ProjectStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == ProjectStatus::Active
    }
}

/// Check that a project ref is safe to use as a path component and SQL
/// identifier suffix: non-empty, ASCII alphanumerics, `-` and `_` only.
pub fn is_valid_project_ref(project_ref: &str) -> bool {
    !project_ref.is_empty()
        && project_ref.len() <= 63
        && project_ref
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
