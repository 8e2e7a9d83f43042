//! Repository traits for data access
//!
//! These traits define the interface for platform metadata storage without
//! specifying the implementation (SQLite, in-memory, etc.)

use async_trait::async_trait;

use crate::domain::{Project, ProjectStatus};

/// Result type for repository operations
pub type RepoResult<T> = anyhow::Result<T>;

/// Project repository trait
///
/// Implementations return projects with `database_password` already
/// decrypted.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Get all projects
    async fn list(&self) -> RepoResult<Vec<Project>>;

    /// Get projects in a given status
    async fn list_by_status(&self, status: ProjectStatus) -> RepoResult<Vec<Project>>;

    /// Get a project by ref
    async fn get(&self, project_ref: &str) -> RepoResult<Option<Project>>;

    /// Create a new project record. Fails if the ref is taken.
    async fn create(&self, project: &Project) -> RepoResult<()>;

    /// Update a project's lifecycle status
    async fn set_status(&self, project_ref: &str, status: ProjectStatus) -> RepoResult<()>;

    /// Delete a project record. Returns whether a record was removed.
    async fn delete(&self, project_ref: &str) -> RepoResult<bool>;
}
