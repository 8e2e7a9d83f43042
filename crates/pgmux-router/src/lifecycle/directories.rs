//! Per-project filesystem footprint
//!
//! Every project owns `functions/<ref>`, `storage/<ref>` and `logs/<ref>`
//! under the data path. Creating is idempotent; deleting treats an already
//! missing directory as success.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use pgmux_core::is_valid_project_ref;
use tracing::{debug, info};

use super::error::{LifecycleError, LifecycleResult};

pub const PROJECT_DIRECTORIES: [&str; 3] = ["functions", "storage", "logs"];

/// The directories owned by `project_ref`
pub fn project_directories(project_ref: &str, base_path: &Path) -> LifecycleResult<Vec<PathBuf>> {
    if !is_valid_project_ref(project_ref) {
        return Err(LifecycleError::InvalidProjectRef(project_ref.to_string()));
    }
    Ok(PROJECT_DIRECTORIES
        .iter()
        .map(|kind| base_path.join(kind).join(project_ref))
        .collect())
}

pub async fn create_project_directories(
    project_ref: &str,
    base_path: &Path,
) -> LifecycleResult<Vec<PathBuf>> {
    let dirs = project_directories(project_ref, base_path)?;
    for dir in &dirs {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| LifecycleError::Io {
                path: dir.clone(),
                source,
            })?;
        debug!("[Lifecycle] Created {}", dir.display());
    }
    info!(project_ref = %project_ref, "[Lifecycle] Project directories ready");
    Ok(dirs)
}

/// Remove all of the project's directories. Returns those that existed.
pub async fn delete_project_directories(
    project_ref: &str,
    base_path: &Path,
) -> LifecycleResult<Vec<PathBuf>> {
    let dirs = project_directories(project_ref, base_path)?;
    let mut removed = Vec::new();
    for dir in dirs {
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!("[Lifecycle] Removed {}", dir.display());
                removed.push(dir);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(LifecycleError::Io { path: dir, source }),
        }
    }
    info!(
        project_ref = %project_ref,
        removed = removed.len(),
        "[Lifecycle] Project directories removed"
    );
    Ok(removed)
}
