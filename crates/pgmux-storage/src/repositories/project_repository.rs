//! SQLite implementation of ProjectRepository.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgmux_core::{Project, ProjectRepository, ProjectStatus};
use rusqlite::{params, OptionalExtension, Row};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::crypto::FieldEncryptor;
use crate::Database;

const SELECT_COLUMNS: &str = "SELECT project_ref, name, database_name, database_user,
        database_password_enc, owner_user_id, status, created_at, updated_at
     FROM projects";

/// Undecrypted row as stored.
struct ProjectRow {
    project_ref: String,
    name: String,
    database_name: String,
    database_user: Option<String>,
    database_password_enc: Option<String>,
    owner_user_id: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
}

impl ProjectRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            project_ref: row.get(0)?,
            name: row.get(1)?,
            database_name: row.get(2)?,
            database_user: row.get(3)?,
            database_password_enc: row.get(4)?,
            owner_user_id: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

/// SQLite-backed implementation of ProjectRepository.
///
/// Passwords are encrypted with the `FieldEncryptor` on write and decrypted
/// on read; callers only ever see plaintext in memory.
pub struct SqliteProjectRepository {
    db: Arc<Mutex<Database>>,
    encryptor: Arc<FieldEncryptor>,
}

impl SqliteProjectRepository {
    pub fn new(db: Arc<Mutex<Database>>, encryptor: Arc<FieldEncryptor>) -> Self {
        Self { db, encryptor }
    }

    /// Parse a datetime string to DateTime<Utc>.
    /// Handles both RFC3339 format and SQLite's `datetime('now')` format.
    fn parse_datetime(s: &str) -> DateTime<Utc> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return dt.with_timezone(&Utc);
        }
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return dt.and_utc();
        }
        warn!("[ProjectRepository] Unparseable timestamp '{}'", s);
        Utc::now()
    }

    fn decode(&self, row: ProjectRow) -> Result<Project> {
        let status = ProjectStatus::parse(&row.status).unwrap_or_else(|| {
            warn!(
                "[ProjectRepository] Unknown status '{}' for project {}",
                row.status, row.project_ref
            );
            ProjectStatus::Failed
        });

        let database_password = row
            .database_password_enc
            .as_deref()
            .map(|enc| self.encryptor.decrypt(enc))
            .transpose()
            .with_context(|| format!("Failed to decrypt password for project {}", row.project_ref))?;

        Ok(Project {
            project_ref: row.project_ref,
            name: row.name,
            database_name: row.database_name,
            database_user: row.database_user,
            database_password,
            owner_user_id: row.owner_user_id,
            status,
            created_at: Self::parse_datetime(&row.created_at),
            updated_at: Self::parse_datetime(&row.updated_at),
        })
    }

    async fn query_projects(&self, filter: &str, status: Option<&str>) -> Result<Vec<Project>> {
        let rows = {
            let db = self.db.lock().await;
            let conn = db.connection();
            let sql = format!("{} {} ORDER BY created_at ASC, project_ref ASC", SELECT_COLUMNS, filter);
            let mut stmt = conn.prepare(&sql)?;
            let rows = match status {
                Some(status) => stmt
                    .query_map(params![status], ProjectRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?,
                None => stmt
                    .query_map([], ProjectRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?,
            };
            rows
        };

        rows.into_iter().map(|row| self.decode(row)).collect()
    }
}

#[async_trait]
impl ProjectRepository for SqliteProjectRepository {
    async fn list(&self) -> Result<Vec<Project>> {
        let projects = self.query_projects("", None).await?;
        debug!("[ProjectRepository::list] Returning {} projects", projects.len());
        Ok(projects)
    }

    async fn list_by_status(&self, status: ProjectStatus) -> Result<Vec<Project>> {
        self.query_projects("WHERE status = ?1", Some(status.as_str()))
            .await
    }

    async fn get(&self, project_ref: &str) -> Result<Option<Project>> {
        let row = {
            let db = self.db.lock().await;
            let conn = db.connection();
            let sql = format!("{} WHERE project_ref = ?1", SELECT_COLUMNS);
            conn.query_row(&sql, params![project_ref], ProjectRow::from_row)
                .optional()?
        };

        row.map(|row| self.decode(row)).transpose()
    }

    async fn create(&self, project: &Project) -> Result<()> {
        let password_enc = project
            .database_password
            .as_deref()
            .map(|p| self.encryptor.encrypt(p))
            .transpose()?;

        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO projects (project_ref, name, database_name, database_user,
                    database_password_enc, owner_user_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    project.project_ref,
                    project.name,
                    project.database_name,
                    project.database_user,
                    password_enc,
                    project.owner_user_id,
                    project.status.as_str(),
                    project.created_at.to_rfc3339(),
                    project.updated_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("Failed to insert project {}", project.project_ref))?;

        debug!("[ProjectRepository] Created project {}", project.project_ref);
        Ok(())
    }

    async fn set_status(&self, project_ref: &str, status: ProjectStatus) -> Result<()> {
        let db = self.db.lock().await;
        let rows_affected = db.connection().execute(
            "UPDATE projects SET status = ?2, updated_at = ?3 WHERE project_ref = ?1",
            params![project_ref, status.as_str(), Utc::now().to_rfc3339()],
        )?;

        if rows_affected == 0 {
            anyhow::bail!("Project not found: {}", project_ref);
        }
        Ok(())
    }

    async fn delete(&self, project_ref: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows_affected = db
            .connection()
            .execute("DELETE FROM projects WHERE project_ref = ?1", params![project_ref])?;
        Ok(rows_affected > 0)
    }
}
