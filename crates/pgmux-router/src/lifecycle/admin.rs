//! Cluster-level database administration (roles and databases)
//!
//! These statements cannot run inside a project's own database, so they go
//! through a small pool on the admin connection instead of the registry.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use super::error::{LifecycleError, LifecycleResult};

#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    async fn create_role(&self, role: &str, password: &str) -> LifecycleResult<()>;

    async fn create_database(&self, database: &str, owner: &str) -> LifecycleResult<()>;

    /// Succeeds when the role does not exist
    async fn drop_role(&self, role: &str) -> LifecycleResult<()>;

    /// Succeeds when the database does not exist; terminates open sessions
    async fn drop_database(&self, database: &str) -> LifecycleResult<()>;
}

/// `DatabaseAdmin` over a `PgPool` on the admin database URL
pub struct PostgresAdmin {
    pool: PgPool,
}

impl PostgresAdmin {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lazily connecting pool; the first statement opens the connection
    pub fn connect_lazy(admin_database_url: &str) -> LifecycleResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(admin_database_url)
            .map_err(admin_error)?;
        Ok(Self::new(pool))
    }

    async fn run(&self, sql: &str) -> LifecycleResult<()> {
        debug!("[Lifecycle] Admin statement: {}", redact_password(sql));
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(admin_error)?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DatabaseAdmin for PostgresAdmin {
    async fn create_role(&self, role: &str, password: &str) -> LifecycleResult<()> {
        let sql = format!(
            "CREATE ROLE {} WITH LOGIN PASSWORD {}",
            quote_identifier(role)?,
            quote_literal(password)
        );
        self.run(&sql).await?;
        info!("[Lifecycle] Created role {}", role);
        Ok(())
    }

    async fn create_database(&self, database: &str, owner: &str) -> LifecycleResult<()> {
        let sql = format!(
            "CREATE DATABASE {} OWNER {}",
            quote_identifier(database)?,
            quote_identifier(owner)?
        );
        self.run(&sql).await?;
        info!("[Lifecycle] Created database {}", database);
        Ok(())
    }

    async fn drop_role(&self, role: &str) -> LifecycleResult<()> {
        self.run(&format!("DROP ROLE IF EXISTS {}", quote_identifier(role)?))
            .await?;
        info!("[Lifecycle] Dropped role {}", role);
        Ok(())
    }

    async fn drop_database(&self, database: &str) -> LifecycleResult<()> {
        self.run(&format!(
            "DROP DATABASE IF EXISTS {} WITH (FORCE)",
            quote_identifier(database)?
        ))
        .await?;
        info!("[Lifecycle] Dropped database {}", database);
        Ok(())
    }
}

fn admin_error(e: sqlx::Error) -> LifecycleError {
    LifecycleError::Admin(e.to_string())
}

/// Postgres identifier, validated and double-quoted
pub fn quote_identifier(name: &str) -> LifecycleResult<String> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if !valid {
        return Err(LifecycleError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name))
}

/// Postgres string literal with embedded quotes doubled
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn redact_password(sql: &str) -> &str {
    match sql.find(" PASSWORD ") {
        Some(idx) => &sql[..idx],
        None => sql,
    }
}
