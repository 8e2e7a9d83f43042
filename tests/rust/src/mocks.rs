//! Mock collaborators for testing
//!
//! In-memory implementations of the driver, service client, repository,
//! cache and database admin traits, with knobs for injecting failures and
//! delays.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};

use pgmux_core::pooling::{CacheInvalidator, CacheKey};
use pgmux_core::{Project, ProjectRepository, ProjectStatus, RepoResult, ServiceName};
use pgmux_router::lifecycle::{DatabaseAdmin, LifecycleError, LifecycleResult};
use pgmux_router::services::{ServiceClient, ServiceClientError, ServiceCredentials};
use pgmux_router::{ConnectionFactory, ConnectionInfo, DbConnection, DriverError, Row};

// ============================================================================
// MockConnectionFactory
// ============================================================================

#[derive(Default)]
struct DriverState {
    /// Live physical connections per database
    open: DashMap<String, usize>,
    connects: AtomicUsize,
    fail_connect: RwLock<HashSet<String>>,
    fail_sql: RwLock<Vec<String>>,
    query_delay: RwLock<Option<Duration>>,
    connect_delay: RwLock<Option<Duration>>,
    statements: Mutex<Vec<(String, String)>>,
}

impl DriverState {
    fn check_sql(&self, sql: &str) -> Result<(), DriverError> {
        if self.fail_sql.read().iter().any(|needle| sql.contains(needle.as_str())) {
            return Err(DriverError::Statement(format!(
                "injected failure: {}",
                sql.lines().next().unwrap_or_default()
            )));
        }
        Ok(())
    }
}

/// Counts physical connections and records every statement
#[derive(Clone, Default)]
pub struct MockConnectionFactory {
    state: Arc<DriverState>,
}

impl MockConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open physical connections to `database` right now
    pub fn open_connections(&self, database: &str) -> usize {
        self.state.open.get(database).map(|c| *c).unwrap_or(0)
    }

    pub fn total_open(&self) -> usize {
        self.state.open.iter().map(|e| *e.value()).sum()
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn fail_connect_to(&self, database: &str) {
        self.state.fail_connect.write().insert(database.to_string());
    }

    /// Any statement containing `needle` fails
    pub fn fail_sql_containing(&self, needle: &str) {
        self.state.fail_sql.write().push(needle.to_string());
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.state.query_delay.write() = Some(delay);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.write() = Some(delay);
    }

    /// Statements run against `database`, in order
    pub fn statements(&self, database: &str) -> Vec<String> {
        self.state
            .statements
            .lock()
            .iter()
            .filter(|(db, _)| db == database)
            .map(|(_, sql)| sql.clone())
            .collect()
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn connect(
        &self,
        info: &ConnectionInfo,
        read_only: bool,
    ) -> Result<Box<dyn DbConnection>, DriverError> {
        let delay = *self.state.connect_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_connect.read().contains(&info.database) {
            return Err(DriverError::Connect(format!(
                "database {} refused connection",
                info.database
            )));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        *self.state.open.entry(info.database.clone()).or_insert(0) += 1;
        Ok(Box::new(MockConnection {
            database: info.database.clone(),
            user: info.user.clone(),
            host: info.host_for(read_only).to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConnection {
    database: String,
    user: String,
    host: String,
    state: Arc<DriverState>,
}

impl MockConnection {
    async fn run(&self, sql: &str) -> Result<(), DriverError> {
        self.state
            .statements
            .lock()
            .push((self.database.clone(), sql.to_string()));
        let delay = *self.state.query_delay.read();
        if let Some(delay) = delay {
            if !is_transaction_control(sql) {
                tokio::time::sleep(delay).await;
            }
        }
        self.state.check_sql(sql)
    }
}

fn is_transaction_control(sql: &str) -> bool {
    matches!(sql, "BEGIN" | "COMMIT" | "ROLLBACK")
}

#[async_trait]
impl DbConnection for MockConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError> {
        self.run(sql).await?;
        let row = json!({
            "database": self.database,
            "user": self.user,
            "host": self.host,
            "params": params,
        });
        match row {
            Value::Object(map) => Ok(vec![map]),
            _ => Ok(Vec::new()),
        }
    }

    async fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<u64, DriverError> {
        self.run(sql).await?;
        Ok(1)
    }

    async fn execute_script(&mut self, sql: &str) -> Result<(), DriverError> {
        self.run(sql).await
    }

    async fn close(self: Box<Self>) {}
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if let Some(mut count) = self.state.open.get_mut(&self.database) {
            *count -= 1;
        }
    }
}

// ============================================================================
// MockServiceClient
// ============================================================================

/// Records configuration calls and fails on demand
pub struct MockServiceClient {
    service: ServiceName,
    fail: AtomicBool,
    unhealthy: AtomicBool,
    delay: RwLock<Option<Duration>>,
    calls: Mutex<Vec<(String, String)>>,
    in_flight: DashMap<String, usize>,
    max_in_flight: AtomicUsize,
}

impl MockServiceClient {
    pub fn new(service: ServiceName) -> Self {
        Self {
            service,
            fail: AtomicBool::new(false),
            unhealthy: AtomicBool::new(false),
            delay: RwLock::new(None),
            calls: Mutex::new(Vec::new()),
            in_flight: DashMap::new(),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// One client per service
    pub fn all() -> Vec<Arc<MockServiceClient>> {
        ServiceName::ALL
            .iter()
            .map(|s| Arc::new(MockServiceClient::new(*s)))
            .collect()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write() = Some(delay);
    }

    /// `(project_ref, database_user)` per configure call
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    /// Highest number of concurrent configure calls seen for one project
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceClient for MockServiceClient {
    fn service(&self) -> ServiceName {
        self.service
    }

    async fn configure(
        &self,
        project_ref: &str,
        credentials: &ServiceCredentials,
    ) -> Result<(), ServiceClientError> {
        let current = {
            let mut entry = self.in_flight.entry(project_ref.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.calls
            .lock()
            .push((project_ref.to_string(), credentials.database_user.clone()));

        if let Some(mut entry) = self.in_flight.get_mut(project_ref) {
            *entry -= 1;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceClientError::Status {
                status: 401,
                body: format!("{}: password authentication failed", self.service),
            });
        }
        Ok(())
    }

    async fn probe(&self, project_ref: &str) -> Result<(), ServiceClientError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(ServiceClientError::Rejected(format!(
                "{} cannot reach the database of {}",
                self.service, project_ref
            )));
        }
        Ok(())
    }
}

/// Upcast helper for handing mocks to the manager
pub fn as_clients(clients: &[Arc<MockServiceClient>]) -> Vec<Arc<dyn ServiceClient>> {
    clients
        .iter()
        .map(|c| Arc::clone(c) as Arc<dyn ServiceClient>)
        .collect()
}

// ============================================================================
// MockProjectRepository
// ============================================================================

#[derive(Default)]
pub struct MockProjectRepository {
    projects: RwLock<HashMap<String, Project>>,
    fail_reads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MockProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(self, project: Project) -> Self {
        self.projects
            .write()
            .insert(project.project_ref.clone(), project);
        self
    }

    pub fn insert(&self, project: Project) {
        self.projects
            .write()
            .insert(project.project_ref.clone(), project);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn status_of(&self, project_ref: &str) -> Option<ProjectStatus> {
        self.projects.read().get(project_ref).map(|p| p.status)
    }

    pub fn contains(&self, project_ref: &str) -> bool {
        self.projects.read().contains_key(project_ref)
    }
}

#[async_trait]
impl ProjectRepository for MockProjectRepository {
    async fn list(&self) -> RepoResult<Vec<Project>> {
        let mut all: Vec<Project> = self.projects.read().values().cloned().collect();
        all.sort_by(|a, b| a.project_ref.cmp(&b.project_ref));
        Ok(all)
    }

    async fn list_by_status(&self, status: ProjectStatus) -> RepoResult<Vec<Project>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.status == status)
            .collect())
    }

    async fn get(&self, project_ref: &str) -> RepoResult<Option<Project>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("platform database unavailable");
        }
        Ok(self.projects.read().get(project_ref).cloned())
    }

    async fn create(&self, project: &Project) -> RepoResult<()> {
        let mut projects = self.projects.write();
        if projects.contains_key(&project.project_ref) {
            anyhow::bail!("project {} already exists", project.project_ref);
        }
        projects.insert(project.project_ref.clone(), project.clone());
        Ok(())
    }

    async fn set_status(&self, project_ref: &str, status: ProjectStatus) -> RepoResult<()> {
        match self.projects.write().get_mut(project_ref) {
            Some(project) => {
                project.status = status;
                Ok(())
            }
            None => anyhow::bail!("project {} not found", project_ref),
        }
    }

    async fn delete(&self, project_ref: &str) -> RepoResult<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            anyhow::bail!("platform database is read-only");
        }
        Ok(self.projects.write().remove(project_ref).is_some())
    }
}

// ============================================================================
// RecordingInvalidator
// ============================================================================

/// Remembers every key it was asked to invalidate
#[derive(Default)]
pub struct RecordingInvalidator {
    keys: Mutex<Vec<CacheKey>>,
}

impl RecordingInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.keys.lock().clone()
    }

    pub fn clear(&self) {
        self.keys.lock().clear();
    }
}

#[async_trait]
impl CacheInvalidator for RecordingInvalidator {
    async fn invalidate(&self, key: &CacheKey) {
        self.keys.lock().push(key.clone());
    }
}

// ============================================================================
// MockDatabaseAdmin
// ============================================================================

/// Records admin operations as `"op:name"` strings
#[derive(Default)]
pub struct MockDatabaseAdmin {
    operations: Mutex<Vec<String>>,
    failing: RwLock<HashSet<String>>,
}

impl MockDatabaseAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make one operation kind (`create_role`, `drop_database`, ...) fail
    pub fn fail(&self, operation: &str) {
        self.failing.write().insert(operation.to_string());
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().clone()
    }

    fn record(&self, operation: &str, name: &str) -> LifecycleResult<()> {
        self.operations.lock().push(format!("{}:{}", operation, name));
        if self.failing.read().contains(operation) {
            return Err(LifecycleError::Admin(format!("{} {} failed", operation, name)));
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseAdmin for MockDatabaseAdmin {
    async fn create_role(&self, role: &str, _password: &str) -> LifecycleResult<()> {
        self.record("create_role", role)
    }

    async fn create_database(&self, database: &str, _owner: &str) -> LifecycleResult<()> {
        self.record("create_database", database)
    }

    async fn drop_role(&self, role: &str) -> LifecycleResult<()> {
        self.record("drop_role", role)
    }

    async fn drop_database(&self, database: &str) -> LifecycleResult<()> {
        self.record("drop_database", database)
    }
}
