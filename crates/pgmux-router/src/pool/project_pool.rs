//! One bounded connection pool for one (project, read-only) pair
//!
//! Connections are handed out as `ProjectConnection` guards. Dropping a
//! guard always gives the connection back: to the idle list when it is
//! healthy, to the retired list when it is broken, mid-transaction or the
//! pool is draining. Retired connections are closed by the next acquire or
//! by the drain itself, so `open` only ever counts live sessions.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pgmux_core::PoolSettings;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::connection::{ConnectionFactory, ConnectionInfo, DbConnection, Row};
use crate::error::{DriverError, RouterError, RouterResult};

/// Extra time cancelled operations get to hand their connections back
const FORCE_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Registry key: at most one pool per key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub project_ref: String,
    pub read_only: bool,
}

impl PoolKey {
    pub fn primary(project_ref: impl Into<String>) -> Self {
        Self {
            project_ref: project_ref.into(),
            read_only: false,
        }
    }

    pub fn read_only(project_ref: impl Into<String>) -> Self {
        Self {
            project_ref: project_ref.into(),
            read_only: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    pub open: usize,
    pub idle: usize,
    pub in_use: usize,
    pub max: u32,
}

struct IdleConnection {
    conn: Box<dyn DbConnection>,
    since: Instant,
}

pub struct ProjectPool {
    key: PoolKey,
    info: ConnectionInfo,
    settings: PoolSettings,
    factory: Arc<dyn ConnectionFactory>,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<IdleConnection>>,
    retired: Mutex<Vec<Box<dyn DbConnection>>>,
    open: AtomicUsize,
    in_use: AtomicUsize,
    /// No new acquisitions
    closing: AtomicBool,
    /// Drain finished; late releases close their connection themselves
    closed: AtomicBool,
    released: Notify,
    cancel: CancellationToken,
}

impl ProjectPool {
    pub fn new(
        key: PoolKey,
        info: ConnectionInfo,
        settings: PoolSettings,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_connections as usize));
        Self {
            key,
            info,
            settings,
            factory,
            permits,
            idle: Mutex::new(Vec::new()),
            retired: Mutex::new(Vec::new()),
            open: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            released: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn project_ref(&self) -> &str {
        &self.key.project_ref
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            open: self.open.load(Ordering::SeqCst),
            idle: self.idle.lock().len(),
            in_use: self.in_use.load(Ordering::SeqCst),
            max: self.settings.max_connections,
        }
    }

    /// Open `min_connections` sessions up front
    pub async fn warm(&self) -> RouterResult<()> {
        for _ in 0..self.settings.min_connections {
            let conn = self.open_connection().await?;
            self.idle.lock().push(IdleConnection {
                conn,
                since: Instant::now(),
            });
        }
        debug!(
            project_ref = %self.key.project_ref,
            read_only = self.key.read_only,
            connections = self.settings.min_connections,
            "[PoolRegistry] Warmed pool"
        );
        Ok(())
    }

    /// Wait (bounded) for a free slot and hand out a connection
    pub async fn acquire(self: &Arc<Self>) -> RouterResult<ProjectConnection> {
        if self.is_closing() {
            return Err(RouterError::PoolClosing(self.key.project_ref.clone()));
        }
        self.close_retired().await;

        let started = Instant::now();
        let permit = match tokio::time::timeout(
            self.settings.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(RouterError::PoolClosing(self.key.project_ref.clone())),
            Err(_) => {
                let waited = started.elapsed();
                warn!(
                    project_ref = %self.key.project_ref,
                    read_only = self.key.read_only,
                    waited_ms = waited.as_millis() as u64,
                    "[PoolRegistry] Pool exhausted"
                );
                return Err(RouterError::PoolExhausted {
                    project_ref: self.key.project_ref.clone(),
                    waited,
                });
            }
        };

        // Reserve before re-checking so a concurrent drain either sees us or
        // we see it.
        self.in_use.fetch_add(1, Ordering::SeqCst);
        if self.is_closing() {
            self.unreserve();
            return Err(RouterError::PoolClosing(self.key.project_ref.clone()));
        }

        let conn = match self.take_idle().await {
            Some(conn) => conn,
            None => match self.open_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    self.unreserve();
                    return Err(e);
                }
            },
        };

        Ok(ProjectConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
            broken: false,
            in_transaction: false,
        })
    }

    /// Close idle connections older than `idle_timeout`
    pub async fn reap_idle(&self) -> usize {
        let expired: Vec<_> = {
            let mut idle = self.idle.lock();
            let idle_timeout = self.settings.idle_timeout;
            let (expired, fresh): (Vec<_>, Vec<_>) = idle
                .drain(..)
                .partition(|c| c.since.elapsed() >= idle_timeout);
            *idle = fresh;
            expired
        };
        let count = expired.len();
        for idle in expired {
            self.close_connection(idle.conn).await;
        }
        count
    }

    /// Drain and close the pool. Returns how many in-flight operations had to
    /// be cancelled.
    pub async fn close(&self) -> usize {
        self.closing.store(true, Ordering::SeqCst);
        self.permits.close();
        self.close_idle().await;

        let forced = match tokio::time::timeout(self.settings.drain_timeout, self.wait_released()).await
        {
            Ok(()) => 0,
            Err(_) => {
                let stragglers = self.in_use.load(Ordering::SeqCst);
                warn!(
                    project_ref = %self.key.project_ref,
                    read_only = self.key.read_only,
                    stragglers,
                    "[PoolRegistry] Drain timed out, force-closing in-flight operations"
                );
                self.cancel.cancel();
                if tokio::time::timeout(FORCE_CLOSE_GRACE, self.wait_released())
                    .await
                    .is_err()
                {
                    warn!(
                        project_ref = %self.key.project_ref,
                        still_held = self.in_use.load(Ordering::SeqCst),
                        "[PoolRegistry] Connections still held after cancellation; they close on release"
                    );
                }
                stragglers
            }
        };

        {
            // Releases decide under this lock, so none can slip a connection
            // in after the final sweep below
            let _retired = self.retired.lock();
            self.closed.store(true, Ordering::SeqCst);
        }
        self.close_idle().await;
        self.close_retired().await;

        debug!(
            project_ref = %self.key.project_ref,
            read_only = self.key.read_only,
            open = self.open.load(Ordering::SeqCst),
            "[PoolRegistry] Pool closed"
        );
        forced
    }

    async fn wait_released(&self) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_use.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    async fn open_connection(&self) -> RouterResult<Box<dyn DbConnection>> {
        let conn = self
            .factory
            .connect(&self.info, self.key.read_only)
            .await
            .map_err(|source| RouterError::Connect {
                project_ref: self.key.project_ref.clone(),
                source,
            })?;
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            project_ref = %self.key.project_ref,
            read_only = self.key.read_only,
            open,
            "[PoolRegistry] Opened connection"
        );
        Ok(conn)
    }

    async fn close_connection(&self, conn: Box<dyn DbConnection>) {
        conn.close().await;
        self.open.fetch_sub(1, Ordering::SeqCst);
    }

    async fn take_idle(&self) -> Option<Box<dyn DbConnection>> {
        let mut expired = Vec::new();
        let fresh = {
            let mut idle = self.idle.lock();
            let mut fresh = None;
            while let Some(candidate) = idle.pop() {
                if candidate.since.elapsed() >= self.settings.idle_timeout {
                    expired.push(candidate.conn);
                } else {
                    fresh = Some(candidate.conn);
                    break;
                }
            }
            fresh
        };
        for conn in expired {
            self.close_connection(conn).await;
        }
        fresh
    }

    async fn close_idle(&self) {
        let idle: Vec<_> = self.idle.lock().drain(..).collect();
        for entry in idle {
            self.close_connection(entry.conn).await;
        }
    }

    async fn close_retired(&self) {
        let retired: Vec<_> = self.retired.lock().drain(..).collect();
        for conn in retired {
            self.close_connection(conn).await;
        }
    }

    fn unreserve(&self) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);
        self.released.notify_waiters();
    }

    fn release(&self, conn: Box<dyn DbConnection>, reusable: bool) {
        let late = {
            let mut retired = self.retired.lock();
            if self.closed.load(Ordering::SeqCst) {
                Some(conn)
            } else {
                if reusable && !self.is_closing() {
                    self.idle.lock().push(IdleConnection {
                        conn,
                        since: Instant::now(),
                    });
                } else {
                    retired.push(conn);
                }
                None
            }
        };
        if let Some(conn) = late {
            self.open.fetch_sub(1, Ordering::SeqCst);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { conn.close().await });
                }
                Err(_) => drop(conn),
            }
        }
        self.unreserve();
    }
}

/// Scoped access to one pooled connection
///
/// The connection goes back to its pool when the guard is dropped, whatever
/// the exit path.
pub struct ProjectConnection {
    conn: Option<Box<dyn DbConnection>>,
    pool: Arc<ProjectPool>,
    _permit: OwnedSemaphorePermit,
    broken: bool,
    in_transaction: bool,
}

impl ProjectConnection {
    pub fn project_ref(&self) -> &str {
        self.pool.project_ref()
    }

    pub fn is_read_only(&self) -> bool {
        self.pool.key.read_only
    }

    pub async fn query(&mut self, sql: &str, params: &[Value]) -> RouterResult<Vec<Row>> {
        let cancel = self.pool.cancel.clone();
        let outcome = match self.conn.as_mut() {
            Some(conn) => tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = conn.query(sql, params) => Some(result),
            },
            None => None,
        };
        self.finish(outcome)
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> RouterResult<u64> {
        let cancel = self.pool.cancel.clone();
        let outcome = match self.conn.as_mut() {
            Some(conn) => tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = conn.execute(sql, params) => Some(result),
            },
            None => None,
        };
        self.finish(outcome)
    }

    pub async fn execute_script(&mut self, sql: &str) -> RouterResult<()> {
        let cancel = self.pool.cancel.clone();
        let outcome = match self.conn.as_mut() {
            Some(conn) => tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = conn.execute_script(sql) => Some(result),
            },
            None => None,
        };
        self.finish(outcome)
    }

    pub(crate) async fn begin(&mut self) -> RouterResult<()> {
        self.execute_script("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    pub(crate) async fn commit(&mut self) -> RouterResult<()> {
        self.execute_script("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    pub(crate) async fn rollback(&mut self) -> RouterResult<()> {
        self.execute_script("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.pool.cancel.clone()
    }

    /// `None` means the pool cancelled the operation
    fn finish<T>(&mut self, outcome: Option<Result<T, DriverError>>) -> RouterResult<T> {
        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(source)) => {
                if source.is_broken() {
                    self.broken = true;
                }
                Err(RouterError::Query {
                    project_ref: self.pool.key.project_ref.clone(),
                    source,
                })
            }
            None => {
                self.broken = true;
                Err(RouterError::Cancelled(self.pool.key.project_ref.clone()))
            }
        }
    }
}

impl Drop for ProjectConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let reusable = !self.broken && !self.in_transaction;
            self.pool.release(conn, reusable);
        }
    }
}
