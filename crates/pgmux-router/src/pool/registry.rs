//! Pool Registry - the single authority mapping a project ref to its pools
//!
//! Key responsibilities:
//! - Single-flight registration per project ref
//! - Drain-then-close unregistration with a hard cutoff
//! - Scoped query/execute/transaction access; no fallback pool exists

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use pgmux_core::{is_valid_project_ref, DomainEvent, EventSender, PoolSettings};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::connection::{ConnectionFactory, ConnectionInfo, Row};
use super::project_pool::{PoolKey, PoolStats, ProjectConnection, ProjectPool};
use crate::error::{RouterError, RouterResult};

/// Registry of per-project connection pools
pub struct PoolRegistry {
    pools: DashMap<PoolKey, Arc<ProjectPool>>,
    /// Serializes register/unregister per project ref
    registration_locks: DashMap<String, Arc<Mutex<()>>>,
    factory: Arc<dyn ConnectionFactory>,
    settings: PoolSettings,
    events: EventSender,
    pools_created: AtomicU64,
}

impl PoolRegistry {
    pub fn new(factory: Arc<dyn ConnectionFactory>, settings: PoolSettings) -> Self {
        Self {
            pools: DashMap::new(),
            registration_locks: DashMap::new(),
            factory,
            settings,
            events: EventSender::detached(),
            pools_created: AtomicU64::new(0),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Number of pools ever constructed by this registry
    pub fn pools_created(&self) -> u64 {
        self.pools_created.load(Ordering::SeqCst)
    }

    fn registration_lock(&self, project_ref: &str) -> Arc<Mutex<()>> {
        self.registration_locks
            .entry(project_ref.to_string())
            .or_default()
            .clone()
    }

    /// Forget the project's lock unless another caller is already waiting on it
    fn prune_registration_lock(&self, project_ref: &str) {
        self.registration_locks
            .remove_if(project_ref, |_, lock| Arc::strong_count(lock) <= 2);
    }

    /// Registration locks currently tracked
    pub fn registration_lock_count(&self) -> usize {
        self.registration_locks.len()
    }

    /// Create the project's pools. A no-op when already registered, even
    /// under concurrent calls.
    #[instrument(level = "debug", skip(self, info), fields(project_ref = %project_ref))]
    pub async fn register_project(&self, project_ref: &str, info: ConnectionInfo) -> RouterResult<()> {
        if !is_valid_project_ref(project_ref) {
            return Err(RouterError::InvalidProjectRef(project_ref.to_string()));
        }

        let lock = self.registration_lock(project_ref);
        let _guard = lock.lock().await;

        if self.pools.contains_key(&PoolKey::primary(project_ref)) {
            debug!("[PoolRegistry] {} already registered", project_ref);
            return Ok(());
        }

        let primary = self.build_pool(PoolKey::primary(project_ref), info.clone());
        if let Err(e) = primary.warm().await {
            primary.close().await;
            warn!("[PoolRegistry] Failed to warm pool for {}: {}", project_ref, e);
            self.prune_registration_lock(project_ref);
            return Err(e);
        }

        let replica = match info.replica_host {
            Some(_) => {
                let pool = self.build_pool(PoolKey::read_only(project_ref), info);
                match pool.warm().await {
                    Ok(()) => Some(pool),
                    Err(e) => {
                        warn!(
                            "[PoolRegistry] Read replica for {} unavailable, reads use the primary: {}",
                            project_ref, e
                        );
                        pool.close().await;
                        None
                    }
                }
            }
            None => None,
        };

        let read_only = replica.is_some();
        self.pools.insert(primary.key().clone(), primary);
        if let Some(pool) = replica {
            self.pools.insert(pool.key().clone(), pool);
        }

        info!(
            project_ref = %project_ref,
            read_only,
            max_connections = self.settings.max_connections,
            "[PoolRegistry] Registered project"
        );
        self.events.emit(DomainEvent::ProjectRegistered {
            project_ref: project_ref.to_string(),
            read_only,
        });
        Ok(())
    }

    fn build_pool(&self, key: PoolKey, info: ConnectionInfo) -> Arc<ProjectPool> {
        self.pools_created.fetch_add(1, Ordering::SeqCst);
        Arc::new(ProjectPool::new(
            key,
            info,
            self.settings.clone(),
            Arc::clone(&self.factory),
        ))
    }

    /// Drain and close the project's pools. Succeeds trivially when the
    /// project is unknown. Returns the number of operations that were
    /// force-closed after the drain timeout.
    #[instrument(level = "debug", skip(self), fields(project_ref = %project_ref))]
    pub async fn unregister_project(&self, project_ref: &str) -> usize {
        let lock = self.registration_lock(project_ref);
        let _guard = lock.lock().await;

        let pools: Vec<Arc<ProjectPool>> = [PoolKey::primary(project_ref), PoolKey::read_only(project_ref)]
            .iter()
            .filter_map(|key| self.pools.remove(key).map(|(_, pool)| pool))
            .collect();

        if pools.is_empty() {
            debug!("[PoolRegistry] {} was not registered", project_ref);
            self.prune_registration_lock(project_ref);
            return 0;
        }

        let mut forced = 0;
        for pool in pools {
            forced += pool.close().await;
        }
        self.prune_registration_lock(project_ref);

        if forced > 0 {
            warn!(
                project_ref = %project_ref,
                forced_closures = forced,
                "[PoolRegistry] Force-closed in-flight operations during unregister"
            );
        } else {
            info!("[PoolRegistry] Unregistered project {}", project_ref);
        }
        self.events.emit(DomainEvent::ProjectUnregistered {
            project_ref: project_ref.to_string(),
            forced_closures: forced,
        });
        forced
    }

    pub fn is_project_registered(&self, project_ref: &str) -> bool {
        self.pools.contains_key(&PoolKey::primary(project_ref))
    }

    pub fn registered_projects(&self) -> Vec<String> {
        let mut refs: Vec<String> = self
            .pools
            .iter()
            .filter(|entry| !entry.key().read_only)
            .map(|entry| entry.key().project_ref.clone())
            .collect();
        refs.sort();
        refs
    }

    pub fn pool_stats(&self, project_ref: &str) -> Option<PoolStats> {
        self.pools
            .get(&PoolKey::primary(project_ref))
            .map(|pool| pool.stats())
    }

    pub fn read_only_pool_stats(&self, project_ref: &str) -> Option<PoolStats> {
        self.pools
            .get(&PoolKey::read_only(project_ref))
            .map(|pool| pool.stats())
    }

    fn pool(&self, project_ref: &str, read_only: bool) -> RouterResult<Arc<ProjectPool>> {
        let key = PoolKey {
            project_ref: project_ref.to_string(),
            read_only,
        };
        self.pools
            .get(&key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RouterError::NotRegistered(project_ref.to_string()))
    }

    /// Acquire a connection from the project's primary pool
    pub async fn acquire(&self, project_ref: &str) -> RouterResult<ProjectConnection> {
        self.pool(project_ref, false)?.acquire().await
    }

    #[instrument(level = "debug", skip(self, sql, params), fields(project_ref = %project_ref))]
    pub async fn query(&self, project_ref: &str, sql: &str, params: &[Value]) -> RouterResult<Vec<Row>> {
        let mut conn = self.acquire(project_ref).await?;
        conn.query(sql, params).await
    }

    /// Query the read replica when one is registered, otherwise the
    /// project's own primary.
    pub async fn query_read_only(
        &self,
        project_ref: &str,
        sql: &str,
        params: &[Value],
    ) -> RouterResult<Vec<Row>> {
        let pool = match self.pool(project_ref, true) {
            Ok(pool) => pool,
            Err(_) => self.pool(project_ref, false)?,
        };
        let mut conn = pool.acquire().await?;
        conn.query(sql, params).await
    }

    pub async fn execute(&self, project_ref: &str, sql: &str, params: &[Value]) -> RouterResult<u64> {
        let mut conn = self.acquire(project_ref).await?;
        conn.execute(sql, params).await
    }

    pub async fn execute_script(&self, project_ref: &str, sql: &str) -> RouterResult<()> {
        let mut conn = self.acquire(project_ref).await?;
        conn.execute_script(sql).await
    }

    /// Run `f` inside `BEGIN`/`COMMIT`. Any error from `f` rolls back and is
    /// returned unchanged.
    ///
    /// `f` receives the transaction's connection; the future it returns may
    /// only borrow that connection, so capture owned data.
    pub async fn with_transaction<T, E, F>(&self, project_ref: &str, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut ProjectConnection) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<RouterError> + Send,
    {
        let mut conn = self.acquire(project_ref).await?;
        conn.begin().await?;

        let cancel = conn.cancellation();
        let outcome = {
            let work = f(&mut conn);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = work => Some(result),
            }
        };

        match outcome {
            Some(Ok(value)) => {
                conn.commit().await?;
                Ok(value)
            }
            Some(Err(e)) => {
                if let Err(rollback_err) = conn.rollback().await {
                    warn!(
                        "[PoolRegistry] Rollback failed on {}: {}",
                        project_ref, rollback_err
                    );
                }
                Err(e)
            }
            None => Err(RouterError::Cancelled(project_ref.to_string()).into()),
        }
    }

    /// Close idle connections past their idle timeout in every pool
    pub async fn reap_idle(&self) -> usize {
        let pools: Vec<Arc<ProjectPool>> = self.pools.iter().map(|e| Arc::clone(e.value())).collect();
        let mut reaped = 0;
        for pool in pools {
            reaped += pool.reap_idle().await;
        }
        if reaped > 0 {
            debug!("[PoolRegistry] Reaped {} idle connections", reaped);
        }
        reaped
    }

    /// Unregister every project
    pub async fn shutdown(&self) {
        let refs = self.registered_projects();
        info!("[PoolRegistry] Shutting down {} pools", refs.len());
        for project_ref in refs {
            self.unregister_project(&project_ref).await;
        }
    }
}
