//! Process-wide state, built once at startup

use std::sync::Arc;

use anyhow::{Context, Result};
use pgmux_core::pooling::{CacheInvalidator, QueryCache};
use pgmux_core::{EventBus, ProjectRepository, Settings};
use pgmux_router::lifecycle::{DatabaseAdmin, PostgresAdmin};
use pgmux_router::services::{HttpServiceClient, ServiceClient};
use pgmux_router::{
    ConnectionFactory, PostgresConnectionFactory, RouterDependencies, RouterServices, ServiceFactory,
};
use pgmux_storage::{
    Database, FieldEncryptor, FileKeyProvider, MasterKeyProvider, SqliteProjectRepository,
    StaticKeyProvider, MASTER_KEY_FILE,
};
use tokio::sync::Mutex;
use tracing::info;

pub struct AppState {
    pub settings: Settings,
    pub events: EventBus,
    pub cache: Arc<QueryCache>,
    pub services: RouterServices,
    admin: Arc<PostgresAdmin>,
    /// Shared platform database connection, kept alive for the process
    _db: Arc<Mutex<Database>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Self> {
        std::fs::create_dir_all(&settings.data_path).with_context(|| {
            format!("failed to create data directory {}", settings.data_path.display())
        })?;

        let key_provider: Box<dyn MasterKeyProvider> = match settings.master_key {
            Some(key) => {
                info!("[pgmuxd] Using master key from environment");
                Box::new(StaticKeyProvider::new(key))
            }
            None => {
                let path = settings
                    .platform_db_path
                    .parent()
                    .map(|dir| dir.join(MASTER_KEY_FILE))
                    .unwrap_or_else(|| MASTER_KEY_FILE.into());
                info!("[pgmuxd] Using master key file {}", path.display());
                Box::new(FileKeyProvider::new(path))
            }
        };
        let master_key = key_provider.get_or_create_key()?;
        let encryptor = Arc::new(FieldEncryptor::new(&master_key)?);

        info!(
            "[pgmuxd] Opening platform database at {}",
            settings.platform_db_path.display()
        );
        let db = Arc::new(Mutex::new(Database::open(&settings.platform_db_path)?));
        let projects: Arc<dyn ProjectRepository> =
            Arc::new(SqliteProjectRepository::new(Arc::clone(&db), encryptor));

        let service_clients: Vec<Arc<dyn ServiceClient>> = HttpServiceClient::from_settings(&settings)
            .context("failed to build service clients")?
            .into_iter()
            .map(|client| Arc::new(client) as Arc<dyn ServiceClient>)
            .collect();

        let admin = Arc::new(PostgresAdmin::connect_lazy(&settings.admin_database_url)?);
        let connection_factory: Arc<dyn ConnectionFactory> =
            Arc::new(PostgresConnectionFactory::new(settings.pool.acquire_timeout));
        let cache = Arc::new(QueryCache::new());
        let events = EventBus::new();

        let services = ServiceFactory::create_router_services(
            RouterDependencies {
                projects,
                connection_factory,
                service_clients,
                admin: Arc::clone(&admin) as Arc<dyn DatabaseAdmin>,
                cache: Arc::clone(&cache) as Arc<dyn CacheInvalidator>,
            },
            &settings,
            events.sender(),
        );

        Ok(Self {
            settings,
            events,
            cache,
            services,
            admin,
            _db: db,
        })
    }

    pub async fn shutdown(&self) {
        self.services.shutdown().await;
        self.admin.close().await;
    }
}
