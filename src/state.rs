use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

use crate::clients::{AzureConnector, FixedConnector, MockCompute, ProviderConnector};
use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AuthService, CloudDispatcher, IdentityResolver, InventoryService, SeaOrmAuthService,
    SeaOrmInventoryService,
};
use crate::vault::CredentialVault;

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub vault: Arc<CredentialVault>,

    pub auth_service: Arc<dyn AuthService>,

    pub identity: IdentityResolver,

    pub inventory_service: Arc<dyn InventoryService>,

    pub dispatcher: Arc<CloudDispatcher>,
}

impl SharedState {
    /// Wires the provider from config: the mock in mock mode, Azure otherwise.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let vault = Arc::new(CredentialVault::new(&config.vault.path));

        let connector: Arc<dyn ProviderConnector> = if config.azure.mock_mode {
            info!("Azure mock mode enabled");
            Arc::new(FixedConnector::new(Arc::new(MockCompute::new())))
        } else {
            Arc::new(AzureConnector::new(vault.clone(), config.azure.clone())?)
        };

        Self::init(config, vault, connector).await
    }

    /// Same as [`SharedState::new`] with an explicit provider connector.
    pub async fn with_connector(
        config: Config,
        connector: Arc<dyn ProviderConnector>,
    ) -> anyhow::Result<Self> {
        let vault = Arc::new(CredentialVault::new(&config.vault.path));
        Self::init(config, vault, connector).await
    }

    async fn init(
        config: Config,
        vault: Arc<CredentialVault>,
        connector: Arc<dyn ProviderConnector>,
    ) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;
        store
            .ensure_admin(&config.bootstrap, &config.security)
            .await?;

        let auth_service = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            config.security.clone(),
        )) as Arc<dyn AuthService>;

        let identity = IdentityResolver::new(auth_service.clone());

        let inventory_service = Arc::new(SeaOrmInventoryService::new(
            store.clone(),
            config.security.clone(),
        )) as Arc<dyn InventoryService>;

        let dispatcher = Arc::new(CloudDispatcher::new(
            connector,
            Duration::from_secs(config.azure.operation_timeout_seconds),
        ));

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            vault,
            auth_service,
            identity,
            inventory_service,
            dispatcher,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
