use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::config::{AppConfig, StorageBackend};
use crate::storage::{MemStorage, PgStorage, Storage};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn Storage>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        Self::from_config(config).await
    }

    /// Picks the storage backend once; nothing downstream looks at the config again.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let storage: Arc<dyn Storage> = match config.backend {
            StorageBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL missing for postgres backend")?;
                let pg = PgStorage::connect(url).await?;

                pg.migrate().await?;
                Arc::new(pg)
            }
            StorageBackend::Memory => {
                warn!("no DATABASE_URL configured; data is kept in memory and lost on restart");
                Arc::new(MemStorage::new())
            }
        };
        info!(backend = storage.backend(), "storage ready");

        Ok(Self::from_parts(Arc::new(config), storage))
    }

    pub fn from_parts(config: Arc<AppConfig>, storage: Arc<dyn Storage>) -> Self {
        Self { config, storage }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            backend: StorageBackend::Memory,
            host: "127.0.0.1".into(),
            port: 0,
            default_signal_user_id: Some(1),
        });
        Self::from_parts(config, Arc::new(MemStorage::new()))
    }
}
