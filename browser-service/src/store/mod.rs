//! Persistence for connection configs and their passwords.
//!
//! Configs and passwords live in separate stores so that the plain config
//! list never contains a secret.

mod json_file;
mod mysql_meta;
mod secret_file;
mod secret_tool;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;

use common::config::{AppConfig, ConfigBackend, SecretBackend};
use common::errors::{AppError, AppResult};
use common::models::ConnectionConfig;

pub use json_file::JsonFileConfigStore;
pub use mysql_meta::MySqlConfigStore;
pub use secret_file::FileSecretStore;
pub use secret_tool::SecretToolStore;

/// The plain store: the full list of configs, read and rewritten as a whole.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Reads every persisted config in registration order.
    async fn load_all(&self) -> AppResult<Vec<ConnectionConfig>>;

    /// Replaces the persisted list with `configs`.
    async fn save_all(&self, configs: &[ConnectionConfig]) -> AppResult<()>;

    /// Short backend name for logs.
    fn store_id(&self) -> &'static str;
}

/// The secret store: one password per key.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Looks up a secret; a missing key is `Ok(None)`.
    async fn get(&self, key: &str) -> AppResult<Option<SecretString>>;

    /// Stores or replaces a secret.
    async fn set(&self, key: &str, secret: &SecretString) -> AppResult<()>;

    /// Deletes a secret; deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Short backend name for logs.
    fn backend_id(&self) -> &'static str;
}

/// Builds the config store selected by `config`.
pub async fn config_store_from(config: &AppConfig) -> AppResult<Arc<dyn ConfigStore>> {
    Ok(match config.config_backend {
        ConfigBackend::File => {
            let store = JsonFileConfigStore::new(config.connections_file());
            tracing::info!(path = %store.path().display(), "Using JSON config store");
            Arc::new(store)
        }
        ConfigBackend::MySql => {
            let url = config.meta_database_url.as_deref().ok_or_else(|| {
                AppError::Validation("CONFIG_BACKEND=mysql requires META_DATABASE_URL".into())
            })?;
            Arc::new(MySqlConfigStore::connect(url).await?)
        }
        ConfigBackend::Memory => Arc::new(MemoryConfigStore::new()),
    })
}

/// Builds the secret store selected by `config`.
pub async fn secret_store_from(config: &AppConfig) -> AppResult<Arc<dyn SecretStore>> {
    Ok(match config.secret_backend {
        SecretBackend::File => {
            let store = FileSecretStore::new(config.secrets_file());
            tracing::info!(path = %store.path().display(), "Using file secret store");
            Arc::new(store)
        }
        SecretBackend::SecretTool => {
            let store = SecretToolStore::new(config.service_name.clone());
            if !store.is_available().await {
                return Err(AppError::Storage(
                    "secret-tool is not installed or the Secret Service is unreachable".into(),
                ));
            }
            Arc::new(store)
        }
        SecretBackend::Memory => Arc::new(MemorySecretStore::new()),
    })
}

/// Config store kept in process memory.
#[derive(Default)]
pub struct MemoryConfigStore {
    configs: RwLock<Vec<ConnectionConfig>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load_all(&self) -> AppResult<Vec<ConnectionConfig>> {
        Ok(self.configs.read().await.clone())
    }

    async fn save_all(&self, configs: &[ConnectionConfig]) -> AppResult<()> {
        *self.configs.write().await = configs.to_vec();
        Ok(())
    }

    fn store_id(&self) -> &'static str {
        "memory"
    }
}

/// Secret store kept in process memory.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<HashMap<String, SecretString>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored secrets.
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.secrets.read().await.len()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, key: &str) -> AppResult<Option<SecretString>> {
        Ok(self
            .secrets
            .read()
            .await
            .get(key)
            .map(|s| SecretString::from(s.expose_secret().to_string())))
    }

    async fn set(&self, key: &str, secret: &SecretString) -> AppResult<()> {
        self.secrets.write().await.insert(
            key.to_string(),
            SecretString::from(secret.expose_secret().to_string()),
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.secrets.write().await.remove(key);
        Ok(())
    }

    fn backend_id(&self) -> &'static str {
        "memory"
    }
}
