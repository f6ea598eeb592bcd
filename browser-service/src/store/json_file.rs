//! JSON file config store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use common::errors::{AppError, AppResult};
use common::models::ConnectionConfig;

use super::ConfigStore;

/// On-disk shape of one entry. `password` is always written blank.
#[derive(Serialize, Deserialize)]
struct StoredConfig {
    id: String,
    name: String,
    host: String,
    port: u16,
    user: String,
    #[serde(default)]
    password: String,
}

impl From<&ConnectionConfig> for StoredConfig {
    fn from(c: &ConnectionConfig) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            host: c.host.clone(),
            port: c.port,
            user: c.user.clone(),
            password: String::new(),
        }
    }
}

impl From<StoredConfig> for ConnectionConfig {
    fn from(s: StoredConfig) -> Self {
        Self {
            id: s.id,
            name: s.name,
            host: s.host,
            port: s.port,
            user: s.user,
        }
    }
}

/// Stores the config list as a JSON array in one file.
///
/// Writes go to a sibling temp file that is then renamed over the target.
pub struct JsonFileConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ConfigStore for JsonFileConfigStore {
    async fn load_all(&self) -> AppResult<Vec<ConnectionConfig>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let stored: Vec<StoredConfig> = serde_json::from_str(&content)?;
        Ok(stored.into_iter().map(ConnectionConfig::from).collect())
    }

    async fn save_all(&self, configs: &[ConnectionConfig]) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        let stored: Vec<StoredConfig> = configs.iter().map(StoredConfig::from).collect();
        let content = serde_json::to_string_pretty(&stored)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, content).await.map_err(|e| {
            AppError::Storage(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            AppError::Storage(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }

    fn store_id(&self) -> &'static str {
        "file"
    }
}
