//! Service configuration.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file in the working directory.

use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::{AppError, AppResult};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8081;
const DEFAULT_DATA_DIR: &str = ".mysql-browser";
const DEFAULT_SECRET_NAMESPACE: &str = "mysql";
const DEFAULT_PAGE_SIZE: u64 = 25;
const DEFAULT_MAX_PAGE_SIZE: u64 = 1000;

/// Where connection configs are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigBackend {
    /// JSON list under `data_dir`.
    File,
    /// `connections` table in the metadata database.
    MySql,
    /// Process memory only.
    Memory,
}

impl FromStr for ConfigBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" | "json" => Ok(Self::File),
            "mysql" => Ok(Self::MySql),
            "memory" => Ok(Self::Memory),
            other => Err(AppError::Validation(format!(
                "unknown CONFIG_BACKEND '{}', expected file, mysql or memory",
                other
            ))),
        }
    }
}

/// Where passwords are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretBackend {
    /// Owner-only JSON map under `data_dir`.
    File,
    /// Secret Service (GNOME Keyring, KWallet) through `secret-tool`.
    SecretTool,
    /// Process memory only.
    Memory,
}

impl FromStr for SecretBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "secret-tool" | "libsecret" => Ok(Self::SecretTool),
            "memory" => Ok(Self::Memory),
            other => Err(AppError::Validation(format!(
                "unknown SECRET_BACKEND '{}', expected file, secret-tool or memory",
                other
            ))),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name, used in logs and response metadata.
    pub service_name: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Directory holding the file-backed stores.
    pub data_dir: PathBuf,
    pub config_backend: ConfigBackend,
    /// Metadata database URL, required by [`ConfigBackend::MySql`].
    pub meta_database_url: Option<String>,
    pub secret_backend: SecretBackend,
    /// Prefix of secret keys: `<namespace>-password-<id>`.
    pub secret_namespace: String,
    /// Rows per page when the caller does not ask for a size.
    pub default_page_size: u64,
    /// Largest page size a caller may request.
    pub max_page_size: u64,
}

impl AppConfig {
    /// Loads the configuration for `service` from `.env` and the environment.
    pub fn load_with_service(service: &str) -> AppResult<Self> {
        if let Ok(path) = dotenv::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(service, |key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(service: &str, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_backend = match lookup("CONFIG_BACKEND") {
            Some(v) => v.parse()?,
            None => ConfigBackend::File,
        };
        let secret_backend = match lookup("SECRET_BACKEND") {
            Some(v) => v.parse()?,
            None => SecretBackend::File,
        };
        let meta_database_url = lookup("META_DATABASE_URL").filter(|v| !v.trim().is_empty());
        if config_backend == ConfigBackend::MySql && meta_database_url.is_none() {
            return Err(AppError::Validation(
                "CONFIG_BACKEND=mysql requires META_DATABASE_URL".into(),
            ));
        }

        let default_page_size = parse_or(&lookup, "DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE);
        let max_page_size = parse_or(&lookup, "MAX_PAGE_SIZE", DEFAULT_MAX_PAGE_SIZE);
        if default_page_size == 0 || default_page_size > max_page_size {
            return Err(AppError::Validation(format!(
                "DEFAULT_PAGE_SIZE must be within 1..={}",
                max_page_size
            )));
        }

        Ok(Self {
            service_name: service.to_string(),
            host: lookup("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&lookup, "SERVER_PORT", DEFAULT_PORT),
            data_dir: lookup("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            config_backend,
            meta_database_url,
            secret_backend,
            secret_namespace: lookup("SECRET_NAMESPACE")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SECRET_NAMESPACE.to_string()),
            default_page_size,
            max_page_size,
        })
    }

    /// Path of the JSON connection list.
    pub fn connections_file(&self) -> PathBuf {
        self.data_dir.join("connections.json")
    }

    /// Path of the file secret store.
    pub fn secrets_file(&self) -> PathBuf {
        self.data_dir.join("secrets.json")
    }

    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "malformed value, using default");
            default
        }),
        None => default,
    }
}
