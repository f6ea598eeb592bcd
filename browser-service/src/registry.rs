//! Connection registry.
//!
//! Owns the registered connection configs, their credentials and at most one
//! live connection per config. Every catalog and row query is routed through
//! here so that handle reuse and cleanup happen in one place.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, OnceCell, OwnedMutexGuard, RwLock};

use common::errors::{AppError, AppResult};
use common::models::query::page_count;
use common::models::{
    is_system_schema, ColumnInfo, ConnectionConfig, CreateConnectionRequest, DatabaseInfo,
    QueryOutput, TableInfo, TableRows,
};
use common::utils::IdGenerator;

use crate::driver::{ConnectParams, Connector, LiveConnection};
use crate::store::{ConfigStore, SecretStore};

type SharedConnection = Arc<Mutex<Box<dyn LiveConnection>>>;

/// A cache slot: empty while the first open is in flight, then the handle.
type Slot = Arc<OnceCell<SharedConnection>>;

/// Cheap clone of a cached live connection.
#[derive(Clone)]
pub struct ConnectionHandle(SharedConnection);

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConnectionHandle")
            .field(&Arc::as_ptr(&self.0))
            .finish()
    }
}

impl ConnectionHandle {
    /// True when both handles refer to the same physical connection.
    #[cfg(test)]
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    async fn lock(self) -> OwnedMutexGuard<Box<dyn LiveConnection>> {
        self.0.lock_owned().await
    }
}

/// A locked connection for the duration of one browse operation.
///
/// A statement that reports the session as lost evicts it from the cache,
/// so the next call for the same id opens a fresh connection.
struct Session<'a> {
    registry: &'a ConnectionRegistry,
    id: &'a str,
    shared: SharedConnection,
    conn: OwnedMutexGuard<Box<dyn LiveConnection>>,
}

impl Session<'_> {
    async fn execute(&mut self, sql: &str) -> AppResult<()> {
        let result = self.conn.execute(sql).await;
        self.check(result).await
    }

    async fn query(&mut self, sql: &str) -> AppResult<QueryOutput> {
        let result = self.conn.query(sql).await;
        self.check(result).await
    }

    async fn check<T>(&mut self, result: AppResult<T>) -> AppResult<T> {
        if let Err(AppError::DatabaseConnection(msg)) = &result {
            tracing::warn!(id = %self.id, error = %msg, "Connection lost, dropping cached session");
            self.registry.evict(self.id, &self.shared).await;
            if let Err(e) = self.conn.close().await {
                tracing::debug!(id = %self.id, error = %e, "Close of lost connection failed");
            }
        }
        result
    }
}

/// A registered config with its credential merged in.
struct Entry {
    config: ConnectionConfig,
    password: SecretString,
}

/// The statements sent to the server. Nothing else is ever issued.
mod statements {
    use common::errors::AppResult;
    use common::utils::SqlValidator;

    pub const SHOW_DATABASES: &str = "SHOW DATABASES";
    pub const SHOW_TABLES: &str = "SHOW TABLES";

    pub fn use_database(database: &str) -> AppResult<String> {
        Ok(format!("USE {}", SqlValidator::quote_identifier("database", database)?))
    }

    pub fn describe(table: &str) -> AppResult<String> {
        Ok(format!("DESCRIBE {}", SqlValidator::quote_identifier("table", table)?))
    }

    pub fn count_rows(table: &str) -> AppResult<String> {
        Ok(format!(
            "SELECT COUNT(*) AS total FROM {}",
            SqlValidator::quote_identifier("table", table)?
        ))
    }

    pub fn select_page(table: &str, limit: u64, offset: u64) -> AppResult<String> {
        Ok(format!(
            "SELECT * FROM {} LIMIT {} OFFSET {}",
            SqlValidator::quote_identifier("table", table)?,
            limit,
            offset
        ))
    }
}

pub struct ConnectionRegistry {
    config_store: Arc<dyn ConfigStore>,
    secret_store: Arc<dyn SecretStore>,
    connector: Arc<dyn Connector>,
    secret_namespace: String,
    max_page_size: u64,
    /// Registered configs in registration order.
    entries: RwLock<Vec<Entry>>,
    /// Single-flight cache of live connections.
    live: Mutex<HashMap<String, Slot>>,
}

impl ConnectionRegistry {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        secret_store: Arc<dyn SecretStore>,
        connector: Arc<dyn Connector>,
        secret_namespace: impl Into<String>,
        max_page_size: u64,
    ) -> Self {
        Self {
            config_store,
            secret_store,
            connector,
            secret_namespace: secret_namespace.into(),
            max_page_size,
            entries: RwLock::new(Vec::new()),
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Secret store key for the credential of `id`.
    pub fn secret_key(&self, id: &str) -> String {
        format!("{}-password-{}", self.secret_namespace, id)
    }

    /// Reads the persisted configs and merges in their credentials.
    ///
    /// A config whose credential is missing or unreadable is kept with an
    /// empty password; connecting with it fails later as a connection error.
    /// Returns the number of configs loaded.
    pub async fn load(&self) -> AppResult<usize> {
        let configs = self.config_store.load_all().await?;

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(configs.len());
        for config in configs {
            if !seen.insert(config.id.clone()) {
                tracing::warn!(id = %config.id, "Duplicate connection id in store, keeping the first");
                continue;
            }
            let password = match self.secret_store.get(&self.secret_key(&config.id)).await {
                Ok(Some(password)) => password,
                Ok(None) => {
                    tracing::warn!(id = %config.id, name = %config.name, "No stored credential for connection");
                    SecretString::from(String::new())
                }
                Err(e) => {
                    tracing::warn!(id = %config.id, error = %e, "Failed to read credential");
                    SecretString::from(String::new())
                }
            };
            entries.push(Entry { config, password });
        }

        let count = entries.len();
        *self.entries.write().await = entries;
        tracing::info!(
            count,
            config_store = self.config_store.store_id(),
            secret_store = self.secret_store.backend_id(),
            "Connections loaded"
        );
        Ok(count)
    }

    /// All registered configs, without passwords.
    pub async fn list_configs(&self) -> Vec<ConnectionConfig> {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| e.config.clone())
            .collect()
    }

    pub async fn get_config(&self, id: &str) -> AppResult<ConnectionConfig> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.config.id == id)
            .map(|e| e.config.clone())
            .ok_or_else(|| AppError::ConnectionNotFound(id.to_string()))
    }

    pub async fn config_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Number of open cached connections.
    pub async fn live_count(&self) -> usize {
        self.live
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Registers a new connection after probing it.
    ///
    /// Nothing is persisted unless the probe succeeds. If the credential
    /// cannot be stored the config list is restored, so either both are
    /// written or neither is.
    pub async fn add_connection(&self, req: &CreateConnectionRequest) -> AppResult<ConnectionConfig> {
        req.check()?;

        let config = req.to_config(IdGenerator::connection_id());
        let params = ConnectParams {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            password: SecretString::from(req.password.expose_secret().to_string()),
        };

        let mut probe = self.connector.connect(&params).await.map_err(|e| {
            tracing::warn!(name = %config.name, host = %config.host, error = %e, "Probe connection failed");
            e
        })?;
        if let Err(e) = probe.close().await {
            tracing::warn!(name = %config.name, error = %e, "Failed to close probe connection");
        }

        let mut entries = self.entries.write().await;
        let mut configs: Vec<ConnectionConfig> = entries.iter().map(|e| e.config.clone()).collect();
        configs.push(config.clone());
        self.config_store.save_all(&configs).await?;

        if let Err(e) = self
            .secret_store
            .set(&self.secret_key(&config.id), &params.password)
            .await
        {
            configs.pop();
            if let Err(rollback) = self.config_store.save_all(&configs).await {
                tracing::error!(id = %config.id, error = %rollback, "Failed to roll back config after credential write failure");
            }
            return Err(e);
        }

        entries.push(Entry {
            config: config.clone(),
            password: params.password,
        });
        tracing::info!(id = %config.id, name = %config.name, host = %config.host, "Connection added");
        Ok(config)
    }

    /// Unregisters `id`, closing its live connection and deleting its
    /// credential. Returns `false` if nothing was registered under `id`.
    pub async fn remove_connection(&self, id: &str) -> AppResult<bool> {
        let mut entries = self.entries.write().await;
        let Some(position) = entries.iter().position(|e| e.config.id == id) else {
            tracing::debug!(id = %id, "Remove of unknown connection ignored");
            return Ok(false);
        };

        let slot = self.live.lock().await.remove(id);
        if let Some(conn) = slot.as_ref().and_then(|s| s.get()) {
            close_logged(id, conn).await;
        }

        self.secret_store.delete(&self.secret_key(id)).await?;

        let removed = entries.remove(position);
        let configs: Vec<ConnectionConfig> = entries.iter().map(|e| e.config.clone()).collect();
        if let Err(e) = self.config_store.save_all(&configs).await {
            entries.insert(position, removed);
            return Err(e);
        }

        tracing::info!(id = %id, name = %removed.config.name, "Connection removed");
        Ok(true)
    }

    /// Returns the cached connection for `id`, opening it on first use.
    ///
    /// Concurrent callers share one open attempt. A failed open leaves the
    /// cache empty so the next call retries.
    pub async fn get_connection(&self, id: &str) -> AppResult<ConnectionHandle> {
        let slot = {
            let mut live = self.live.lock().await;
            Arc::clone(live.entry(id.to_string()).or_default())
        };

        match slot.get_or_try_init(|| self.open(id)).await.cloned() {
            Ok(conn) => {
                if !self.holds_slot(id, &slot).await {
                    // Removed while the open was in flight.
                    close_logged(id, &conn).await;
                    return Err(AppError::ConnectionNotFound(id.to_string()));
                }
                Ok(ConnectionHandle(conn))
            }
            Err(e) => {
                let mut live = self.live.lock().await;
                if live
                    .get(id)
                    .is_some_and(|s| Arc::ptr_eq(s, &slot) && !s.initialized())
                {
                    live.remove(id);
                }
                Err(e)
            }
        }
    }

    async fn holds_slot(&self, id: &str, slot: &Slot) -> bool {
        self.live
            .lock()
            .await
            .get(id)
            .is_some_and(|s| Arc::ptr_eq(s, slot))
    }

    async fn open(&self, id: &str) -> AppResult<SharedConnection> {
        let params = {
            let entries = self.entries.read().await;
            let entry = entries
                .iter()
                .find(|e| e.config.id == id)
                .ok_or_else(|| AppError::ConnectionNotFound(id.to_string()))?;
            ConnectParams {
                host: entry.config.host.clone(),
                port: entry.config.port,
                user: entry.config.user.clone(),
                password: SecretString::from(entry.password.expose_secret().to_string()),
            }
        };

        let conn = self.connector.connect(&params).await.map_err(|e| {
            tracing::warn!(id = %id, host = %params.host, error = %e, "Failed to open connection");
            e
        })?;
        tracing::info!(id = %id, host = %params.host, port = params.port, "Connection opened");
        Ok(Arc::new(Mutex::new(conn)))
    }

    /// Locks the connection for `id` and, when given, selects `use_sql`'s
    /// database. The lock is held until the guard is dropped, so the selected
    /// database cannot change under the caller.
    async fn session<'a>(&'a self, id: &'a str, use_sql: Option<&str>) -> AppResult<Session<'a>> {
        let handle = self.get_connection(id).await?;
        let shared = Arc::clone(&handle.0);
        let mut session = Session {
            registry: self,
            id,
            shared,
            conn: handle.lock().await,
        };
        if let Some(sql) = use_sql {
            session.execute(sql).await?;
        }
        Ok(session)
    }

    /// Drops the cache slot of `id` if it still holds `conn`.
    async fn evict(&self, id: &str, conn: &SharedConnection) {
        let mut live = self.live.lock().await;
        let holds = live
            .get(id)
            .and_then(|slot| slot.get())
            .is_some_and(|cached| Arc::ptr_eq(cached, conn));
        if holds {
            live.remove(id);
        }
    }

    /// User databases on the server; built-in schemas are never listed.
    pub async fn get_databases(&self, id: &str) -> AppResult<Vec<DatabaseInfo>> {
        let mut conn = self.session(id, None).await?;
        let output = conn.query(statements::SHOW_DATABASES).await?;
        Ok(output
            .first_column()
            .into_iter()
            .filter(|name| !is_system_schema(name))
            .map(|name| DatabaseInfo {
                name,
                connection_id: id.to_string(),
            })
            .collect())
    }

    pub async fn get_tables(&self, id: &str, database: &str) -> AppResult<Vec<TableInfo>> {
        let use_sql = statements::use_database(database)?;
        let mut conn = self.session(id, Some(&use_sql)).await?;
        let output = conn.query(statements::SHOW_TABLES).await?;
        Ok(output
            .first_column()
            .into_iter()
            .map(|name| TableInfo {
                name,
                database_name: database.to_string(),
                connection_id: id.to_string(),
            })
            .collect())
    }

    pub async fn get_columns(
        &self,
        id: &str,
        database: &str,
        table: &str,
    ) -> AppResult<Vec<ColumnInfo>> {
        let use_sql = statements::use_database(database)?;
        let describe_sql = statements::describe(table)?;
        let mut conn = self.session(id, Some(&use_sql)).await?;
        let output = conn.query(&describe_sql).await?;
        Ok(columns_from(&output))
    }

    /// One zero-based page of `table`. Pages past the end are empty, not errors.
    pub async fn get_table_rows(
        &self,
        id: &str,
        database: &str,
        table: &str,
        page: u64,
        page_size: u64,
    ) -> AppResult<TableRows> {
        if page_size == 0 || page_size > self.max_page_size {
            return Err(AppError::Validation(format!(
                "page_size must be between 1 and {}",
                self.max_page_size
            )));
        }
        let offset = page
            .checked_mul(page_size)
            .ok_or_else(|| AppError::Validation(format!("page {} is out of range", page)))?;

        let use_sql = statements::use_database(database)?;
        let count_sql = statements::count_rows(table)?;
        let select_sql = statements::select_page(table, page_size, offset)?;

        let mut conn = self.session(id, Some(&use_sql)).await?;
        let total_rows = conn.query(&count_sql).await?.scalar_u64().ok_or_else(|| {
            AppError::DatabaseQuery(format!("COUNT(*) on {} returned no value", table))
        })?;
        let output = conn.query(&select_sql).await?;

        let column_names = if output.columns.is_empty() {
            let describe_sql = statements::describe(table)?;
            columns_from(&conn.query(&describe_sql).await?)
                .into_iter()
                .map(|c| c.name)
                .collect()
        } else {
            output.columns.clone()
        };

        Ok(TableRows {
            page,
            page_size,
            column_names,
            rows: output.into_records(),
            total_rows,
            total_pages: page_count(total_rows, page_size),
        })
    }

    /// Closes every cached connection and clears the cache. Returns the
    /// number of connections that were open.
    pub async fn close_all(&self) -> usize {
        let slots: Vec<(String, Slot)> = self.live.lock().await.drain().collect();
        let mut closed = 0;
        for (id, slot) in slots {
            if let Some(conn) = slot.get() {
                close_logged(&id, conn).await;
                closed += 1;
            }
        }
        tracing::info!(closed, "All connections closed");
        closed
    }
}

async fn close_logged(id: &str, conn: &SharedConnection) {
    match conn.lock().await.close().await {
        Ok(()) => tracing::info!(id = %id, "Connection closed"),
        Err(e) => tracing::warn!(id = %id, error = %e, "Failed to close connection"),
    }
}

/// Maps `DESCRIBE` output to [`ColumnInfo`].
fn columns_from(output: &QueryOutput) -> Vec<ColumnInfo> {
    (0..output.rows.len())
        .map(|row| ColumnInfo {
            name: output.text(row, "Field").unwrap_or_default(),
            data_type: output.text(row, "Type").unwrap_or_default(),
            nullable: output
                .text(row, "Null")
                .is_some_and(|v| v.eq_ignore_ascii_case("YES")),
            key: output.text(row, "Key").unwrap_or_default(),
            default: output.text(row, "Default"),
            extra: output.text(row, "Extra").unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use common::models::CellValue;

    use crate::store::{MemoryConfigStore, MemorySecretStore};
    use crate::testing::{FailingSecretStore, FakeConnector};

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        connector: FakeConnector,
        configs: Arc<MemoryConfigStore>,
        secrets: Arc<MemorySecretStore>,
    }

    fn fixture() -> Fixture {
        let connector = FakeConnector::new();
        connector.require_password("pw");
        let configs = Arc::new(MemoryConfigStore::new());
        let secrets = Arc::new(MemorySecretStore::new());
        let registry = Arc::new(ConnectionRegistry::new(
            configs.clone(),
            secrets.clone(),
            Arc::new(connector.clone()),
            "mysql",
            1000,
        ));
        Fixture {
            registry,
            connector,
            configs,
            secrets,
        }
    }

    fn request(password: &str) -> CreateConnectionRequest {
        CreateConnectionRequest::new("A", "localhost", 3306, "root", password)
    }

    async fn added(f: &Fixture) -> String {
        f.registry.add_connection(&request("pw")).await.unwrap().id
    }

    #[tokio::test]
    async fn test_failed_probe_persists_nothing() {
        let f = fixture();
        let err = f.registry.add_connection(&request("wrong")).await.unwrap_err();

        assert!(matches!(err, AppError::DatabaseConnection(_)));
        assert!(err.to_string().starts_with("Access denied for user 'root'@'localhost'"));
        assert!(f.configs.load_all().await.unwrap().is_empty());
        assert_eq!(f.secrets.len().await, 0);
        assert!(f.registry.list_configs().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_never_connects() {
        let f = fixture();
        let req = CreateConnectionRequest::new("A", "", 3306, "root", "pw");
        let err = f.registry.add_connection(&req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(f.connector.connects(), 0);
    }

    #[tokio::test]
    async fn test_add_persists_config_and_credential_separately() {
        let f = fixture();
        let config = f.registry.add_connection(&request("pw")).await.unwrap();

        assert_eq!(config.name, "A");
        assert_eq!(f.connector.connects(), 1);
        assert_eq!(f.connector.closes(), 1, "probe connection is closed");
        assert_eq!(f.registry.live_count().await, 0);

        let listed = f.registry.list_configs().await;
        assert_eq!(listed, vec![config.clone()]);
        let json = serde_json::to_value(&listed[0]).unwrap();
        assert!(json.get("password").is_none());

        let key = format!("mysql-password-{}", config.id);
        let secret = f.secrets.get(&key).await.unwrap().unwrap();
        assert_eq!(secret.expose_secret(), "pw");
    }

    #[tokio::test]
    async fn test_added_connection_survives_reload() {
        let f = fixture();
        let id = added(&f).await;

        let reloaded = ConnectionRegistry::new(
            f.configs.clone(),
            f.secrets.clone(),
            Arc::new(f.connector.clone()),
            "mysql",
            1000,
        );
        assert_eq!(reloaded.load().await.unwrap(), 1);
        reloaded.get_connection(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_credential_fails_at_connect_not_load() {
        let f = fixture();
        let config = ConnectionConfig {
            id: "orphan".into(),
            name: "Orphan".into(),
            host: "db".into(),
            port: 3306,
            user: "app".into(),
        };
        f.configs.save_all(&[config.clone(), config]).await.unwrap();

        assert_eq!(f.registry.load().await.unwrap(), 1, "duplicate id dropped");
        let err = f.registry.get_connection("orphan").await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(err.to_string().contains("using password: NO"));
        assert_eq!(f.registry.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_secret_write_failure_rolls_back_config() {
        let connector = FakeConnector::new();
        let configs = Arc::new(MemoryConfigStore::new());
        let registry = ConnectionRegistry::new(
            configs.clone(),
            Arc::new(FailingSecretStore),
            Arc::new(connector),
            "mysql",
            1000,
        );

        let err = registry.add_connection(&request("pw")).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(configs.load_all().await.unwrap().is_empty());
        assert!(registry.list_configs().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_connection_is_cached() {
        let f = fixture();
        let id = added(&f).await;

        let first = f.registry.get_connection(&id).await.unwrap();
        let second = f.registry.get_connection(&id).await.unwrap();
        assert!(first.same_connection(&second));
        // One probe plus one live connection.
        assert_eq!(f.connector.connects(), 2);
        assert_eq!(f.registry.live_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_opens_share_one_connect() {
        let f = fixture();
        let id = added(&f).await;
        f.connector.set_connect_delay(Duration::from_millis(50));

        let (a, b, c) = tokio::join!(
            f.registry.get_connection(&id),
            f.registry.get_connection(&id),
            f.registry.get_connection(&id),
        );
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert!(a.same_connection(&b));
        assert!(a.same_connection(&c));
        assert_eq!(f.connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_failed_open_is_not_cached() {
        let f = fixture();
        let id = added(&f).await;

        f.connector.fail_next_connects(1);
        let err = f.registry.get_connection(&id).await.unwrap_err();
        assert!(err.to_string().starts_with("Can't connect to MySQL server"));
        assert_eq!(f.registry.live_count().await, 0);

        f.registry.get_connection(&id).await.unwrap();
        assert_eq!(f.registry.live_count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_id_is_config_not_found() {
        let f = fixture();
        let err = f.registry.get_connection("nope").await.unwrap_err();
        assert!(matches!(err, AppError::ConnectionNotFound(_)));
        assert_eq!(f.connector.connects(), 0);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let f = fixture();
        let id = added(&f).await;
        f.registry.get_connection(&id).await.unwrap();

        assert!(f.registry.remove_connection(&id).await.unwrap());
        assert!(!f.registry.remove_connection(&id).await.unwrap());

        // Probe and live connection both closed.
        assert_eq!(f.connector.closes(), 2);
        assert_eq!(f.registry.live_count().await, 0);
        assert!(f.configs.load_all().await.unwrap().is_empty());
        assert_eq!(f.secrets.len().await, 0);

        let err = f.registry.get_connection(&id).await.unwrap_err();
        assert!(matches!(err, AppError::ConnectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_swallows_close_failure() {
        let f = fixture();
        let id = added(&f).await;
        f.registry.get_connection(&id).await.unwrap();

        f.connector.fail_close(true);
        assert!(f.registry.remove_connection(&id).await.unwrap());
        assert!(f.registry.list_configs().await.is_empty());
        assert_eq!(f.secrets.len().await, 0);
    }

    #[tokio::test]
    async fn test_remove_during_open_discards_new_connection() {
        let f = fixture();
        let id = added(&f).await;
        f.connector.set_connect_delay(Duration::from_millis(100));

        let registry = f.registry.clone();
        let opening = {
            let id = id.clone();
            tokio::spawn(async move { registry.get_connection(&id).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(f.registry.remove_connection(&id).await.unwrap());

        let result = opening.await.unwrap();
        assert!(matches!(result, Err(AppError::ConnectionNotFound(_))));
        assert_eq!(f.registry.live_count().await, 0);
        // Probe plus the discarded connection.
        assert_eq!(f.connector.closes(), 2);
    }

    #[tokio::test]
    async fn test_lost_session_is_reopened_on_next_call() {
        let f = fixture();
        let id = added(&f).await;
        let handle = f.registry.get_connection(&id).await.unwrap();
        // The server drops the session.
        handle.lock().await.close().await.unwrap();

        let err = f.registry.get_databases(&id).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseConnection(_)));
        assert_eq!(f.registry.live_count().await, 0);

        let names = f.registry.get_databases(&id).await.unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(f.registry.live_count().await, 1);
        // One connect when adding, then one per session.
        assert_eq!(f.connector.connects(), 3);
    }

    #[tokio::test]
    async fn test_statement_error_keeps_session() {
        let f = fixture();
        let id = added(&f).await;
        let first = f.registry.get_connection(&id).await.unwrap();

        let err = f.registry.get_tables(&id, "missing").await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseQuery(_)));

        let second = f.registry.get_connection(&id).await.unwrap();
        assert!(first.same_connection(&second));
        assert_eq!(f.connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_databases_hide_system_schemas() {
        let f = fixture();
        let id = added(&f).await;

        let names: Vec<String> = f
            .registry
            .get_databases(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["analytics", "shop"]);
    }

    #[tokio::test]
    async fn test_every_scoped_query_reselects_database() {
        let f = fixture();
        let id = added(&f).await;
        f.connector.clear_statements();

        let tables = f.registry.get_tables(&id, "shop").await.unwrap();
        assert_eq!(tables.len(), 3);
        assert_eq!(tables[0].database_name, "shop");
        f.registry.get_columns(&id, "analytics", "events").await.unwrap();
        f.registry.get_tables(&id, "shop").await.unwrap();

        assert_eq!(
            f.connector.statements(),
            vec![
                "USE `shop`",
                "SHOW TABLES",
                "USE `analytics`",
                "DESCRIBE `events`",
                "USE `shop`",
                "SHOW TABLES",
            ]
        );
    }

    #[tokio::test]
    async fn test_interleaved_requests_keep_their_database() {
        let f = fixture();
        let id = added(&f).await;
        f.connector.set_query_delay(Duration::from_millis(10));
        f.connector.clear_statements();

        let (shop, analytics) = tokio::join!(
            f.registry.get_tables(&id, "shop"),
            f.registry.get_tables(&id, "analytics"),
        );
        assert_eq!(shop.unwrap().len(), 3);
        assert_eq!(analytics.unwrap()[0].name, "events");

        let log = f.connector.statements();
        assert_eq!(log.len(), 4);
        for pair in log.chunks(2) {
            assert!(pair[0].starts_with("USE "));
            assert_eq!(pair[1], "SHOW TABLES");
        }
    }

    #[tokio::test]
    async fn test_columns_are_mapped() {
        let f = fixture();
        let id = added(&f).await;

        let columns = f.registry.get_columns(&id, "shop", "orders").await.unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[0].data_type, "int");
        assert!(!columns[0].nullable);
        assert_eq!(columns[0].key, "PRI");
        assert_eq!(columns[0].default, None);
        assert_eq!(columns[0].extra, "auto_increment");
        assert!(columns[1].nullable);
        assert_eq!(columns[1].default.as_deref(), Some("n/a"));
    }

    #[tokio::test]
    async fn test_table_rows_paging() {
        let f = fixture();
        let id = added(&f).await;

        let first = f.registry.get_table_rows(&id, "shop", "orders", 0, 25).await.unwrap();
        assert_eq!(first.total_rows, 60);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.rows.len(), 25);
        assert_eq!(first.column_names, vec!["id", "label"]);

        let last = f.registry.get_table_rows(&id, "shop", "orders", 2, 25).await.unwrap();
        assert_eq!(last.rows.len(), 10);
        assert_eq!(last.rows[0]["id"], CellValue::Integer(51));

        let beyond = f.registry.get_table_rows(&id, "shop", "orders", 5, 25).await.unwrap();
        assert!(beyond.rows.is_empty());
        assert_eq!(beyond.total_pages, 3);
        assert_eq!(beyond.column_names, vec!["id", "label"]);
    }

    #[tokio::test]
    async fn test_table_rows_statements() {
        let f = fixture();
        let id = added(&f).await;
        f.connector.clear_statements();

        f.registry.get_table_rows(&id, "shop", "orders", 1, 25).await.unwrap();
        assert_eq!(
            f.connector.statements(),
            vec![
                "USE `shop`",
                "SELECT COUNT(*) AS total FROM `orders`",
                "SELECT * FROM `orders` LIMIT 25 OFFSET 25",
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_table_has_column_names() {
        let f = fixture();
        let id = added(&f).await;

        let page = f.registry.get_table_rows(&id, "shop", "empty", 0, 25).await.unwrap();
        assert_eq!(page.total_rows, 0);
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.column_names, vec!["id", "label"]);
    }

    #[tokio::test]
    async fn test_page_size_bounds() {
        let f = fixture();
        let id = added(&f).await;

        for size in [0, 1001] {
            let err = f
                .registry
                .get_table_rows(&id, "shop", "orders", 0, size)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        let err = f
            .registry
            .get_table_rows(&id, "shop", "orders", u64::MAX, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_bad_identifier_rejected_before_connecting() {
        let f = fixture();
        let id = added(&f).await;
        let connects = f.connector.connects();

        let err = f.registry.get_tables(&id, "").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let long = "t".repeat(65);
        let err = f.registry.get_columns(&id, "shop", &long).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(f.connector.connects(), connects);
    }

    #[tokio::test]
    async fn test_backticks_are_escaped() {
        let f = fixture();
        let id = added(&f).await;
        f.connector.clear_statements();

        let err = f.registry.get_tables(&id, "a`b").await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown database 'a`b'");
        assert_eq!(f.connector.statements(), vec!["USE `a``b`"]);
    }

    #[tokio::test]
    async fn test_close_all() {
        let f = fixture();
        let first = added(&f).await;
        let second = added(&f).await;
        f.registry.get_connection(&first).await.unwrap();
        f.registry.get_connection(&second).await.unwrap();

        f.connector.fail_close(true);
        assert_eq!(f.registry.close_all().await, 2);
        assert_eq!(f.registry.live_count().await, 0);
        assert_eq!(f.registry.close_all().await, 0);
    }
}
