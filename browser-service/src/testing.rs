//! In-process fakes for registry, service and router tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use common::errors::{AppError, AppResult};
use common::models::{CellValue, QueryOutput, SYSTEM_SCHEMAS};

use crate::driver::{ConnectParams, Connector, LiveConnection};
use crate::store::SecretStore;

/// A table of the fake catalog: `id INT` primary key and a nullable `label`.
#[derive(Clone)]
pub struct FakeTable {
    pub rows: Vec<Vec<CellValue>>,
}

impl FakeTable {
    pub fn numbered(count: i64) -> Self {
        Self {
            rows: (1..=count)
                .map(|i| vec![CellValue::Integer(i), CellValue::Text(format!("row {}", i))])
                .collect(),
        }
    }

    fn describe() -> QueryOutput {
        let text = |s: &str| CellValue::Text(s.to_string());
        QueryOutput::new(
            ["Field", "Type", "Null", "Key", "Default", "Extra"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            vec![
                vec![
                    text("id"),
                    text("int"),
                    text("NO"),
                    text("PRI"),
                    CellValue::Null,
                    text("auto_increment"),
                ],
                vec![
                    text("label"),
                    text("varchar(64)"),
                    text("YES"),
                    text(""),
                    text("n/a"),
                    text(""),
                ],
            ],
        )
    }
}

type Catalog = BTreeMap<String, BTreeMap<String, FakeTable>>;

struct FakeState {
    catalog: Catalog,
    password: Mutex<Option<String>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    failing_connects: AtomicUsize,
    fail_close: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
    query_delay: Mutex<Option<Duration>>,
    log: Mutex<Vec<String>>,
}

/// Fake MySQL server understanding exactly the statements the registry sends.
///
/// The default catalog has `shop` (`orders` with 60 rows, `customers` with 3,
/// `empty` with none) and `analytics` (`events` with 5). The built-in schemas
/// are always listed.
#[derive(Clone)]
pub struct FakeConnector {
    state: Arc<FakeState>,
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeConnector {
    pub fn new() -> Self {
        let mut catalog = Catalog::new();
        let shop = catalog.entry("shop".to_string()).or_default();
        shop.insert("orders".into(), FakeTable::numbered(60));
        shop.insert("customers".into(), FakeTable::numbered(3));
        shop.insert("empty".into(), FakeTable::numbered(0));
        catalog
            .entry("analytics".to_string())
            .or_default()
            .insert("events".into(), FakeTable::numbered(5));

        Self {
            state: Arc::new(FakeState {
                catalog,
                password: Mutex::new(None),
                connects: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                failing_connects: AtomicUsize::new(0),
                fail_close: AtomicBool::new(false),
                connect_delay: Mutex::new(None),
                query_delay: Mutex::new(None),
                log: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Only this password is accepted from now on.
    pub fn require_password(&self, password: &str) {
        *self.state.password.lock().unwrap() = Some(password.to_string());
    }

    /// The next `count` connect attempts fail as if the host were down.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.failing_connects.store(count, Ordering::SeqCst);
    }

    pub fn fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_query_delay(&self, delay: Duration) {
        *self.state.query_delay.lock().unwrap() = Some(delay);
    }

    /// Connect attempts so far, failed ones included.
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Successful closes so far.
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Every statement received, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state.log.lock().unwrap().clone()
    }

    pub fn clear_statements(&self) {
        self.state.log.lock().unwrap().clear();
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, params: &ConnectParams) -> AppResult<Box<dyn LiveConnection>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.state.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(AppError::DatabaseConnection(format!(
                "Can't connect to MySQL server on '{}:{}' (111)",
                params.host, params.port
            )));
        }

        let expected = self.state.password.lock().unwrap().clone();
        if let Some(expected) = expected {
            let given = params.password.expose_secret();
            if given != expected {
                return Err(AppError::DatabaseConnection(format!(
                    "Access denied for user '{}'@'{}' (using password: {})",
                    params.user,
                    params.host,
                    if given.is_empty() { "NO" } else { "YES" }
                )));
            }
        }

        Ok(Box::new(FakeConnection {
            state: Arc::clone(&self.state),
            database: None,
            closed: false,
        }))
    }
}

struct FakeConnection {
    state: Arc<FakeState>,
    database: Option<String>,
    closed: bool,
}

impl FakeConnection {
    async fn receive(&self, sql: &str) -> AppResult<()> {
        if self.closed {
            return Err(AppError::DatabaseConnection("connection is closed".into()));
        }
        self.state.log.lock().unwrap().push(sql.to_string());
        let delay = *self.state.query_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn table(&self, quoted: &str) -> AppResult<&FakeTable> {
        let db = self
            .database
            .as_deref()
            .ok_or_else(|| AppError::DatabaseQuery("No database selected".into()))?;
        let name = unquote(quoted)?;
        self.state
            .catalog
            .get(db)
            .and_then(|tables| tables.get(&name))
            .ok_or_else(|| AppError::DatabaseQuery(format!("Table '{}.{}' doesn't exist", db, name)))
    }
}

#[async_trait]
impl LiveConnection for FakeConnection {
    async fn execute(&mut self, sql: &str) -> AppResult<()> {
        self.receive(sql).await?;
        let quoted = sql
            .strip_prefix("USE ")
            .ok_or_else(|| AppError::DatabaseQuery(format!("unexpected statement: {}", sql)))?;
        let name = unquote(quoted)?;
        if !self.state.catalog.contains_key(&name) {
            return Err(AppError::DatabaseQuery(format!("Unknown database '{}'", name)));
        }
        self.database = Some(name);
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> AppResult<QueryOutput> {
        self.receive(sql).await?;

        if sql == "SHOW DATABASES" {
            let names = SYSTEM_SCHEMAS
                .iter()
                .map(|s| s.to_string())
                .chain(self.state.catalog.keys().cloned());
            return Ok(QueryOutput::new(
                vec!["Database".into()],
                names.map(|n| vec![CellValue::Text(n)]).collect(),
            ));
        }

        if sql == "SHOW TABLES" {
            let db = self
                .database
                .clone()
                .ok_or_else(|| AppError::DatabaseQuery("No database selected".into()))?;
            let rows = self.state.catalog[&db]
                .keys()
                .map(|t| vec![CellValue::Text(t.clone())])
                .collect();
            return Ok(QueryOutput::new(vec![format!("Tables_in_{}", db)], rows));
        }

        if let Some(quoted) = sql.strip_prefix("DESCRIBE ") {
            self.table(quoted)?;
            return Ok(FakeTable::describe());
        }

        if let Some(quoted) = sql.strip_prefix("SELECT COUNT(*) AS total FROM ") {
            let total = self.table(quoted)?.rows.len() as i64;
            return Ok(QueryOutput::new(
                vec!["total".into()],
                vec![vec![CellValue::Integer(total)]],
            ));
        }

        if let Some(rest) = sql.strip_prefix("SELECT * FROM ") {
            let (quoted, window) = rest
                .rsplit_once(" LIMIT ")
                .ok_or_else(|| AppError::DatabaseQuery(format!("unexpected statement: {}", sql)))?;
            let (limit, offset) = window
                .split_once(" OFFSET ")
                .and_then(|(l, o)| Some((l.parse::<usize>().ok()?, o.parse::<usize>().ok()?)))
                .ok_or_else(|| AppError::DatabaseQuery(format!("bad window: {}", window)))?;
            let rows: Vec<_> = self
                .table(quoted)?
                .rows
                .iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect();
            // Like the real driver, an empty result carries no column metadata.
            let columns = if rows.is_empty() {
                Vec::new()
            } else {
                vec!["id".into(), "label".into()]
            };
            return Ok(QueryOutput::new(columns, rows));
        }

        Err(AppError::DatabaseQuery(format!("unexpected statement: {}", sql)))
    }

    async fn close(&mut self) -> AppResult<()> {
        if self.closed {
            return Ok(());
        }
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseConnection("Lost connection to MySQL server".into()));
        }
        self.closed = true;
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn unquote(quoted: &str) -> AppResult<String> {
    quoted
        .strip_prefix('`')
        .and_then(|s| s.strip_suffix('`'))
        .map(|s| s.replace("``", "`"))
        .ok_or_else(|| AppError::DatabaseQuery(format!("unquoted identifier: {}", quoted)))
}

/// Secret store whose writes always fail.
pub struct FailingSecretStore;

#[async_trait]
impl SecretStore for FailingSecretStore {
    async fn get(&self, _key: &str) -> AppResult<Option<SecretString>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _secret: &SecretString) -> AppResult<()> {
        Err(AppError::Storage("keyring is locked".into()))
    }

    async fn delete(&self, _key: &str) -> AppResult<()> {
        Ok(())
    }

    fn backend_id(&self) -> &'static str {
        "failing"
    }
}
