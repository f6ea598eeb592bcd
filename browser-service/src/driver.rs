//! Database driver seam.
//!
//! The registry talks to servers only through [`Connector`] and
//! [`LiveConnection`]. [`MySqlConnector`] is the production implementation,
//! one `sqlx::MySqlConnection` per handle.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, TypeInfo, ValueRef};

use common::errors::{AppError, AppResult};
use common::models::{CellValue, QueryOutput};

/// Everything needed to open a connection.
#[derive(Debug)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new physical connection.
    ///
    /// # Errors
    /// `AppError::DatabaseConnection` carrying the driver's message.
    async fn connect(&self, params: &ConnectParams) -> AppResult<Box<dyn LiveConnection>>;
}

/// An open, stateful session with a server.
#[async_trait]
pub trait LiveConnection: Send {
    /// Runs a statement that returns no rows (`USE`).
    async fn execute(&mut self, sql: &str) -> AppResult<()>;

    /// Runs a statement and collects its rows.
    async fn query(&mut self, sql: &str) -> AppResult<QueryOutput>;

    /// Closes the session. Closing twice is a no-op.
    async fn close(&mut self) -> AppResult<()>;
}

/// [`Connector`] backed by sqlx's MySQL driver.
#[derive(Debug, Default, Clone)]
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }

    fn connect_options(params: &ConnectParams) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&params.host)
            .port(params.port)
            .username(&params.user)
            .password(params.password.expose_secret())
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self, params: &ConnectParams) -> AppResult<Box<dyn LiveConnection>> {
        let conn = Self::connect_options(params)
            .connect()
            .await
            .map_err(|e| AppError::DatabaseConnection(driver_message(e)))?;
        Ok(Box::new(MySqlLiveConnection { conn: Some(conn) }))
    }
}

/// A single MySQL session.
pub struct MySqlLiveConnection {
    conn: Option<MySqlConnection>,
}

impl MySqlLiveConnection {
    fn conn(&mut self) -> AppResult<&mut MySqlConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| AppError::DatabaseConnection("connection is closed".into()))
    }
}

#[async_trait]
impl LiveConnection for MySqlLiveConnection {
    async fn execute(&mut self, sql: &str) -> AppResult<()> {
        // USE is not available through the prepared statement protocol.
        let conn = self.conn()?;
        conn.execute(sqlx::raw_sql(sql)).await.map_err(statement_error)?;
        Ok(())
    }

    async fn query(&mut self, sql: &str) -> AppResult<QueryOutput> {
        let conn = self.conn()?;
        let rows = conn
            .fetch_all(sqlx::raw_sql(sql))
            .await
            .map_err(statement_error)?;
        Ok(to_output(&rows))
    }

    async fn close(&mut self) -> AppResult<()> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .await
                .map_err(|e| AppError::DatabaseConnection(driver_message(e))),
            None => Ok(()),
        }
    }
}

/// Whether `err` means the session itself is unusable, as opposed to one
/// statement failing on a healthy session.
pub fn is_connection_lost(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

/// Lost sessions surface as connection errors, everything else as query
/// errors.
fn statement_error(err: sqlx::Error) -> AppError {
    if is_connection_lost(&err) {
        AppError::DatabaseConnection(driver_message(err))
    } else {
        AppError::DatabaseQuery(driver_message(err))
    }
}

/// The server's own text where there is one, without sqlx's wrapping.
fn driver_message(err: sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}

fn to_output(rows: &[MySqlRow]) -> QueryOutput {
    let columns = rows
        .first()
        .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|idx| cell_value(row, idx)).collect())
        .collect();
    QueryOutput { columns, rows }
}

/// Maps one cell to a [`CellValue`] by the column's reported type.
///
/// Results arrive over the text protocol, so anything without a dedicated
/// decoder is read back as its raw bytes.
fn cell_value(row: &MySqlRow, idx: usize) -> CellValue {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return CellValue::Null,
        Ok(_) => {}
        Err(_) => return CellValue::Null,
    }

    let type_name = row.column(idx).type_info().name().to_ascii_uppercase();
    let typed = match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(idx).ok().map(CellValue::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "YEAR" => {
            row.try_get::<i64, _>(idx).ok().map(CellValue::Integer)
        }
        t if t.ends_with(" UNSIGNED") => row.try_get::<u64, _>(idx).ok().map(CellValue::Unsigned),
        "FLOAT" | "DOUBLE" | "REAL" => row.try_get::<f64, _>(idx).ok().map(CellValue::Float),
        "JSON" => row
            .try_get::<serde_json::Value, _>(idx)
            .ok()
            .map(CellValue::Json),
        _ => None,
    };
    if let Some(value) = typed {
        return value;
    }

    if let Ok(text) = row.try_get::<String, _>(idx) {
        return CellValue::Text(text);
    }
    match row.try_get_unchecked::<Vec<u8>, _>(idx) {
        Ok(bytes) => CellValue::from_bytes(&bytes),
        Err(e) => {
            tracing::debug!(column = idx, column_type = %type_name, error = %e, "undecodable cell");
            CellValue::Null
        }
    }
}
