//! Catalog models: databases, tables and columns as reported by the server.
//!
//! These are recomputed on every request and never persisted.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Built-in schemas that are never listed.
pub const SYSTEM_SCHEMAS: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

/// Returns true for MySQL's built-in schemas.
pub fn is_system_schema(name: &str) -> bool {
    SYSTEM_SCHEMAS.contains(&name)
}

/// A user database on a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Connection the database was listed through.
    pub connection_id: String,
}

/// A table inside a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Owning database.
    pub database_name: String,
    /// Connection the table was listed through.
    pub connection_id: String,
}

/// One row of `DESCRIBE <table>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ColumnInfo {
    /// Column name (`Field`).
    pub name: String,
    /// Declared type, e.g. `varchar(255)` (`Type`).
    #[serde(rename = "type")]
    pub data_type: String,
    /// Whether NULL is allowed (`Null` is `YES`).
    pub nullable: bool,
    /// Index membership: `PRI`, `UNI`, `MUL` or empty (`Key`).
    pub key: String,
    /// Default value (`Default`).
    pub default: Option<String>,
    /// Extra attributes such as `auto_increment` (`Extra`).
    pub extra: String,
}
