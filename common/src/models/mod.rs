//! Shared data models.

pub mod connection;
pub mod database;
pub mod listing;
pub mod query;

pub use connection::{ConnectionConfig, CreateConnectionRequest};
pub use database::{is_system_schema, ColumnInfo, DatabaseInfo, TableInfo, SYSTEM_SCHEMAS};
pub use listing::{ColumnListing, DatabaseListing, TableListing, TablePage};
pub use query::{CellValue, QueryOutput, TableRow, TableRows};
