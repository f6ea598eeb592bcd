//! Per-call result envelopes for the browse operations.
//!
//! A failed lookup yields an empty result with `error` set instead of an
//! error response, so one broken branch of the tree does not take its
//! siblings down with it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::database::{ColumnInfo, DatabaseInfo, TableInfo};
use super::query::{CellValue, TableRows};

/// Databases of one connection.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DatabaseListing {
    pub connection_id: String,
    pub databases: Vec<DatabaseInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DatabaseListing {
    pub fn from_result(
        connection_id: &str,
        result: Result<Vec<DatabaseInfo>, impl std::fmt::Display>,
    ) -> Self {
        let (databases, error) = split(result);
        Self {
            connection_id: connection_id.to_string(),
            databases,
            error,
        }
    }
}

/// Tables of one database.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TableListing {
    pub connection_id: String,
    pub database_name: String,
    pub tables: Vec<TableInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableListing {
    pub fn from_result(
        connection_id: &str,
        database_name: &str,
        result: Result<Vec<TableInfo>, impl std::fmt::Display>,
    ) -> Self {
        let (tables, error) = split(result);
        Self {
            connection_id: connection_id.to_string(),
            database_name: database_name.to_string(),
            tables,
            error,
        }
    }
}

/// Columns of one table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ColumnListing {
    pub connection_id: String,
    pub database_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ColumnListing {
    pub fn from_result(
        connection_id: &str,
        database_name: &str,
        table_name: &str,
        result: Result<Vec<ColumnInfo>, impl std::fmt::Display>,
    ) -> Self {
        let (columns, error) = split(result);
        Self {
            connection_id: connection_id.to_string(),
            database_name: database_name.to_string(),
            table_name: table_name.to_string(),
            columns,
            error,
        }
    }
}

/// One page of rows from one table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TablePage {
    pub connection_id: String,
    pub database_name: String,
    pub table_name: String,
    pub page: u64,
    pub page_size: u64,
    pub column_names: Vec<String>,
    pub rows: Vec<BTreeMap<String, CellValue>>,
    pub total_rows: u64,
    pub total_pages: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TablePage {
    pub fn from_result(
        connection_id: &str,
        database_name: &str,
        table_name: &str,
        page: u64,
        page_size: u64,
        result: Result<TableRows, impl std::fmt::Display>,
    ) -> Self {
        let mut out = Self {
            connection_id: connection_id.to_string(),
            database_name: database_name.to_string(),
            table_name: table_name.to_string(),
            page,
            page_size,
            column_names: Vec::new(),
            rows: Vec::new(),
            total_rows: 0,
            total_pages: 0,
            error: None,
        };
        match result {
            Ok(rows) => {
                out.page = rows.page;
                out.page_size = rows.page_size;
                out.column_names = rows.column_names;
                out.rows = rows.rows;
                out.total_rows = rows.total_rows;
                out.total_pages = rows.total_pages;
            }
            Err(e) => out.error = Some(e.to_string()),
        }
        out
    }
}

fn split<T>(result: Result<Vec<T>, impl std::fmt::Display>) -> (Vec<T>, Option<String>) {
    match result {
        Ok(items) => (items, None),
        Err(e) => (Vec::new(), Some(e.to_string())),
    }
}
