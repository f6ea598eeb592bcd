//! Query result models.
//!
//! Rows coming back from the server have no static shape, so every cell is a
//! tagged [`CellValue`] and column order is carried separately.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    /// SQL NULL.
    Null,
    /// `BOOLEAN` / `TINYINT(1)`.
    Bool(bool),
    /// Signed integer types.
    Integer(i64),
    /// Unsigned integer types.
    Unsigned(u64),
    /// `FLOAT` / `DOUBLE`.
    Float(f64),
    /// Everything with a textual representation: strings, decimals, dates.
    Text(String),
    /// `JSON` columns, kept structured.
    Json(serde_json::Value),
}

impl CellValue {
    /// Builds a text cell from raw bytes; non UTF-8 payloads become `0x…` hex.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => CellValue::Text(text.to_string()),
            Err(_) => {
                let mut hex = String::with_capacity(2 + bytes.len() * 2);
                hex.push_str("0x");
                for b in bytes {
                    hex.push_str(&format!("{:02x}", b));
                }
                CellValue::Text(hex)
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Textual rendering, `None` for NULL.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            CellValue::Integer(i) => Some(i.to_string()),
            CellValue::Unsigned(u) => Some(u.to_string()),
            CellValue::Float(f) => Some(f.to_string()),
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Json(v) => Some(v.to_string()),
        }
    }

    /// Non-negative integer view, used for counts.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            CellValue::Integer(i) => u64::try_from(*i).ok(),
            CellValue::Unsigned(u) => Some(*u),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Result of one statement: ordered column names and positional rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl QueryOutput {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { columns, rows }
    }

    /// Position of `name`, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Cell `name` of row `row`.
    pub fn value(&self, row: usize, name: &str) -> Option<&CellValue> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.get(idx)
    }

    /// Text of cell `name` in row `row`; NULL and missing map to `None`.
    pub fn text(&self, row: usize, name: &str) -> Option<String> {
        self.value(row, name).and_then(CellValue::as_text)
    }

    /// The first column of every row as text, skipping NULLs.
    pub fn first_column(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|r| r.first().and_then(CellValue::as_text))
            .collect()
    }

    /// The first cell of the first row as a count.
    pub fn scalar_u64(&self) -> Option<u64> {
        self.rows.first()?.first()?.as_u64()
    }

    /// Rows keyed by column name.
    pub fn into_records(self) -> Vec<TableRow> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect())
            .collect()
    }
}

/// One row keyed by column name.
pub type TableRow = BTreeMap<String, CellValue>;

/// One page of a table's rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TableRows {
    /// Zero-based page index.
    pub page: u64,
    /// Rows per page.
    pub page_size: u64,
    /// Column names in table order.
    pub column_names: Vec<String>,
    /// Rows of this page.
    pub rows: Vec<BTreeMap<String, CellValue>>,
    /// Rows in the whole table.
    pub total_rows: u64,
    /// `ceil(total_rows / page_size)`.
    pub total_pages: u64,
}

/// Number of pages needed for `total` rows.
pub fn page_count(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}
