//! Identifier validation and quoting.
//!
//! Database and table names reach the service from HTTP callers, so they are
//! validated and backtick-quoted before being spliced into a statement.

use crate::errors::{AppError, AppResult};

/// MySQL's identifier length limit for schemas and tables.
const MAX_IDENTIFIER_LEN: usize = 64;

/// Validates and quotes SQL identifiers.
pub struct SqlValidator;

impl SqlValidator {
    /// Checks that `name` can be used as a schema or table name.
    ///
    /// # Errors
    /// Returns `AppError::Validation` for empty, over-long or NUL-containing names.
    pub fn validate_identifier(kind: &str, name: &str) -> AppResult<()> {
        if name.trim().is_empty() {
            return Err(AppError::Validation(format!("{} name must not be empty", kind)));
        }
        if name.chars().count() > MAX_IDENTIFIER_LEN {
            return Err(AppError::Validation(format!(
                "{} name exceeds {} characters",
                kind, MAX_IDENTIFIER_LEN
            )));
        }
        if name.contains('\0') {
            return Err(AppError::Validation(format!(
                "{} name must not contain NUL",
                kind
            )));
        }
        Ok(())
    }

    /// Validates `name` and returns it wrapped in backticks, with embedded
    /// backticks doubled.
    pub fn quote_identifier(kind: &str, name: &str) -> AppResult<String> {
        Self::validate_identifier(kind, name)?;
        Ok(format!("`{}`", name.replace('`', "``")))
    }
}
