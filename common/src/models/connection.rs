//! Connection configuration models.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Default MySQL port.
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Non-secret connection parameters.
///
/// The password is never part of this value; it lives in the secret store
/// keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConnectionConfig {
    /// Unique connection identifier, fixed at creation.
    pub id: String,
    /// Connection display name.
    pub name: String,
    /// Server host or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login user.
    pub user: String,
}

/// Request body for registering a new connection.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateConnectionRequest {
    /// Connection display name.
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    /// Server host or IP address.
    #[validate(length(min = 1, max = 255, message = "Host must be 1-255 characters"))]
    pub host: String,
    /// Server port (3306 when omitted).
    #[serde(default = "default_port")]
    #[validate(range(min = 1, message = "Port must be within 1-65535"))]
    pub port: u16,
    /// Login user.
    #[validate(length(min = 1, max = 128, message = "User must be 1-128 characters"))]
    pub user: String,
    /// Login password, may be empty.
    #[serde(default = "empty_password")]
    #[schema(value_type = String, format = Password)]
    pub password: SecretString,
}

fn default_port() -> u16 {
    DEFAULT_MYSQL_PORT
}

fn empty_password() -> SecretString {
    SecretString::from(String::new())
}

impl CreateConnectionRequest {
    /// Builds a request from its parts.
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            user: user.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Runs declarative validation plus the checks the derive cannot express.
    pub fn check(&self) -> Result<(), crate::errors::AppError> {
        self.validate()?;
        for (field, value) in [("name", &self.name), ("host", &self.host), ("user", &self.user)] {
            if value.trim().is_empty() {
                return Err(crate::errors::AppError::Validation(format!(
                    "{}: must not be blank",
                    field
                )));
            }
        }
        if self.host.chars().any(char::is_whitespace) {
            return Err(crate::errors::AppError::Validation(
                "host: must not contain whitespace".into(),
            ));
        }
        Ok(())
    }

    /// Converts the request into a config under `id`, leaving the password behind.
    pub fn to_config(&self, id: String) -> ConnectionConfig {
        ConnectionConfig {
            id,
            name: self.name.trim().to_string(),
            host: self.host.trim().to_string(),
            port: self.port,
            user: self.user.trim().to_string(),
        }
    }
}
