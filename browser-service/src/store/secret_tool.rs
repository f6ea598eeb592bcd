//! Secret Service backend driven through the `secret-tool` command.
//!
//! Works with GNOME Keyring, KDE Wallet and any other Secret Service
//! implementation. Each secret is stored with two attributes: the
//! application name and the store key.

use std::process::Stdio;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use common::errors::{AppError, AppResult};

use super::SecretStore;

const SECRET_TOOL: &str = "secret-tool";

pub struct SecretToolStore {
    application: String,
}

impl SecretToolStore {
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
        }
    }

    /// Returns true when the `secret-tool` binary can be spawned.
    pub async fn is_available(&self) -> bool {
        match Command::new(SECRET_TOOL)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "secret-tool not found");
                false
            }
        }
    }

    fn attribute_args(&self, key: &str) -> Vec<String> {
        vec![
            "application".to_string(),
            self.application.clone(),
            "key".to_string(),
            key.to_string(),
        ]
    }

    fn spawn_error(e: std::io::Error) -> AppError {
        AppError::Storage(format!("Failed to run secret-tool: {}", e))
    }
}

/// Interprets the outcome of `secret-tool lookup`.
///
/// A miss exits non-zero with nothing on stderr. A locked or unreachable
/// keyring exits non-zero with a message, which is an error.
fn lookup_result(
    key: &str,
    success: bool,
    stdout: Vec<u8>,
    stderr: &[u8],
) -> AppResult<Option<SecretString>> {
    if !success {
        let stderr = String::from_utf8_lossy(stderr);
        if stderr.trim().is_empty() {
            return Ok(None);
        }
        return Err(AppError::Storage(format!(
            "secret-tool lookup failed: {}",
            stderr.trim()
        )));
    }

    let mut value = String::from_utf8(stdout)
        .map_err(|_| AppError::Storage(format!("Secret {} is not valid UTF-8", key)))?;
    if value.ends_with('\n') {
        value.pop();
    }
    Ok(Some(SecretString::from(value)))
}

#[async_trait]
impl SecretStore for SecretToolStore {
    async fn get(&self, key: &str) -> AppResult<Option<SecretString>> {
        let output = Command::new(SECRET_TOOL)
            .arg("lookup")
            .args(self.attribute_args(key))
            .output()
            .await
            .map_err(Self::spawn_error)?;

        lookup_result(key, output.status.success(), output.stdout, &output.stderr)
    }

    async fn set(&self, key: &str, secret: &SecretString) -> AppResult<()> {
        let label = format!("{}: {}", self.application, key);
        let mut child = Command::new(SECRET_TOOL)
            .arg("store")
            .arg("--label")
            .arg(&label)
            .args(self.attribute_args(key))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(Self::spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(secret.expose_secret().as_bytes())
                .await
                .map_err(|e| AppError::Storage(format!("Failed to write secret: {}", e)))?;
        }

        let output = child.wait_with_output().await.map_err(Self::spawn_error)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Storage(format!(
                "secret-tool store failed: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let output = Command::new(SECRET_TOOL)
            .arg("clear")
            .args(self.attribute_args(key))
            .output()
            .await
            .map_err(Self::spawn_error)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // `clear` on a missing item is not an error for callers.
            if !stderr.trim().is_empty() {
                return Err(AppError::Storage(format!(
                    "secret-tool clear failed: {}",
                    stderr.trim()
                )));
            }
        }
        Ok(())
    }

    fn backend_id(&self) -> &'static str {
        "secret-tool"
    }
}
