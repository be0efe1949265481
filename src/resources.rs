//! Resource handlers built on the connection core.
//!
//! Only `user_password` lives here: it is the one handler whose statement
//! depends on the server version.

use crate::constants::{DEFAULT_USER_HOST, LOG_STATEMENT_TRUNCATE_LENGTH};
use crate::database::{ConnectionManager, SqlConnection, SqlDriver};
use crate::error::{ProviderError, Result};
use crate::shutdown::run_until_cancelled;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// State recorded for a `user_password` resource.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPasswordState {
    /// `user@host`
    pub id: String,
    pub user: String,
    pub host: String,
    /// Generated password; only observable at creation
    pub password: String,
}

impl fmt::Debug for UserPasswordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPasswordState")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("host", &self.host)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Sets a generated password on an existing account.
pub struct UserPassword<'a, D: SqlDriver> {
    manager: &'a ConnectionManager<D>,
}

impl<'a, D: SqlDriver> UserPassword<'a, D> {
    /// Create a handler over the shared connection.
    pub fn new(manager: &'a ConnectionManager<D>) -> Self {
        Self { manager }
    }

    /// Generate a password for `user@host` and apply it.
    ///
    /// `host` defaults to `localhost`.
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        user: &str,
        host: Option<&str>,
    ) -> Result<UserPasswordState> {
        if user.is_empty() {
            return Err(ProviderError::config("user must not be an empty string"));
        }
        let host = host.unwrap_or(DEFAULT_USER_HOST);

        let conn = self.manager.get_connection(cancel).await?;
        let dialect = self.manager.dialect(cancel).await?;

        let password = Uuid::new_v4().to_string();
        let statement = dialect.set_password_statement(user, host, &password);
        debug!(
            "Executing {} statement: {}",
            dialect,
            truncate_for_log(&redact(&statement, &password))
        );

        run_until_cancelled(cancel, conn.exec(&statement))
            .await
            .ok_or_else(|| ProviderError::cancelled("setting password cancelled by host"))?
            .map_err(|e| e.with_context("failed to set password"))?;

        let id = format!("{}@{}", user, host);
        info!("Set password for {}", id);

        Ok(UserPasswordState {
            id,
            user: user.to_string(),
            host: host.to_string(),
            password,
        })
    }

    /// Refresh state; a password cannot be read back, so the state is kept.
    pub async fn read(&self, state: UserPasswordState) -> Result<UserPasswordState> {
        Ok(state)
    }

    /// Remove the resource; nothing happens server side.
    pub async fn delete(&self, state: &UserPasswordState) -> Result<()> {
        debug!("Dropping user_password {} from state", state.id);
        Ok(())
    }
}

fn redact(statement: &str, secret: &str) -> String {
    statement.replace(secret, "***")
}

fn truncate_for_log(statement: &str) -> String {
    if statement.chars().count() > LOG_STATEMENT_TRUNCATE_LENGTH {
        let truncated: String = statement.chars().take(LOG_STATEMENT_TRUNCATE_LENGTH).collect();
        format!("{}...", truncated)
    } else {
        statement.to_string()
    }
}
