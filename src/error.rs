//! Error types for the MySQL provider core.
//!
//! Errors are grouped by the phase that produced them so callers can tell a
//! bad configuration apart from an unreachable server or a failed statement.

use std::sync::Arc;
use thiserror::Error;

/// Shared, cloneable error source.
pub type ErrorSource = Arc<dyn std::error::Error + Send + Sync>;

/// Domain-specific errors for the provider core.
///
/// The type is `Clone` so that a terminal connection failure can be handed to
/// every caller waiting on the same establishment.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identity provider token exchange failed
    #[error("Credential exchange failed: {message}")]
    Credential {
        message: String,
        #[source]
        source: Option<ErrorSource>,
    },

    /// Opening or probing a connection failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<ErrorSource>,
    },

    /// Connect-retry budget exhausted
    #[error("could not connect to server after {timeout_secs}s: {last_error}")]
    ConnectTimeout {
        timeout_secs: u64,
        last_error: Box<ProviderError>,
    },

    /// The host cancelled the operation
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Statement or query execution error
    #[error("Query execution error: {message}")]
    Query {
        message: String,
        sql_error_code: Option<u16>,
    },

    /// Server version string could not be parsed
    #[error("could not determine server version: {0}")]
    VersionParse(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a credential exchange error.
    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a credential exchange error with a source.
    pub fn credential_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Credential {
            message: msg.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection error with a source.
    pub fn connection_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: msg.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Create a connect timeout error wrapping the last attempt's failure.
    pub fn connect_timeout(timeout_secs: u64, last_error: ProviderError) -> Self {
        Self::ConnectTimeout {
            timeout_secs,
            last_error: Box::new(last_error),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create a query execution error.
    pub fn query_error(msg: impl Into<String>) -> Self {
        Self::Query {
            message: msg.into(),
            sql_error_code: None,
        }
    }

    /// Create a query execution error with the server's error code.
    pub fn query_error_with_code(msg: impl Into<String>, code: u16) -> Self {
        Self::Query {
            message: msg.into(),
            sql_error_code: Some(code),
        }
    }

    /// Create a version parse error.
    pub fn version_parse(msg: impl Into<String>) -> Self {
        Self::VersionParse(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Prefix the message with the operation that failed.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            Self::Query {
                message,
                sql_error_code,
            } => Self::Query {
                message: format!("{}: {}", context, message),
                sql_error_code,
            },
            Self::Connection { message, source } => Self::Connection {
                message: format!("{}: {}", context, message),
                source,
            },
            Self::Credential { message, source } => Self::Credential {
                message: format!("{}: {}", context, message),
                source,
            },
            Self::Internal(message) => Self::Internal(format!("{}: {}", context, message)),
            other => other,
        }
    }

    /// Check if this error is transient and may succeed on retry.
    ///
    /// Only connection-phase failures qualify; everything after a connection
    /// is established is single-shot.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Check if this error was caused by host cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Get a user-friendly suggestion for how to fix this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => Some("Check the provider configuration and environment variables"),
            Self::Credential { .. } => {
                Some("Verify the AAD client id, tenant id and client secret")
            }
            Self::Connection { .. } => Some("Check the endpoint, proxy and network connectivity"),
            Self::ConnectTimeout { .. } => Some(
                "The server did not become reachable in time; raise connect_retry_timeout_sec \
                 or check that the server is provisioned",
            ),
            Self::VersionParse(_) => Some("Check that the server reports a MySQL-compatible version"),
            _ => None,
        }
    }
}

impl From<mysql_async::Error> for ProviderError {
    fn from(e: mysql_async::Error) -> Self {
        use mysql_async::Error;

        match e {
            Error::Server(ref server) => {
                let code = server.code;
                ProviderError::query_error_with_code(server.message.clone(), code)
            }
            Error::Url(ref url) => ProviderError::config(format!("Invalid connection URL: {}", url)),
            Error::Io(_) => ProviderError::connection_with_source("IO error", e),
            Error::Driver(_) => ProviderError::connection_with_source("Driver error", e),
            Error::Other(_) => ProviderError::connection_with_source("Connection failed", e),
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        ProviderError::connection_with_source(format!("IO error: {}", e.kind()), e)
    }
}
