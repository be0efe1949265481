//! Centralized constants for the MySQL provider core.
//!
//! This module contains all magic numbers and default values used throughout
//! the codebase, making them easy to find, understand, and modify.

use std::time::Duration;

// =============================================================================
// Connection Constants
// =============================================================================

/// Default connect-retry budget in seconds.
pub const DEFAULT_CONNECT_RETRY_TIMEOUT_SECS: u64 = 300;

/// Default connect-retry budget as Duration.
pub const DEFAULT_CONNECT_RETRY_TIMEOUT: Duration =
    Duration::from_secs(DEFAULT_CONNECT_RETRY_TIMEOUT_SECS);

/// Default TCP port for MySQL when the endpoint omits one.
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Default TLS setting (`MYSQL_TLS_CONFIG`).
pub const DEFAULT_TLS_CONFIG: &str = "false";

/// Default authentication plugin.
pub const DEFAULT_AUTHENTICATION_PLUGIN: &str = "native";

/// Default host for user-password resources.
pub const DEFAULT_USER_HOST: &str = "localhost";

// =============================================================================
// Retry Backoff Constants
// =============================================================================

/// First delay between connection attempts.
pub const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on the delay between connection attempts.
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Backoff multiplier between consecutive attempts.
pub const RETRY_MULTIPLIER: f64 = 2.0;

// =============================================================================
// Version Gate Constants
// =============================================================================

/// First server version supporting `ALTER USER ... IDENTIFIED BY`.
pub const MODERN_PASSWORD_SYNTAX_VERSION: semver::Version = semver::Version::new(5, 7, 6);

/// Scalar query returning the engine version used for dialect selection.
pub const ENGINE_VERSION_QUERY: &str = "SELECT @@GLOBAL.innodb_version";

/// Scalar query returning the full server version banner.
pub const SERVER_VERSION_QUERY: &str = "SELECT @@GLOBAL.version";

// =============================================================================
// Federated Authentication Constants
// =============================================================================

/// Azure AD authority host for the client-credentials grant.
pub const AZURE_AD_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Token audience for Azure Database for MySQL.
pub const AZURE_MYSQL_AUDIENCE: &str = "https://ossrdbms-aad.database.windows.net/.default";

/// Timeout for a single token exchange request.
pub const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Logging Constants
// =============================================================================

/// Default truncation length for statement logging.
pub const LOG_STATEMENT_TRUNCATE_LENGTH: usize = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_durations() {
        assert_eq!(DEFAULT_CONNECT_RETRY_TIMEOUT, Duration::from_secs(300));
        assert!(RETRY_INITIAL_DELAY < RETRY_MAX_DELAY);
    }

    #[test]
    fn test_modern_syntax_threshold() {
        assert_eq!(MODERN_PASSWORD_SYNTAX_VERSION.to_string(), "5.7.6");
    }
}
