//! Server version detection and SQL dialect selection.
//!
//! `ALTER USER ... IDENTIFIED BY` replaced `SET PASSWORD ... = PASSWORD(...)`
//! in MySQL 5.7.6. The dialect is decided once per connection and threaded
//! through statement construction.

use crate::constants::MODERN_PASSWORD_SYNTAX_VERSION;
use crate::error::{ProviderError, Result};
use crate::security::{quote_account, quote_string_literal};
use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use std::fmt;

static LEADING_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*v?(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("valid version regex"));

/// SQL syntax variant selected from the server version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Before 5.7.6: `SET PASSWORD FOR ... = PASSWORD(...)`
    Legacy,
    /// 5.7.6 and later: `ALTER USER ... IDENTIFIED BY ...`
    Modern,
}

impl Dialect {
    /// Select the dialect for a server version.
    pub fn for_version(version: &Version) -> Self {
        let release = Version::new(version.major, version.minor, version.patch);
        if release < MODERN_PASSWORD_SYNTAX_VERSION {
            Self::Legacy
        } else {
            Self::Modern
        }
    }

    /// Build the statement that sets `user@host`'s password.
    pub fn set_password_statement(&self, user: &str, host: &str, password: &str) -> String {
        let account = quote_account(user, host);
        let literal = quote_string_literal(password);
        match self {
            Self::Legacy => format!("SET PASSWORD FOR {} = PASSWORD({})", account, literal),
            Self::Modern => format!("ALTER USER {} IDENTIFIED BY {}", account, literal),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Modern => write!(f, "modern"),
        }
    }
}

/// Parse a server-reported version string.
///
/// Only the leading `major[.minor[.patch]]` is significant; vendor suffixes
/// such as `-log`, `-MariaDB` or `-0ubuntu0.20.04.1` are ignored and missing
/// components count as zero.
pub fn parse_server_version(raw: &str) -> Result<Version> {
    let caps = LEADING_VERSION
        .captures(raw)
        .ok_or_else(|| ProviderError::version_parse(format!("unrecognized version string '{}'", raw)))?;

    let component = |idx: usize| -> Result<u64> {
        caps.get(idx)
            .map(|m| m.as_str().parse::<u64>())
            .transpose()
            .map(|v| v.unwrap_or(0))
            .map_err(|e| ProviderError::version_parse(format!("version '{}': {}", raw, e)))
    };

    Ok(Version::new(component(1)?, component(2)?, component(3)?))
}
