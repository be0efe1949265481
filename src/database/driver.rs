//! The SQL driver boundary.
//!
//! The connection manager only needs to open a handle, probe it, run scalar
//! queries and statements, and tune the pool once. Anything implementing
//! these traits can back it; [`super::MySqlDriver`] is the production
//! implementation and tests substitute their own.

use super::dialer::Dialer;
use crate::config::{ConnectionConfig, PasswordExchange, TlsMode, Transport};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Connection string derived from a [`ConnectionConfig`].
///
/// `Display` renders the go-sql-driver style form with the secret redacted,
/// suitable for logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Dsn {
    pub user: String,
    pub password: String,
    pub transport: Transport,
    pub address: String,
    pub tls: TlsMode,
    /// Rendered for logs only: `mysql_async` always offers
    /// `mysql_native_password` and cannot switch it off.
    pub allow_native_passwords: bool,
    /// Enables `mysql_clear_password` (required to present a bearer token).
    pub allow_cleartext_passwords: bool,
}

impl Dsn {
    /// Format the connection string for `config`.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            user: config.username().to_string(),
            password: config.secret().to_string(),
            transport: config.transport(),
            address: config.endpoint().to_string(),
            tls: config.tls(),
            allow_native_passwords: config.password_exchange() == PasswordExchange::Native,
            allow_cleartext_passwords: config.password_exchange() == PasswordExchange::Cleartext,
        }
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:***@{}({})/?tls={}&allowNativePasswords={}&allowCleartextPasswords={}",
            self.user,
            self.transport,
            self.address,
            self.tls,
            self.allow_native_passwords,
            self.allow_cleartext_passwords
        )
    }
}

impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dsn({})", self)
    }
}

/// Opens connection handles.
#[async_trait]
pub trait SqlDriver: Send + Sync + 'static {
    /// The handle type produced by [`SqlDriver::open`].
    type Connection: SqlConnection;

    /// Create a handle for `dsn`, dialing TCP endpoints through `dialer`.
    ///
    /// Opening need not touch the network; [`SqlConnection::ping`] is the
    /// liveness check.
    async fn open(&self, dsn: &Dsn, dialer: &Dialer) -> Result<Self::Connection>;
}

/// A shared, pooled connection handle.
#[async_trait]
pub trait SqlConnection: Send + Sync + 'static {
    /// Minimal round trip confirming the server is usable.
    async fn ping(&self) -> Result<()>;

    /// Run a query and return the first column of the first row.
    async fn query_scalar(&self, sql: &str) -> Result<Option<String>>;

    /// Execute a statement and return the affected row count.
    async fn exec(&self, sql: &str) -> Result<u64>;

    /// Ceiling on how long a pooled connection is reused.
    fn set_max_lifetime(&self, lifetime: Option<Duration>);

    /// Maximum number of concurrently open connections.
    fn set_max_open(&self, max: Option<usize>);

    /// Release server-side resources.
    async fn close(&self) -> Result<()>;
}
