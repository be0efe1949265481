//! Lazily established, shared database connection.
//!
//! The first caller establishes the connection (retrying while the server is
//! still coming up); concurrent callers wait for that single attempt and
//! every later caller gets the cached handle.

use super::dialer::Dialer;
use super::driver::{Dsn, SqlConnection, SqlDriver};
use super::version::{parse_server_version, Dialect};
use crate::config::ConnectionConfig;
use crate::constants::{ENGINE_VERSION_QUERY, SERVER_VERSION_QUERY};
use crate::error::{ProviderError, Result};
use crate::resilience::{retry_until_deadline, RetryConfig};
use parking_lot::RwLock;
use semver::Version;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Lifecycle of the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No establishment has started (or the last one was cancelled).
    Unopened,
    /// An establishment is in progress.
    Opening,
    /// The connection is established; terminal.
    Open,
    /// Establishment failed for good; terminal.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Unopened => write!(f, "unopened"),
            ConnectionState::Opening => write!(f, "opening"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// An established connection and the facts memoized against it.
struct Established<C> {
    conn: Arc<C>,
    version: OnceCell<Version>,
}

/// Owns the single shared connection for a configured provider.
pub struct ConnectionManager<D: SqlDriver> {
    config: ConnectionConfig,
    dialer: Dialer,
    driver: D,
    retry: RetryConfig,
    // Terminal failures are stored as values so that every caller sees them.
    established: OnceCell<std::result::Result<Established<D::Connection>, ProviderError>>,
    state: RwLock<ConnectionState>,
}

impl<D: SqlDriver> fmt::Debug for ConnectionManager<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("dialer", &self.dialer)
            .field("retry", &self.retry)
            .field("state", &self.state())
            .finish()
    }
}

/// Resets the state when an establishment is abandoned mid-flight.
struct OpeningGuard<'a> {
    state: &'a RwLock<ConnectionState>,
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.write();
        if *state == ConnectionState::Opening {
            *state = ConnectionState::Unopened;
        }
    }
}

impl<D: SqlDriver> ConnectionManager<D> {
    /// Create a manager; nothing is dialed until the first caller asks.
    pub fn new(config: ConnectionConfig, dialer: Dialer, driver: D) -> Self {
        let retry = RetryConfig::connection(config.connect_retry_timeout());
        Self {
            config,
            dialer,
            driver,
            retry,
            established: OnceCell::new(),
            state: RwLock::new(ConnectionState::Unopened),
        }
    }

    /// Override the backoff policy (the budget stays as configured unless changed here).
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get the dialer connections are made through.
    pub fn dialer(&self) -> &Dialer {
        &self.dialer
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Get the shared connection, establishing it on first use.
    ///
    /// Concurrent first callers share one establishment. A terminal failure
    /// is returned to every current and future caller. Cancelling `cancel`
    /// returns [`ProviderError::Cancelled`]; a cancelled establishment is not
    /// remembered, so a later caller starts over.
    pub async fn get_connection(&self, cancel: &CancellationToken) -> Result<Arc<D::Connection>> {
        Ok(self.established(cancel).await?.conn.clone())
    }

    async fn established(&self, cancel: &CancellationToken) -> Result<&Established<D::Connection>> {
        if let Some(outcome) = self.established.get() {
            return outcome.as_ref().map_err(Clone::clone);
        }

        let init = self.established.get_or_try_init(|| async {
            self.set_state(ConnectionState::Opening);
            let _guard = OpeningGuard { state: &self.state };

            match self.establish(cancel).await {
                Ok(established) => {
                    self.set_state(ConnectionState::Open);
                    Ok(Ok(established))
                }
                Err(e) if e.is_cancelled() => {
                    self.set_state(ConnectionState::Unopened);
                    Err(e)
                }
                Err(e) => {
                    error!("Connection establishment failed: {}", e);
                    self.set_state(ConnectionState::Failed);
                    Ok(Err(e))
                }
            }
        });

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ProviderError::cancelled("waiting for connection cancelled by host"));
            }
            outcome = init => outcome?,
        };

        outcome.as_ref().map_err(Clone::clone)
    }

    async fn establish(&self, cancel: &CancellationToken) -> Result<Established<D::Connection>> {
        let dsn = Dsn::from_config(&self.config);
        info!(
            "Connecting to {} via {} (retry budget {:?})",
            dsn, self.dialer, self.retry.timeout
        );

        let driver = &self.driver;
        let dialer = &self.dialer;
        let dsn_ref = &dsn;

        let result = retry_until_deadline(&self.retry, cancel, || async move {
            let conn = driver
                .open(dsn_ref, dialer)
                .await
                .map_err(connect_phase_error)?;

            if let Err(e) = conn.ping().await {
                if let Err(close_err) = conn.close().await {
                    debug!("Closing failed probe handle: {}", close_err);
                }
                return Err(connect_phase_error(e));
            }
            Ok(conn)
        })
        .await;

        let attempts = result.attempts;
        let elapsed = result.total_duration;
        let conn = result.into_result()?;

        conn.set_max_lifetime(self.config.max_conn_lifetime());
        conn.set_max_open(self.config.max_open_conns());

        info!(
            "Connected to {} after {} attempt(s) in {:?}",
            self.config.endpoint(),
            attempts,
            elapsed
        );

        Ok(Established {
            conn: Arc::new(conn),
            version: OnceCell::new(),
        })
    }

    /// Get the server's engine version, queried once per connection.
    pub async fn server_version(&self, cancel: &CancellationToken) -> Result<Version> {
        let established = self.established(cancel).await?;

        let version = established
            .version
            .get_or_try_init(|| async {
                let raw = established
                    .conn
                    .query_scalar(ENGINE_VERSION_QUERY)
                    .await
                    .map_err(|e| e.with_context("could not determine server version"))?
                    .ok_or_else(|| ProviderError::version_parse("server reported no version"))?;

                let version = parse_server_version(&raw)?;
                info!("Detected server version {} ({})", version, raw);
                Ok::<_, ProviderError>(version)
            })
            .await?;

        Ok(version.clone())
    }

    /// Get the SQL dialect for the connected server.
    pub async fn dialect(&self, cancel: &CancellationToken) -> Result<Dialect> {
        let version = self.server_version(cancel).await?;
        Ok(Dialect::for_version(&version))
    }

    /// Get the full server version banner (`@@GLOBAL.version`).
    pub async fn server_version_string(&self, cancel: &CancellationToken) -> Result<String> {
        let conn = self.get_connection(cancel).await?;
        conn.query_scalar(SERVER_VERSION_QUERY)
            .await
            .map_err(|e| e.with_context("could not read server version"))?
            .ok_or_else(|| ProviderError::version_parse("server reported no version"))
    }
}

/// Failures while opening or probing are retryable unless they are
/// configuration problems.
fn connect_phase_error(e: ProviderError) -> ProviderError {
    match e {
        ProviderError::Config(_) | ProviderError::Connection { .. } | ProviderError::Cancelled(_) => e,
        other => ProviderError::connection_with_source(other.to_string(), other),
    }
}
