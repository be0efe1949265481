//! `mysql_async` implementation of the driver boundary.

use super::dialer::{split_host_port, Dialer};
use super::driver::{Dsn, SqlConnection, SqlDriver};
use super::relay::Relay;
use crate::config::{TlsMode, Transport};
use crate::constants::DEFAULT_MYSQL_PORT;
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row, SslOpts, Value};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Driver producing pooled `mysql_async` handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDriver;

/// Pool limits applied when the pool is first built.
#[derive(Debug, Clone, Copy, Default)]
struct PoolTuning {
    max_lifetime: Option<Duration>,
    max_open: Option<usize>,
}

/// Pooled MySQL handle.
///
/// Like `database/sql`, opening does not connect: `ping` dials a single
/// connection, and the pool is built on the first query so that limits set
/// right after establishment are in effect for every pooled connection.
pub struct MySqlConnection {
    opts: Opts,
    tuning: Mutex<PoolTuning>,
    pool: OnceCell<Pool>,
    // Held for the lifetime of the handle; dropping it stops the relay.
    _relay: Option<Relay>,
}

impl std::fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnection")
            .field("user", &self.opts.user())
            .field("host", &self.opts.ip_or_hostname())
            .field("port", &self.opts.tcp_port())
            .field("pool_built", &self.pool.get().is_some())
            .field("relayed", &self._relay.is_some())
            .finish()
    }
}

#[async_trait]
impl SqlDriver for MySqlDriver {
    type Connection = MySqlConnection;

    async fn open(&self, dsn: &Dsn, dialer: &Dialer) -> Result<MySqlConnection> {
        let mut builder = OptsBuilder::default()
            .user(Some(dsn.user.clone()))
            .pass(Some(dsn.password.clone()))
            .enable_cleartext_plugin(dsn.allow_cleartext_passwords);

        let mut relay = None;
        let mut skip_domain_validation = false;

        match dsn.transport {
            Transport::Unix => {
                builder = builder.socket(Some(dsn.address.clone()));
            }
            Transport::Tcp => {
                let (host, port) = host_and_port(&dsn.address)?;

                if dialer.proxies(&host) {
                    let target = format!("{}:{}", host, port);
                    let started = Relay::start(target, dialer.clone()).await.map_err(|e| {
                        ProviderError::connection_with_source("Failed to start proxy relay", e)
                    })?;
                    builder = builder
                        .ip_or_hostname(started.local_addr().ip().to_string())
                        .tcp_port(started.local_addr().port());
                    relay = Some(started);

                    if dsn.tls == TlsMode::Required {
                        warn!(
                            "TLS through a proxy relay verifies the certificate chain but not the host name {}",
                            host
                        );
                        skip_domain_validation = true;
                    }
                } else {
                    builder = builder.ip_or_hostname(host).tcp_port(port);
                }
            }
        }

        let ssl_opts = match dsn.tls {
            TlsMode::Disabled => None,
            TlsMode::Required => Some(
                SslOpts::default().with_danger_skip_domain_validation(skip_domain_validation),
            ),
            TlsMode::SkipVerify => Some(
                SslOpts::default()
                    .with_danger_accept_invalid_certs(true)
                    .with_danger_skip_domain_validation(true),
            ),
        };
        builder = builder.ssl_opts(ssl_opts);

        debug!("Opened handle for {}", dsn);

        Ok(MySqlConnection {
            opts: Opts::from(builder),
            tuning: Mutex::new(PoolTuning::default()),
            pool: OnceCell::new(),
            _relay: relay,
        })
    }
}

fn host_and_port(address: &str) -> Result<(String, u16)> {
    if address.contains(':') && !address.ends_with(']') {
        split_host_port(address)
    } else {
        let host = address.trim_start_matches('[').trim_end_matches(']');
        Ok((host.to_string(), DEFAULT_MYSQL_PORT))
    }
}

impl MySqlConnection {
    fn pool(&self) -> &Pool {
        self.pool.get_or_init(|| {
            let tuning = *self.tuning.lock();
            let mut pool_opts = PoolOpts::default().with_abs_conn_ttl(tuning.max_lifetime);
            if let Some(constraints) = tuning.max_open.and_then(|max| PoolConstraints::new(0, max)) {
                pool_opts = pool_opts.with_constraints(constraints);
            }
            debug!(
                "Building connection pool (max_lifetime: {:?}, max_open: {:?})",
                tuning.max_lifetime, tuning.max_open
            );
            Pool::new(OptsBuilder::from_opts(self.opts.clone()).pool_opts(pool_opts))
        })
    }

    async fn conn(&self) -> Result<Conn> {
        self.pool().get_conn().await.map_err(ProviderError::from)
    }

    fn warn_if_built(&self, setting: &str) {
        if self.pool.get().is_some() {
            warn!("{} changed after the pool was built; the new value is ignored", setting);
        }
    }
}

#[async_trait]
impl SqlConnection for MySqlConnection {
    async fn ping(&self) -> Result<()> {
        if self.pool.get().is_some() {
            let mut conn = self.conn().await?;
            return conn.ping().await.map_err(ProviderError::from);
        }

        let mut conn = Conn::new(self.opts.clone()).await?;
        conn.ping().await?;
        if let Err(e) = conn.disconnect().await {
            debug!("Probe connection did not close cleanly: {}", e);
        }
        Ok(())
    }

    async fn query_scalar(&self, sql: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let row: Option<Row> = conn.query_first(sql).await?;

        Ok(row
            .and_then(|row| row.get::<Value, usize>(0))
            .and_then(|value| match value {
                Value::NULL => None,
                Value::Bytes(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                other => Some(other.as_sql(true)),
            }))
    }

    async fn exec(&self, sql: &str) -> Result<u64> {
        let mut conn = self.conn().await?;
        conn.query_drop(sql).await?;
        Ok(conn.affected_rows())
    }

    fn set_max_lifetime(&self, lifetime: Option<Duration>) {
        self.warn_if_built("max_conn_lifetime");
        self.tuning.lock().max_lifetime = lifetime;
    }

    fn set_max_open(&self, max: Option<usize>) {
        self.warn_if_built("max_open_conns");
        self.tuning.lock().max_open = max;
    }

    async fn close(&self) -> Result<()> {
        if let Some(pool) = self.pool.get() {
            pool.clone().disconnect().await?;
        }
        Ok(())
    }
}
