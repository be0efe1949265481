//! Connection manager behavior against a scripted driver.
//!
//! Time-dependent tests run on a paused clock, so a 30 second retry budget
//! finishes instantly while the manager still observes it elapse.

use async_trait::async_trait;
use futures_util::future::join_all;
use mysql_provider::config::PasswordExchange;
use mysql_provider::database::{
    ConnectionManager, ConnectionState, Dialer, Dsn, ResolvedCredentials, SqlConnection, SqlDriver,
};
use mysql_provider::error::{ProviderError, Result};
use mysql_provider::resilience::RetryConfig;
use mysql_provider::resources::UserPassword;
use mysql_provider::{ConnectionConfig, Dialect, ProviderConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Scripted driver
// =============================================================================

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    pings: AtomicUsize,
    successful_pings: AtomicUsize,
    closes: AtomicUsize,
    version_queries: AtomicUsize,
    statements: Mutex<Vec<String>>,
    max_lifetime: Mutex<Option<Duration>>,
    max_open: Mutex<Option<usize>>,
}

#[derive(Debug, Clone, Copy)]
enum Reachability {
    /// Ping succeeds once this much time has passed since the driver was built.
    After(Duration),
    Never,
    /// Open fails with a configuration error.
    Misconfigured,
}

#[derive(Debug)]
struct ScriptedDriver {
    created: Instant,
    reachability: Reachability,
    version: Option<&'static str>,
    counters: Arc<Counters>,
}

impl ScriptedDriver {
    fn new(reachability: Reachability, version: Option<&'static str>) -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (
            Self {
                created: Instant::now(),
                reachability,
                version,
                counters: counters.clone(),
            },
            counters,
        )
    }
}

#[derive(Debug)]
struct ScriptedConnection {
    reachable: bool,
    version: Option<&'static str>,
    counters: Arc<Counters>,
}

#[async_trait]
impl SqlDriver for ScriptedDriver {
    type Connection = ScriptedConnection;

    async fn open(&self, _dsn: &Dsn, _dialer: &Dialer) -> Result<ScriptedConnection> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        let reachable = match self.reachability {
            Reachability::After(delay) => self.created.elapsed() >= delay,
            Reachability::Never => false,
            Reachability::Misconfigured => {
                return Err(ProviderError::config("invalid DSN: unknown parameter"));
            }
        };
        Ok(ScriptedConnection {
            reachable,
            version: self.version,
            counters: self.counters.clone(),
        })
    }
}

#[async_trait]
impl SqlConnection for ScriptedConnection {
    async fn ping(&self) -> Result<()> {
        self.counters.pings.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up behind the first attempt.
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.reachable {
            self.counters.successful_pings.fetch_add(1, Ordering::SeqCst);
            Ok(())
        } else {
            Err(ProviderError::connection("dial tcp 10.0.0.5:3306: connection refused"))
        }
    }

    async fn query_scalar(&self, sql: &str) -> Result<Option<String>> {
        if sql.contains("innodb_version") {
            self.counters.version_queries.fetch_add(1, Ordering::SeqCst);
            return Ok(self.version.map(str::to_string));
        }
        if sql.contains("@@GLOBAL.version") {
            return Ok(self.version.map(|v| format!("{}-log", v)));
        }
        Err(ProviderError::query_error_with_code("unexpected query", 1064))
    }

    async fn exec(&self, sql: &str) -> Result<u64> {
        self.counters.statements.lock().push(sql.to_string());
        Ok(0)
    }

    fn set_max_lifetime(&self, lifetime: Option<Duration>) {
        *self.counters.max_lifetime.lock() = lifetime;
    }

    fn set_max_open(&self, max: Option<usize>) {
        *self.counters.max_open.lock() = max;
    }

    async fn close(&self) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn connection_config(timeout: Duration) -> ConnectionConfig {
    let mut provider = ProviderConfig::new("db.example.com:3306", "app");
    provider.password = "pw".to_string();
    provider.max_conn_lifetime = Some(Duration::from_secs(60));
    provider.max_open_conns = Some(5);
    provider.connect_retry_timeout = timeout;

    ConnectionConfig::new(
        &provider,
        ResolvedCredentials {
            username: "app".to_string(),
            secret: "pw".to_string(),
            password_exchange: PasswordExchange::Native,
        },
    )
}

fn manager(
    reachability: Reachability,
    version: Option<&'static str>,
    timeout: Duration,
) -> (ConnectionManager<ScriptedDriver>, Arc<Counters>) {
    let (driver, counters) = ScriptedDriver::new(reachability, version);
    (
        ConnectionManager::new(connection_config(timeout), Dialer::Direct, driver),
        counters,
    )
}

// =============================================================================
// Establishment
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_first_callers_share_one_establishment() {
    let (manager, counters) = manager(
        Reachability::After(Duration::from_secs(3)),
        Some("8.0.21"),
        Duration::from_secs(30),
    );
    let cancel = CancellationToken::new();

    let results = join_all((0..8).map(|_| manager.get_connection(&cancel))).await;

    let handles: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    for handle in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], handle));
    }
    assert_eq!(counters.successful_pings.load(Ordering::SeqCst), 1);
    assert!(counters.pings.load(Ordering::SeqCst) > 1, "server was not reachable at first");
    assert_eq!(manager.state(), ConnectionState::Open);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_spawned_callers_race_on_one_establishment() {
    let (manager, counters) = manager(
        Reachability::After(Duration::from_millis(600)),
        Some("8.0.21"),
        Duration::from_secs(30),
    );
    let manager = Arc::new(manager);
    let cancel = CancellationToken::new();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let manager = manager.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { manager.get_connection(&cancel).await })
        })
        .collect();

    let mut handles = Vec::new();
    for task in join_all(tasks).await {
        handles.push(task.expect("caller task panicked").expect("connection established"));
    }

    for handle in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], handle));
    }
    assert_eq!(counters.successful_pings.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_later_calls_do_not_reconnect() {
    let (manager, counters) = manager(Reachability::After(Duration::ZERO), None, Duration::from_secs(30));
    let cancel = CancellationToken::new();

    let first = manager.get_connection(&cancel).await.unwrap();
    let opens = counters.opens.load(Ordering::SeqCst);
    let second = manager.get_connection(&cancel).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(counters.opens.load(Ordering::SeqCst), opens);
}

#[tokio::test(start_paused = true)]
async fn test_pool_tuning_applied_after_establishment() {
    let (manager, counters) = manager(Reachability::After(Duration::ZERO), None, Duration::from_secs(30));

    manager.get_connection(&CancellationToken::new()).await.unwrap();

    assert_eq!(*counters.max_lifetime.lock(), Some(Duration::from_secs(60)));
    assert_eq!(*counters.max_open.lock(), Some(5));
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_handles_are_closed() {
    let (manager, counters) = manager(
        Reachability::After(Duration::from_secs(2)),
        None,
        Duration::from_secs(30),
    );

    manager.get_connection(&CancellationToken::new()).await.unwrap();

    let failed = counters.pings.load(Ordering::SeqCst) - 1;
    assert_eq!(counters.closes.load(Ordering::SeqCst), failed);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_schedule_without_jitter() {
    let (driver, counters) = ScriptedDriver::new(Reachability::After(Duration::from_secs(1)), None);
    let manager = ConnectionManager::new(connection_config(Duration::from_secs(30)), Dialer::Direct, driver)
        .with_retry_config(RetryConfig::connection(Duration::from_secs(30)).without_jitter());

    manager.get_connection(&CancellationToken::new()).await.unwrap();

    // Attempts at ~0s and ~0.5s fail; the one after the 1s delay succeeds.
    assert_eq!(counters.pings.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_never_reachable_fails_after_timeout() {
    let timeout = Duration::from_secs(30);
    let (manager, counters) = manager(Reachability::Never, None, timeout);
    let start = Instant::now();

    let err = manager
        .get_connection(&CancellationToken::new())
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    match &err {
        ProviderError::ConnectTimeout {
            timeout_secs,
            last_error,
        } => {
            assert_eq!(*timeout_secs, 30);
            assert!(last_error.to_string().contains("connection refused"));
        }
        other => panic!("expected ConnectTimeout, got {other:?}"),
    }
    assert!(elapsed >= timeout, "gave up early: {elapsed:?}");
    assert!(elapsed < timeout + Duration::from_secs(1), "overshot: {elapsed:?}");
    assert!(counters.opens.load(Ordering::SeqCst) > 1);
    assert_eq!(manager.state(), ConnectionState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_configuration_error_is_not_retried() {
    let (manager, counters) = manager(Reachability::Misconfigured, None, Duration::from_secs(30));
    let start = Instant::now();

    let err = manager
        .get_connection(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Config(_)), "{err:?}");
    assert_eq!(counters.opens.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_is_cached() {
    let (manager, counters) = manager(Reachability::Never, None, Duration::from_secs(5));
    let cancel = CancellationToken::new();

    let first = manager.get_connection(&cancel).await.unwrap_err();
    let opens = counters.opens.load(Ordering::SeqCst);
    let second = manager.get_connection(&cancel).await.unwrap_err();

    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(counters.opens.load(Ordering::SeqCst), opens);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancellation_is_distinct_from_timeout() {
    let (manager, _counters) = manager(Reachability::Never, None, Duration::from_secs(300));
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let err = manager.get_connection(&cancel).await.unwrap_err();

    assert!(err.is_cancelled(), "{err:?}");
    assert!(start.elapsed() < Duration::from_secs(6));
    assert_eq!(manager.state(), ConnectionState::Unopened);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_establishment_is_not_cached() {
    let (manager, counters) = manager(
        Reachability::After(Duration::from_secs(10)),
        None,
        Duration::from_secs(300),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = manager.get_connection(&cancel).await.unwrap_err();
    assert!(err.is_cancelled());

    let conn = manager.get_connection(&CancellationToken::new()).await;
    assert!(conn.is_ok());
    assert_eq!(counters.successful_pings.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(), ConnectionState::Open);
}

// =============================================================================
// Version gate
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_dialect_memoized_per_connection() {
    let (manager, counters) = manager(Reachability::After(Duration::ZERO), Some("8.0.21"), Duration::from_secs(30));
    let cancel = CancellationToken::new();

    assert_eq!(manager.dialect(&cancel).await.unwrap(), Dialect::Modern);
    assert_eq!(manager.dialect(&cancel).await.unwrap(), Dialect::Modern);
    assert_eq!(counters.version_queries.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_legacy_dialect() {
    let (manager, _counters) = manager(Reachability::After(Duration::ZERO), Some("5.7.5"), Duration::from_secs(30));

    let dialect = manager.dialect(&CancellationToken::new()).await.unwrap();
    assert_eq!(dialect, Dialect::Legacy);
}

#[tokio::test(start_paused = true)]
async fn test_version_failure_is_not_memoized() {
    let (manager, counters) = manager(Reachability::After(Duration::ZERO), Some("unknown"), Duration::from_secs(30));
    let cancel = CancellationToken::new();

    let err = manager.dialect(&cancel).await.unwrap_err();
    assert!(err.to_string().contains("could not determine server version"));

    manager.dialect(&cancel).await.unwrap_err();
    assert_eq!(counters.version_queries.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_server_version_string() {
    let (manager, _counters) = manager(Reachability::After(Duration::ZERO), Some("5.7.6"), Duration::from_secs(30));

    let banner = manager
        .server_version_string(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(banner, "5.7.6-log");
}

// =============================================================================
// user_password
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_user_password_uses_detected_dialect() {
    let (manager, counters) = manager(Reachability::After(Duration::ZERO), Some("5.6.51"), Duration::from_secs(30));
    let cancel = CancellationToken::new();

    let state = UserPassword::new(&manager)
        .create(&cancel, "app", None)
        .await
        .unwrap();

    assert_eq!(state.id, "app@localhost");
    assert_eq!(state.host, "localhost");
    assert!(uuid::Uuid::parse_str(&state.password).is_ok());

    let statements = counters.statements.lock().clone();
    assert_eq!(
        statements,
        vec![format!(
            "SET PASSWORD FOR `app`@`localhost` = PASSWORD('{}')",
            state.password
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn test_user_password_modern_with_host() {
    let (manager, counters) = manager(Reachability::After(Duration::ZERO), Some("8.0.21"), Duration::from_secs(30));
    let handler = UserPassword::new(&manager);
    let cancel = CancellationToken::new();

    let state = handler.create(&cancel, "app", Some("%")).await.unwrap();
    assert_eq!(state.id, "app@%");
    assert!(counters.statements.lock()[0].starts_with("ALTER USER `app`@`%` IDENTIFIED BY '"));

    let read = handler.read(state.clone()).await.unwrap();
    assert_eq!(read, state);
    handler.delete(&state).await.unwrap();
    assert_eq!(counters.statements.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_user_password_without_version_fails() {
    let (manager, counters) = manager(Reachability::After(Duration::ZERO), None, Duration::from_secs(30));

    let err = UserPassword::new(&manager)
        .create(&CancellationToken::new(), "app", None)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("could not determine server version"));
    assert!(counters.statements.lock().is_empty());
}
