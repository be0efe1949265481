//! MySQL provider entry point.
//!
//! Configures the provider from the environment, establishes the shared
//! connection (waiting for the server if it is still coming up), detects the
//! server dialect and prints a JSON status line to stdout.

use anyhow::Result;
use mysql_provider::database::AzureAdTokenExchange;
use mysql_provider::shutdown::install_signal_handlers;
use mysql_provider::{configure, MySqlDriver, ProviderConfig};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to stderr (stdout carries the status line)
    init_logging();

    let version = env!("CARGO_PKG_VERSION");
    eprintln!("MySQL provider v{version} starting...");

    // Load configuration from environment
    let config = ProviderConfig::from_env()?;
    eprintln!("Configuration loaded successfully");

    let cancel = CancellationToken::new();
    install_signal_handlers(cancel.clone());

    let exchange = AzureAdTokenExchange::new()?;
    let manager = configure(&config, MySqlDriver, &exchange).await?;

    if let Err(e) = manager.get_connection(&cancel).await {
        if let Some(hint) = e.suggestion() {
            eprintln!("Hint: {hint}");
        }
        return Err(e.into());
    }

    let dialect = manager.dialect(&cancel).await?;
    let server_version = manager.server_version(&cancel).await?;
    let banner = manager.server_version_string(&cancel).await?;

    let status = json!({
        "endpoint": manager.config().endpoint(),
        "transport": manager.config().transport().as_str(),
        "dialer": manager.dialer().to_string(),
        "state": manager.state().to_string(),
        "server_version": server_version.to_string(),
        "server_banner": banner,
        "dialect": dialect.to_string(),
    });
    println!("{status}");

    Ok(())
}

/// Initialize tracing subscriber with stderr output.
fn init_logging() {
    let filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("warn,mysql_provider=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
