//! Provider configuration: wires the resolvers into a connection manager.

use crate::config::{ConnectionConfig, ProviderConfig};
use crate::database::{
    resolve_credentials, resolve_dialer, ConnectionManager, SqlDriver, TokenExchange,
};
use crate::error::Result;
use tracing::info;

/// Configure the provider once: validate, resolve the dialer and credentials,
/// and build the connection manager.
///
/// Nothing is dialed here. A malformed proxy, an incomplete federated
/// credentials block or a failed token exchange fail configuration outright.
pub async fn configure<D: SqlDriver>(
    config: &ProviderConfig,
    driver: D,
    exchange: &dyn TokenExchange,
) -> Result<ConnectionManager<D>> {
    config.validate()?;

    let dialer = resolve_dialer(config.proxy.as_deref())?;
    info!("Using {} dialer", dialer);

    let credentials = resolve_credentials(
        config.authentication_plugin,
        &config.username,
        &config.password,
        &config.aad,
        exchange,
    )
    .await?;

    let connection_config = ConnectionConfig::new(config, credentials);
    info!(
        "Provider configured for {} over {} (tls: {})",
        connection_config.endpoint(),
        connection_config.transport(),
        connection_config.tls()
    );

    Ok(ConnectionManager::new(connection_config, dialer, driver))
}
