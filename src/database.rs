//! Database connectivity: dialing, credentials, the shared connection and
//! server version detection.

mod auth;
mod connection;
mod dialer;
mod driver;
mod mysql;
mod relay;
mod version;

pub use auth::{
    resolve_credentials, AzureAdTokenExchange, FederatedCredentials, ResolvedCredentials,
    TokenExchange,
};
pub use connection::{ConnectionManager, ConnectionState};
pub use dialer::{
    mask_proxy_credentials, resolve_dialer, resolve_dialer_with_env, validate_proxy_url, Dialer,
    NoProxy, Socks5Proxy,
};
pub use driver::{Dsn, SqlConnection, SqlDriver};
pub use mysql::{MySqlConnection, MySqlDriver};
pub use relay::Relay;
pub use version::{parse_server_version, Dialect};
