//! Configuration management for the MySQL provider core.
//!
//! Configuration is loaded from environment variables, mirroring the
//! provider's schema defaults. [`ProviderConfig`] is the raw, validated
//! surface; [`ConnectionConfig`] is the immutable record the connection
//! manager is built from once credentials have been resolved.

use crate::constants::{
    DEFAULT_AUTHENTICATION_PLUGIN, DEFAULT_CONNECT_RETRY_TIMEOUT_SECS, DEFAULT_TLS_CONFIG,
};
use crate::database::ResolvedCredentials;
use crate::error::{ProviderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Provider configuration as surfaced by the host.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Server address: `host:port` or an absolute unix socket path
    pub endpoint: String,

    /// Login user
    pub username: String,

    /// Login password (may be empty when federated auth supplies one)
    pub password: String,

    /// Explicit SOCKS5 proxy URL
    pub proxy: Option<String>,

    /// TLS mode
    pub tls: TlsMode,

    /// Ceiling on how long a pooled connection is reused (None = unlimited)
    pub max_conn_lifetime: Option<Duration>,

    /// Maximum concurrently open connections (None = driver default)
    pub max_open_conns: Option<usize>,

    /// Authentication mode
    pub authentication_plugin: AuthMode,

    /// Federated (Azure AD) credential settings
    pub aad: AadSettings,

    /// Budget for establishing the first connection
    pub connect_retry_timeout: Duration,
}

/// Raw Azure AD settings; validated only when federated auth is selected.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AadSettings {
    /// Application (client) id
    pub client_id: Option<String>,
    /// Directory (tenant) id
    pub tenant_id: Option<String>,
    /// Client secret; the login password is used when unset
    pub client_secret: Option<String>,
}

/// TLS mode for the database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TlsMode {
    /// Plain TCP
    #[default]
    Disabled,
    /// TLS with certificate verification
    Required,
    /// TLS without certificate verification
    SkipVerify,
}

impl TlsMode {
    /// Get the configuration value for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "false",
            Self::Required => "true",
            Self::SkipVerify => "skip-verify",
        }
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TlsMode {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "false" => Ok(Self::Disabled),
            "true" => Ok(Self::Required),
            "skip-verify" => Ok(Self::SkipVerify),
            other => Err(ProviderError::config(format!(
                "invalid tls value '{}': expected one of true, false, skip-verify",
                other
            ))),
        }
    }
}

/// Configured authentication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthMode {
    /// mysql_clear_password
    Cleartext,
    /// mysql_native_password
    #[default]
    Native,
    /// Azure AD token presented as a cleartext password
    Federated,
}

impl AuthMode {
    /// Get the configuration value for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cleartext => "cleartext",
            Self::Native => "native",
            Self::Federated => "aad_auth",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cleartext" => Ok(Self::Cleartext),
            "native" => Ok(Self::Native),
            "aad_auth" => Ok(Self::Federated),
            _ => Err(ProviderError::config(format!(
                "unknown authentication_plugin '{}': expected one of cleartext, native, aad_auth",
                s
            ))),
        }
    }
}

/// Password exchange the connection will allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordExchange {
    /// mysql_native_password
    Native,
    /// mysql_clear_password
    Cleartext,
}

/// Connection transport, inferred from the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    Tcp,
    Unix,
}

impl Transport {
    /// `unix` for absolute socket paths, `tcp` otherwise.
    pub fn for_endpoint(endpoint: &str) -> Self {
        if endpoint.starts_with('/') {
            Self::Unix
        } else {
            Self::Tcp
        }
    }

    /// Get the protocol name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Unix => "unix",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable connection record, fully determined before any attempt.
#[derive(Clone)]
pub struct ConnectionConfig {
    endpoint: String,
    transport: Transport,
    username: String,
    secret: String,
    tls: TlsMode,
    password_exchange: PasswordExchange,
    max_conn_lifetime: Option<Duration>,
    max_open_conns: Option<usize>,
    connect_retry_timeout: Duration,
}

impl ConnectionConfig {
    /// Build the connection record from provider settings and resolved credentials.
    pub fn new(config: &ProviderConfig, credentials: ResolvedCredentials) -> Self {
        Self {
            transport: Transport::for_endpoint(&config.endpoint),
            endpoint: config.endpoint.clone(),
            username: credentials.username,
            secret: credentials.secret,
            tls: config.tls,
            password_exchange: credentials.password_exchange,
            max_conn_lifetime: config.max_conn_lifetime,
            max_open_conns: config.max_open_conns,
            connect_retry_timeout: config.connect_retry_timeout,
        }
    }

    /// Get the server address.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get the transport inferred from the endpoint.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Get the login user.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Get the resolved password or bearer token.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Get the TLS mode.
    pub fn tls(&self) -> TlsMode {
        self.tls
    }

    /// Get the password exchange the connection allows.
    pub fn password_exchange(&self) -> PasswordExchange {
        self.password_exchange
    }

    /// Get the pooled connection lifetime ceiling (None = unlimited).
    pub fn max_conn_lifetime(&self) -> Option<Duration> {
        self.max_conn_lifetime
    }

    /// Get the maximum open connections (None = driver default).
    pub fn max_open_conns(&self) -> Option<usize> {
        self.max_open_conns
    }

    /// Get the budget for establishing the first connection.
    pub fn connect_retry_timeout(&self) -> Duration {
        self.connect_retry_timeout
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint)
            .field("transport", &self.transport)
            .field("username", &self.username)
            .field("secret", &"***")
            .field("tls", &self.tls)
            .field("password_exchange", &self.password_exchange)
            .field("max_conn_lifetime", &self.max_conn_lifetime)
            .field("max_open_conns", &self.max_open_conns)
            .field("connect_retry_timeout", &self.connect_retry_timeout)
            .finish()
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"***")
            .field(
                "proxy",
                &self
                    .proxy
                    .as_deref()
                    .map(crate::database::mask_proxy_credentials),
            )
            .field("tls", &self.tls)
            .field("max_conn_lifetime", &self.max_conn_lifetime)
            .field("max_open_conns", &self.max_open_conns)
            .field("authentication_plugin", &self.authentication_plugin)
            .field("aad_client_id", &self.aad.client_id)
            .field("aad_tenant_id", &self.aad.tenant_id)
            .field("connect_retry_timeout", &self.connect_retry_timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Create a configuration with defaults for everything but the required fields.
    pub fn new(endpoint: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: String::new(),
            proxy: None,
            tls: TlsMode::default(),
            max_conn_lifetime: None,
            max_open_conns: None,
            authentication_plugin: AuthMode::default(),
            aad: AadSettings::default(),
            connect_retry_timeout: Duration::from_secs(DEFAULT_CONNECT_RETRY_TIMEOUT_SECS),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// ## Required
    /// - `MYSQL_ENDPOINT`: `host:port` or unix socket path
    /// - `MYSQL_USERNAME`: login user
    ///
    /// ## Optional
    /// - `MYSQL_PASSWORD`: login password (default: empty)
    /// - `ALL_PROXY` / `all_proxy`: SOCKS5 proxy URL
    /// - `MYSQL_TLS_CONFIG`: `true`, `false` or `skip-verify` (default: false)
    /// - `MYSQL_MAX_CONN_LIFETIME_SEC`: connection lifetime ceiling (default: unlimited)
    /// - `MYSQL_MAX_OPEN_CONNS`: maximum open connections (default: driver default)
    /// - `MYSQL_AUTHENTICATION_PLUGIN`: `cleartext`, `native` or `aad_auth` (default: native)
    /// - `MYSQL_AAD_AUTH_CLIENT_ID`, `MYSQL_AAD_AUTH_TENANT_ID`,
    ///   `MYSQL_AAD_AUTH_CLIENT_SECRET`: Azure AD credentials
    /// - `MYSQL_CONNECT_RETRY_TIMEOUT_SEC`: connect retry budget (default: 300)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration using `lookup` to read variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup("MYSQL_ENDPOINT")
            .ok_or_else(|| ProviderError::config("MYSQL_ENDPOINT environment variable is required"))?;

        let username = lookup("MYSQL_USERNAME")
            .ok_or_else(|| ProviderError::config("MYSQL_USERNAME environment variable is required"))?;

        let password = lookup("MYSQL_PASSWORD").unwrap_or_default();

        let proxy = lookup("ALL_PROXY")
            .or_else(|| lookup("all_proxy"))
            .filter(|p| !p.is_empty());

        let tls = lookup("MYSQL_TLS_CONFIG")
            .unwrap_or_else(|| DEFAULT_TLS_CONFIG.to_string())
            .parse()?;

        let max_conn_lifetime = parse_number::<u64>(&lookup, "MYSQL_MAX_CONN_LIFETIME_SEC")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let max_open_conns =
            parse_number::<usize>(&lookup, "MYSQL_MAX_OPEN_CONNS")?.filter(|n| *n > 0);

        let authentication_plugin = lookup("MYSQL_AUTHENTICATION_PLUGIN")
            .unwrap_or_else(|| DEFAULT_AUTHENTICATION_PLUGIN.to_string())
            .parse()?;

        let aad = AadSettings {
            client_id: lookup("MYSQL_AAD_AUTH_CLIENT_ID"),
            tenant_id: lookup("MYSQL_AAD_AUTH_TENANT_ID"),
            client_secret: lookup("MYSQL_AAD_AUTH_CLIENT_SECRET"),
        };

        let connect_retry_timeout_secs =
            parse_number::<u64>(&lookup, "MYSQL_CONNECT_RETRY_TIMEOUT_SEC")?
                .unwrap_or(DEFAULT_CONNECT_RETRY_TIMEOUT_SECS);

        let config = ProviderConfig {
            endpoint,
            username,
            password,
            proxy,
            tls,
            max_conn_lifetime,
            max_open_conns,
            authentication_plugin,
            aad,
            connect_retry_timeout: Duration::from_secs(connect_retry_timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check field-level constraints.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(ProviderError::config("endpoint must not be an empty string"));
        }
        if self.username.is_empty() {
            return Err(ProviderError::config("username must not be an empty string"));
        }
        if let Some(proxy) = &self.proxy {
            crate::database::validate_proxy_url(proxy)?;
        }
        Ok(())
    }

    /// Get the transport the endpoint implies.
    pub fn transport(&self) -> Transport {
        Transport::for_endpoint(&self.endpoint)
    }
}

fn parse_number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ProviderError::config(format!("{} must be an integer, got '{}'", name, raw))),
    }
}
