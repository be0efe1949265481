//! # MySQL Provider Core
//!
//! Connection-establishment core for an infrastructure-as-code MySQL provider.
//!
//! This crate provides:
//! - **Dialer resolution**: direct or SOCKS5 (`socks5` / `socks5h`) dialing
//! - **Credential resolution**: native and cleartext passwords, or an Azure AD
//!   client-credentials token presented as a cleartext password
//! - **Connection management**: one lazily established, shared connection with
//!   deadline-bounded retry while the server is still provisioning
//! - **Version gating**: selection of the password statement dialect from the
//!   server version
//!
//! ## Architecture
//!
//! The host configures the provider once ([`provider::configure`]) and then
//! invokes resource handlers concurrently; all of them share the connection
//! owned by [`database::ConnectionManager`].

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod provider;
pub mod resilience;
pub mod resources;
pub mod security;
pub mod shutdown;

pub use config::{ConnectionConfig, ProviderConfig};
pub use database::{ConnectionManager, Dialect, MySqlDriver};
pub use error::ProviderError;
pub use provider::configure;
