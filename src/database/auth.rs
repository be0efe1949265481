//! Credential resolution for MySQL connections.
//!
//! This module turns the configured authentication mode into the username,
//! secret and password exchange the connection will use:
//! - `cleartext` / `native`: the configured password, passed through
//! - `aad_auth`: an Azure AD access token obtained with the client
//!   credentials grant, sent as a cleartext password

use crate::config::{AadSettings, AuthMode, PasswordExchange};
use crate::constants::{AZURE_AD_AUTHORITY, AZURE_MYSQL_AUDIENCE, TOKEN_REQUEST_TIMEOUT};
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

/// Exchange of client credentials for a bearer token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Return a bearer token for `audience`.
    async fn exchange(
        &self,
        client_id: &str,
        client_secret: &str,
        tenant_id: &str,
        audience: &str,
    ) -> Result<String>;
}

/// Credentials the connection will present.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub username: String,
    pub secret: String,
    pub password_exchange: PasswordExchange,
}

impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("username", &self.username)
            .field("secret", &"***")
            .field("password_exchange", &self.password_exchange)
            .finish()
    }
}

/// Validated Azure AD client credentials.
#[derive(Clone)]
pub struct FederatedCredentials {
    pub client_id: String,
    pub tenant_id: String,
    pub client_secret: String,
}

impl FederatedCredentials {
    /// Validate raw settings, falling back to `password` for the client secret.
    ///
    /// Errors name the missing or malformed field.
    pub fn from_settings(settings: &AadSettings, password: &str) -> Result<Self> {
        let client_id = required_uuid(settings.client_id.as_deref(), "aad_auth_client_id")?;
        let tenant_id = required_uuid(settings.tenant_id.as_deref(), "aad_auth_tenant_id")?;

        let client_secret = settings
            .client_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(password);
        if client_secret.is_empty() {
            return Err(ProviderError::config(
                "aad_auth_client_secret is not set (and password is empty); \
                 it is required when authentication_plugin is aad_auth",
            ));
        }

        Ok(Self {
            client_id,
            tenant_id,
            client_secret: client_secret.to_string(),
        })
    }
}

fn required_uuid(value: Option<&str>, field: &str) -> Result<String> {
    let value = value.filter(|v| !v.is_empty()).ok_or_else(|| {
        ProviderError::config(format!(
            "{} is not set and is required when authentication_plugin is aad_auth",
            field
        ))
    })?;

    Uuid::parse_str(value)
        .map_err(|e| ProviderError::config(format!("{} must be a UUID: {}", field, e)))?;

    Ok(value.to_string())
}

/// Resolve the credentials for the configured authentication mode.
///
/// Non-federated modes are a pure passthrough. Federated mode performs exactly
/// one token exchange; its failure is not retried. The token is never
/// refreshed afterwards.
pub async fn resolve_credentials(
    mode: AuthMode,
    username: &str,
    password: &str,
    aad: &AadSettings,
    exchange: &dyn TokenExchange,
) -> Result<ResolvedCredentials> {
    match mode {
        AuthMode::Cleartext => Ok(ResolvedCredentials {
            username: username.to_string(),
            secret: password.to_string(),
            password_exchange: PasswordExchange::Cleartext,
        }),
        AuthMode::Native => Ok(ResolvedCredentials {
            username: username.to_string(),
            secret: password.to_string(),
            password_exchange: PasswordExchange::Native,
        }),
        AuthMode::Federated => {
            let federated = FederatedCredentials::from_settings(aad, password)?;
            debug!(
                "Acquiring Azure AD token for client_id: {}",
                &federated.client_id[..8.min(federated.client_id.len())]
            );

            let token = exchange
                .exchange(
                    &federated.client_id,
                    &federated.client_secret,
                    &federated.tenant_id,
                    AZURE_MYSQL_AUDIENCE,
                )
                .await?;

            info!("Using Azure AD token for user {}", username);
            Ok(ResolvedCredentials {
                username: username.to_string(),
                secret: token,
                password_exchange: PasswordExchange::Cleartext,
            })
        }
    }
}

/// OAuth2 token response from Azure AD.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Azure AD client-credentials token exchange.
#[derive(Debug, Clone)]
pub struct AzureAdTokenExchange {
    http_client: reqwest::Client,
    authority: String,
}

impl AzureAdTokenExchange {
    /// Create an exchange against the public Azure AD authority.
    pub fn new() -> Result<Self> {
        Self::with_authority(AZURE_AD_AUTHORITY)
    }

    /// Create an exchange against a custom authority host.
    pub fn with_authority(authority: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::credential_with_source("Failed to build HTTP client", e))?;

        Ok(Self {
            http_client,
            authority: authority.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TokenExchange for AzureAdTokenExchange {
    async fn exchange(
        &self,
        client_id: &str,
        client_secret: &str,
        tenant_id: &str,
        audience: &str,
    ) -> Result<String> {
        let token_url = format!("{}/{}/oauth2/v2.0/token", self.authority, tenant_id);

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", audience),
        ];

        let response = self
            .http_client
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::credential_with_source("Token request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::credential(format!(
                "Token request failed with status {}: {}",
                status, body
            )));
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            ProviderError::credential_with_source("Failed to parse token response", e)
        })?;

        if let Some(expires_in) = token_response.expires_in {
            let expires_at = Utc::now() + ChronoDuration::seconds(expires_in);
            debug!(
                "Azure AD token acquired, expires at {}",
                expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }

        Ok(token_response.access_token)
    }
}
