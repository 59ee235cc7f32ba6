//! Key Vault secret client.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::api::{SecretSource, TokenCredential};
use crate::error::{StorageError, StorageResult};
use crate::http::check_status;
use crate::model::VaultSecret;

const VAULT_API_VERSION: &str = "7.4";
const VAULT_RESOURCE: &str = "https://vault.azure.net";

/// Reads secrets from a Key Vault using the process identity.
pub struct KeyVaultClient {
    http: Client,
    vault_url: String,
    credential: Arc<dyn TokenCredential>,
}

impl KeyVaultClient {
    /// Build a client for the vault at `vault_url`.
    #[must_use]
    pub fn new(http: Client, vault_url: impl Into<String>, credential: Arc<dyn TokenCredential>) -> Self {
        let vault_url = vault_url.into();
        Self {
            http,
            vault_url: vault_url.trim_end_matches('/').to_string(),
            credential,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String,
    #[serde(default)]
    attributes: SecretAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct SecretAttributes {
    exp: Option<i64>,
}

impl SecretBundle {
    fn into_secret(self) -> VaultSecret {
        VaultSecret {
            value: self.value,
            expires_on: self
                .attributes
                .exp
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        }
    }
}

#[async_trait]
impl SecretSource for KeyVaultClient {
    async fn get_secret(&self, name: &str) -> StorageResult<VaultSecret> {
        const OPERATION: &str = "get_secret";
        let bearer = self.credential.bearer_token(VAULT_RESOURCE).await?;
        let url = format!("{}/secrets/{name}", self.vault_url);
        let response = self
            .http
            .get(&url)
            .query(&[("api-version", VAULT_API_VERSION)])
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|source| StorageError::transport(OPERATION, &url, source))?;
        let bundle: SecretBundle = check_status(OPERATION, response)?
            .json()
            .await
            .map_err(|_| StorageError::Decode {
                operation: OPERATION,
                reason: "secret_bundle",
            })?;
        debug!(secret = name, "fetched vault secret");
        Ok(bundle.into_secret())
    }
}
