//! Managed identity credential for the vault client.
//!
//! # Design
//! - Prefers the App Service identity endpoint when the host advertises one,
//!   otherwise falls back to the instance metadata service.
//! - Bearer tokens are cached per resource until shortly before they expire.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::TokenCredential;
use crate::error::{StorageError, StorageResult};
use crate::http::check_status;

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const EXPIRY_SKEW_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
enum IdentityEndpoint {
    AppService { endpoint: String, header: String },
    Imds,
}

#[derive(Debug, Clone)]
struct CachedBearer {
    token: String,
    expires_on: Option<DateTime<Utc>>,
}

impl CachedBearer {
    fn usable_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on
            .is_some_and(|exp| exp > now + TimeDelta::seconds(EXPIRY_SKEW_SECS))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<Value>,
}

impl TokenResponse {
    fn into_cached(self) -> CachedBearer {
        let expires_on = self
            .expires_on
            .as_ref()
            .and_then(|raw| match raw {
                Value::Number(number) => number.as_i64(),
                Value::String(text) => text.parse().ok(),
                _ => None,
            })
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        CachedBearer {
            token: self.access_token,
            expires_on,
        }
    }
}

/// Bearer tokens for the identity assigned to the hosting environment.
pub struct ManagedIdentityCredential {
    http: Client,
    client_id: Option<String>,
    endpoint: IdentityEndpoint,
    cache: Mutex<HashMap<String, CachedBearer>>,
}

impl ManagedIdentityCredential {
    /// Detect the identity endpoint from `IDENTITY_ENDPOINT`/`IDENTITY_HEADER`.
    #[must_use]
    pub fn from_env(http: Client, client_id: Option<String>) -> Self {
        let endpoint = match (
            std::env::var("IDENTITY_ENDPOINT").ok(),
            std::env::var("IDENTITY_HEADER").ok(),
        ) {
            (Some(endpoint), Some(header)) => IdentityEndpoint::AppService { endpoint, header },
            _ => IdentityEndpoint::Imds,
        };
        Self::with_endpoint(http, client_id, endpoint)
    }

    fn with_endpoint(http: Client, client_id: Option<String>, endpoint: IdentityEndpoint) -> Self {
        Self {
            http,
            client_id,
            endpoint,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn request(&self, resource: &str) -> (String, reqwest::RequestBuilder) {
        let mut query = vec![("resource", resource.to_string())];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.clone()));
        }
        match &self.endpoint {
            IdentityEndpoint::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION.to_string()));
                let builder = self
                    .http
                    .get(endpoint.as_str())
                    .query(&query)
                    .header("X-IDENTITY-HEADER", header.as_str());
                (endpoint.clone(), builder)
            }
            IdentityEndpoint::Imds => {
                query.push(("api-version", IMDS_API_VERSION.to_string()));
                let builder = self
                    .http
                    .get(IMDS_ENDPOINT)
                    .query(&query)
                    .header("Metadata", "true");
                (IMDS_ENDPOINT.to_string(), builder)
            }
        }
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn bearer_token(&self, resource: &str) -> StorageResult<String> {
        const OPERATION: &str = "identity_token";
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(resource)
            && cached.usable_at(Utc::now())
        {
            return Ok(cached.token.clone());
        }

        let (url, request) = self.request(resource);
        let response = request
            .send()
            .await
            .map_err(|source| StorageError::transport(OPERATION, &url, source))?;
        let parsed: TokenResponse = check_status(OPERATION, response)?
            .json()
            .await
            .map_err(|_| StorageError::Credential {
                reason: "malformed_token_response",
            })?;
        let bearer = parsed.into_cached();
        debug!(resource, expires_on = ?bearer.expires_on, "acquired identity token");
        let token = bearer.token.clone();
        cache.insert(resource.to_string(), bearer);
        Ok(token)
    }
}
