//! File share REST client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;
use url::Url;

use crate::api::FileShareApi;
use crate::error::{StorageError, StorageResult, redact_url};
use crate::http::{STORAGE_API_VERSION, check_status};
use crate::model::AccountScope;

/// Speaks the file share REST protocol using SAS-authorized URLs.
#[derive(Clone)]
pub struct AzureFileShareClient {
    http: Client,
}

impl AzureFileShareClient {
    /// Wrap the shared HTTP client.
    #[must_use]
    pub const fn new(http: Client) -> Self {
        Self { http }
    }

    async fn send(
        &self,
        operation: &'static str,
        url: Url,
        build: impl FnOnce(&Client, Url) -> RequestBuilder + Send,
    ) -> StorageResult<Response> {
        let redacted = redact_url(url.as_str());
        debug!(operation, url = %redacted, "file share request");
        build(&self.http, url)
            .header("x-ms-version", STORAGE_API_VERSION)
            .send()
            .await
            .map_err(|source| StorageError::transport(operation, &redacted, source))
    }
}

fn empty_put(http: &Client, url: Url) -> RequestBuilder {
    http.put(url).header(reqwest::header::CONTENT_LENGTH, "0")
}

#[async_trait]
impl FileShareApi for AzureFileShareClient {
    async fn create_share(&self, account: &AccountScope, share: &str) -> StorageResult<()> {
        const OPERATION: &str = "create_share";
        let url = account.resource_url(OPERATION, share, &[("restype", "share")])?;
        let response = self.send(OPERATION, url, empty_put).await?;
        check_status(OPERATION, response).map(drop)
    }

    async fn create_directory(
        &self,
        account: &AccountScope,
        share: &str,
        path: &str,
    ) -> StorageResult<()> {
        const OPERATION: &str = "create_directory";
        let url = account.resource_url(
            OPERATION,
            &format!("{share}/{path}"),
            &[("restype", "directory")],
        )?;
        let response = self
            .send(OPERATION, url, |http, url| {
                empty_put(http, url)
                    .header("x-ms-file-permission", "inherit")
                    .header("x-ms-file-attributes", "Directory")
                    .header("x-ms-file-creation-time", "now")
                    .header("x-ms-file-last-write-time", "now")
            })
            .await?;
        check_status(OPERATION, response).map(drop)
    }

    async fn directory_exists(
        &self,
        account: &AccountScope,
        share: &str,
        path: &str,
    ) -> StorageResult<bool> {
        const OPERATION: &str = "directory_exists";
        let url = account.resource_url(
            OPERATION,
            &format!("{share}/{path}"),
            &[("restype", "directory")],
        )?;
        let response = self.send(OPERATION, url, |http, url| http.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(OPERATION, response).map(|_| true)
    }

    async fn start_copy_from_url(
        &self,
        account: &AccountScope,
        share: &str,
        file_path: &str,
        source_url: &str,
    ) -> StorageResult<()> {
        const OPERATION: &str = "start_copy";
        let url = account.resource_url(OPERATION, &format!("{share}/{file_path}"), &[])?;
        let source = source_url.to_string();
        let response = self
            .send(OPERATION, url, move |http, url| {
                empty_put(http, url).header("x-ms-copy-source", source)
            })
            .await?;
        check_status(OPERATION, response).map(drop)
    }
}
