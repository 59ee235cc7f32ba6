//! Shared HTTP plumbing for the REST clients.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Response};
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Storage service REST version sent with every file and queue request.
pub const STORAGE_API_VERSION: &str = "2023-11-03";
/// Header carrying the provider error code.
pub const ERROR_CODE_HEADER: &str = "x-ms-error-code";

/// Build the client shared by every collaborator.
///
/// # Errors
///
/// Returns [`StorageError::ClientBuild`] when the TLS backend cannot be initialised.
pub fn build_http_client(timeout: Duration) -> StorageResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ferry/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|source| StorageError::ClientBuild { source })
}

/// Bound a collaborator call by `limit`; elapsed calls become
/// [`StorageError::Timeout`].
///
/// # Errors
///
/// Returns the call's own error, or [`StorageError::Timeout`] if it ran too long.
pub async fn within<T, F>(operation: &'static str, limit: Duration, call: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(StorageError::Timeout { operation }))
}

/// Turn a non-success response into [`StorageError::Service`].
pub(crate) fn check_status(operation: &'static str, response: Response) -> StorageResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let code = response
        .headers()
        .get(ERROR_CODE_HEADER)
        .and_then(|value| value.to_str().ok());
    debug!(operation, status = status.as_u16(), code, "storage request rejected");
    Err(StorageError::service(operation, status.as_u16(), code))
}
