//! Collaborator traits the replicator is written against.
//!
//! Production code uses the REST clients in this crate; tests use the
//! in-memory fakes from `ferry-test-support`.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::model::{AccountScope, VaultSecret};

/// Source of vault secrets.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Fetch the current version of a secret.
    async fn get_secret(&self, name: &str) -> StorageResult<VaultSecret>;
}

/// Issuer of bearer tokens for the process identity.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Obtain a bearer token valid for `resource`.
    async fn bearer_token(&self, resource: &str) -> StorageResult<String>;
}

/// Operations against a file-share account.
#[async_trait]
pub trait FileShareApi: Send + Sync {
    /// Create a share.
    async fn create_share(&self, account: &AccountScope, share: &str) -> StorageResult<()>;

    /// Create one directory; the parent must already exist.
    async fn create_directory(
        &self,
        account: &AccountScope,
        share: &str,
        path: &str,
    ) -> StorageResult<()>;

    /// Whether a directory exists.
    async fn directory_exists(
        &self,
        account: &AccountScope,
        share: &str,
        path: &str,
    ) -> StorageResult<bool>;

    /// Ask the service to copy `source_url` into `file_path` asynchronously.
    async fn start_copy_from_url(
        &self,
        account: &AccountScope,
        share: &str,
        file_path: &str,
        source_url: &str,
    ) -> StorageResult<()>;
}

/// Operations against a queue account.
#[async_trait]
pub trait QueueApi: Send + Sync {
    /// Append a message to `queue`.
    async fn send_message(&self, account: &AccountScope, queue: &str, text: &str)
    -> StorageResult<()>;
}
