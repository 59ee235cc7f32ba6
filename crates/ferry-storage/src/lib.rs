#![forbid(unsafe_code)]
#![deny(
    dead_code,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Collaborator interfaces and REST clients for the vault, the destination
//! file share and the processing queue.
//!
//! Layout: `api.rs` (traits the replicator depends on), `model.rs` (tokens and
//! account scopes), `http.rs` (shared client, response checks, call deadlines),
//! `vault.rs`, `credential.rs`, `files.rs`, `queue.rs` (REST implementations),
//! `error.rs`.

pub mod api;
pub mod credential;
pub mod error;
pub mod files;
pub mod http;
pub mod model;
pub mod queue;
pub mod vault;

pub use api::{FileShareApi, QueueApi, SecretSource, TokenCredential};
pub use credential::ManagedIdentityCredential;
pub use error::{StorageError, StorageResult, codes, redact_url};
pub use files::AzureFileShareClient;
pub use http::{build_http_client, within};
pub use model::{AccessToken, AccountScope, VaultSecret, append_sas};
pub use queue::AzureQueueClient;
pub use vault::KeyVaultClient;
