//! Typed configuration consumed by the replicator.

use std::net::IpAddr;
use std::time::Duration;

/// Storage account reachable with a vault-issued access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    /// Account endpoint without a trailing slash.
    pub url: String,
    /// Vault secret holding the account's access token.
    pub secret_name: String,
}

/// Queue account plus the queue that receives processing tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Queue account endpoint without a trailing slash.
    pub url: String,
    /// Vault secret holding the queue access token.
    pub secret_name: String,
    /// Queue name.
    pub queue_name: String,
}

/// Vault that issues access tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Vault name as configured.
    pub name: String,
    /// Vault endpoint derived from the name.
    pub url: String,
}

/// Literals deciding which objects are routed to the processing queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Top-level folder, compared case-insensitively.
    pub folder: String,
    /// Extension, compared case-sensitively.
    pub extension: String,
}

/// Bounds applied to the copy state machine and every network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyConfig {
    /// Copy requests issued per object before giving up.
    pub max_attempts: u32,
    /// Timeout applied to each vault, storage and queue call.
    pub request_timeout: Duration,
}

/// HTTP listener receiving notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub bind_addr: IpAddr,
    /// Port to bind.
    pub port: u16,
}

/// Logging preferences; `RUST_LOG` still takes precedence over `level`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Default filter directive.
    pub level: String,
    /// Requested output format (`json` or `pretty`), inferred when absent.
    pub format: Option<String>,
}

/// Complete replicator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationConfig {
    /// External object-storage account holding source objects.
    pub source: AccountConfig,
    /// Internal file-share account receiving copies.
    pub destination: AccountConfig,
    /// Processing queue.
    pub queue: QueueConfig,
    /// Token vault.
    pub vault: VaultConfig,
    /// Dispatch policy literals.
    pub dispatch: DispatchConfig,
    /// Copy bounds.
    pub copy: CopyConfig,
    /// Minimum remaining token validity before a refresh.
    pub refresh_margin: Duration,
    /// Notification listener.
    pub listener: ListenerConfig,
    /// Logging preferences.
    pub logging: LogSettings,
    /// Client id of a user-assigned managed identity, if one is used.
    pub identity_client_id: Option<String>,
}
