//! Error types for the replication core.

use chrono::{DateTime, Utc};
use ferry_storage::StorageError;
use thiserror::Error;

/// Primary error type for replication operations.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// A collaborator call failed.
    #[error("storage operation failed")]
    Storage {
        /// Replication step that issued the call.
        operation: &'static str,
        /// Underlying collaborator error.
        #[source]
        source: StorageError,
    },
    /// The copy kept hitting recoverable failures until the attempt ceiling.
    #[error("copy attempts exhausted")]
    AttemptsExhausted {
        /// Copy requests issued.
        attempts: u32,
        /// Provider code of the last failure.
        last_code: Option<String>,
    },
    /// The share was still missing after it had been created.
    #[error("destination share still missing after creation")]
    ShareStillMissing {
        /// Share name.
        share: String,
    },
    /// A path segment exists but is not a directory.
    #[error("destination path is not a directory")]
    NotADirectory {
        /// Offending path within the share.
        path: String,
    },
    /// A secret outside the managed set was requested.
    #[error("secret is not managed by the token cache")]
    UnknownSecret {
        /// Requested secret name.
        name: String,
    },
    /// The vault answered with tokens whose expiry has already passed.
    #[error("vault returned expired access tokens")]
    ExpiredTokens {
        /// Earliest expiry in the rejected set.
        expired_at: Option<DateTime<Utc>>,
    },
    /// No usable token set exists and the refresh failed.
    #[error("access tokens unavailable")]
    TokensUnavailable,
}

impl ReplicationError {
    /// Wrap a collaborator error with the replication step that hit it.
    #[must_use]
    pub const fn storage(operation: &'static str, source: StorageError) -> Self {
        Self::Storage { operation, source }
    }

    /// Provider error code behind this failure, when one exists.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Storage { source, .. } => source.error_code(),
            Self::AttemptsExhausted { last_code, .. } => last_code.as_deref(),
            Self::ShareStillMissing { .. }
            | Self::NotADirectory { .. }
            | Self::UnknownSecret { .. }
            | Self::ExpiredTokens { .. }
            | Self::TokensUnavailable => None,
        }
    }
}

/// Convenience alias for replication results.
pub type ReplicationResult<T> = Result<T, ReplicationError>;
