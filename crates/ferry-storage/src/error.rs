//! Error types for the storage collaborators.

use thiserror::Error;

/// Provider error codes the replicator reacts to.
pub mod codes {
    /// The destination share does not exist.
    pub const SHARE_NOT_FOUND: &str = "ShareNotFound";
    /// A parent directory of the addressed path does not exist.
    pub const PARENT_NOT_FOUND: &str = "ParentNotFound";
    /// The directory (or file) being created is already present.
    pub const RESOURCE_ALREADY_EXISTS: &str = "ResourceAlreadyExists";
    /// The share being created is already present.
    pub const SHARE_ALREADY_EXISTS: &str = "ShareAlreadyExists";
    /// The addressed resource does not exist.
    pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFound";
}

/// Primary error type for vault, file share and queue calls.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The request could not be delivered or its response could not be read.
    #[error("storage request failed")]
    Http {
        /// Operation that issued the request.
        operation: &'static str,
        /// Target URL with its query string removed.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The service answered with a non-success status.
    #[error("storage service rejected the request")]
    Service {
        /// Operation that issued the request.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Provider error code from the `x-ms-error-code` header.
        code: Option<String>,
    },
    /// The call did not finish within its deadline.
    #[error("storage request timed out")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
    },
    /// A response body did not have the expected shape.
    #[error("storage response could not be decoded")]
    Decode {
        /// Operation whose response was rejected.
        operation: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// A request URL could not be constructed.
    #[error("invalid storage url")]
    InvalidUrl {
        /// Operation that built the URL.
        operation: &'static str,
        /// Offending URL with its query string removed.
        value: String,
    },
    /// No bearer token could be obtained for the vault.
    #[error("credential unavailable")]
    Credential {
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// The shared HTTP client could not be built.
    #[error("failed to build http client")]
    ClientBuild {
        /// Underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl StorageError {
    /// Build a service error from a status and optional provider code.
    #[must_use]
    pub fn service(operation: &'static str, status: u16, code: Option<&str>) -> Self {
        Self::Service {
            operation,
            status,
            code: code.map(str::to_string),
        }
    }

    /// Map a transport error, classifying client-side timeouts separately.
    #[must_use]
    pub fn transport(operation: &'static str, url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { operation }
        } else {
            Self::Http {
                operation,
                url: redact_url(url),
                source,
            }
        }
    }

    /// Provider error code, when the service supplied one.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether the provider reported the given error code.
    #[must_use]
    pub fn has_code(&self, expected: &str) -> bool {
        self.error_code() == Some(expected)
    }

    /// Operation that produced the error, when known.
    #[must_use]
    pub const fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Http { operation, .. }
            | Self::Service { operation, .. }
            | Self::Timeout { operation }
            | Self::Decode { operation, .. }
            | Self::InvalidUrl { operation, .. } => Some(*operation),
            Self::Credential { .. } | Self::ClientBuild { .. } => None,
        }
    }
}

/// Convenience alias for storage results.
pub type StorageResult<T> = Result<T, StorageError>;

/// Strip the query string (and with it any access token) from a URL.
#[must_use]
pub fn redact_url(url: &str) -> String {
    url.split_once('?')
        .map_or(url, |(base, _)| base)
        .to_string()
}
