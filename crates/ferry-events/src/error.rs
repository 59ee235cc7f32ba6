//! Notification parsing error primitives.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Error emitted when a notification cannot be turned into a typed event.
#[derive(Debug)]
pub enum EventError {
    /// The notification document did not match the expected shape.
    Decode {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// A field required for processing was absent.
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },
    /// The object URL could not be decomposed into container and path.
    InvalidUrl {
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending URL with its query string removed.
        value: String,
    },
}

impl EventError {
    /// Machine-readable reason used when the event is ignored.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "malformed_payload",
            Self::MissingField { field } => *field,
            Self::InvalidUrl { reason, .. } => *reason,
        }
    }
}

impl Display for EventError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode { .. } => formatter.write_str("notification payload could not be decoded"),
            Self::MissingField { .. } => formatter.write_str("notification field missing"),
            Self::InvalidUrl { .. } => formatter.write_str("notification object url invalid"),
        }
    }
}

impl Error for EventError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode { source } => Some(source),
            Self::MissingField { .. } | Self::InvalidUrl { .. } => None,
        }
    }
}

/// Result wrapper for notification parsing.
pub type EventResult<T> = Result<T, EventError>;
