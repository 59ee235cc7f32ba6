//! Failures raised while installing logging or exposing replication counters.

use std::string::FromUtf8Error;

use prometheus::Error as PrometheusError;
use thiserror::Error;
use tracing_subscriber::util::TryInitError;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying subscriber error.
        #[source]
        source: TryInitError,
    },
    /// A replication counter could not be built or added to the registry.
    #[error("failed to set up replication counter")]
    Counter {
        /// Counter name.
        name: &'static str,
        /// `build` or `register`.
        stage: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// The registry could not be encoded as exposition text.
    #[error("failed to encode metrics")]
    Encode {
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// Encoded exposition text was not UTF-8.
    #[error("metrics output was not valid utf-8")]
    NotUtf8 {
        /// Underlying conversion error.
        #[source]
        source: FromUtf8Error,
    },
}

impl TelemetryError {
    pub(crate) const fn counter(
        name: &'static str,
        stage: &'static str,
        source: PrometheusError,
    ) -> Self {
        Self::Counter {
            name,
            stage,
            source,
        }
    }
}
