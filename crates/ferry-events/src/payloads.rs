//! Notification payload types delivered by the storage event source.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EventError, EventResult};
use crate::object::ObjectReference;

/// Event type emitted when a new object lands in the source account.
pub const BLOB_CREATED_EVENT: &str = "Microsoft.Storage.BlobCreated";

/// Event type sent once when a webhook subscription is registered.
pub const SUBSCRIPTION_VALIDATION_EVENT: &str = "Microsoft.EventGrid.SubscriptionValidationEvent";

/// Typed view over a single inbound notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageEvent {
    /// Identifier assigned by the event source, when present.
    #[serde(default)]
    pub id: Option<String>,
    /// Event type literal used to filter notifications.
    pub event_type: String,
    /// Subject path reported by the event source.
    #[serde(default)]
    pub subject: Option<String>,
    /// Event specific body.
    #[serde(default)]
    pub data: EventData,
}

/// Body of a notification; only the fields the replicator reads are typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    /// URL of the object the notification refers to.
    #[serde(default)]
    pub url: Option<String>,
    /// Handshake code carried by subscription validation events.
    #[serde(default)]
    pub validation_code: Option<String>,
}

/// Classification of an inbound notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A new object was written to the source account.
    ObjectCreated,
    /// Webhook subscription handshake.
    SubscriptionValidation,
    /// Any other notification; ignored by the replicator.
    Other,
}

impl EventKind {
    /// Label used for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ObjectCreated => "object_created",
            Self::SubscriptionValidation => "subscription_validation",
            Self::Other => "other",
        }
    }
}

impl StorageEvent {
    /// Decode the typed view from the original notification document.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Decode`] when the document lacks an `eventType`
    /// or carries fields of the wrong type.
    pub fn from_value(value: &Value) -> EventResult<Self> {
        Self::deserialize(value).map_err(|source| EventError::Decode { source })
    }

    /// Classify the notification by its event type literal.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self.event_type.as_str() {
            BLOB_CREATED_EVENT => EventKind::ObjectCreated,
            SUBSCRIPTION_VALIDATION_EVENT => EventKind::SubscriptionValidation,
            _ => EventKind::Other,
        }
    }

    /// Resolve the object URL into its account, container and path segments.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::MissingField`] when the notification has no URL
    /// and [`EventError::InvalidUrl`] when the URL cannot be decomposed.
    pub fn object(&self) -> EventResult<ObjectReference> {
        let url = self
            .data
            .url
            .as_deref()
            .ok_or(EventError::MissingField { field: "data.url" })?;
        ObjectReference::parse(url)
    }
}
