//! Token and notification fixtures.

use chrono::{DateTime, TimeDelta, Utc};
use ferry_storage::{AccessToken, AccountScope};
use serde_json::{Value, json};

/// Event type of an object-created notification.
pub const BLOB_CREATED: &str = "Microsoft.Storage.BlobCreated";

/// Expiry `hours` from now.
#[must_use]
pub fn expiring_in_hours(hours: i64) -> Option<DateTime<Utc>> {
    Some(Utc::now() + TimeDelta::hours(hours))
}

/// Token that expires `hours` from now.
#[must_use]
pub fn token(value: &str, hours: i64) -> AccessToken {
    AccessToken::new(value, expiring_in_hours(hours))
}

/// Account scope with a long-lived token.
#[must_use]
pub fn scope(url: &str, token_value: &str) -> AccountScope {
    AccountScope::new(url, token(token_value, 24))
}

/// Notification of the given type pointing at `url`.
#[must_use]
pub fn event_of_type(event_type: &str, url: &str) -> Value {
    json!({
        "id": "4f6c3a4e-0001",
        "eventType": event_type,
        "subject": "/blobServices/default/containers/containerA",
        "data": {
            "api": "PutBlob",
            "url": url,
        },
    })
}

/// Object-created notification pointing at `url`.
#[must_use]
pub fn blob_created_event(url: &str) -> Value {
    event_of_type(BLOB_CREATED, url)
}

/// Subscription handshake carrying `code`.
#[must_use]
pub fn validation_event(code: &str) -> Value {
    json!({
        "id": "validation-1",
        "eventType": "Microsoft.EventGrid.SubscriptionValidationEvent",
        "data": { "validationCode": code },
    })
}
