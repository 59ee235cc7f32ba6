//! Queue REST client.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::api::QueueApi;
use crate::error::{StorageError, StorageResult, redact_url};
use crate::http::{STORAGE_API_VERSION, check_status};
use crate::model::AccountScope;

/// Posts messages to a queue using SAS-authorized URLs.
#[derive(Clone)]
pub struct AzureQueueClient {
    http: Client,
}

impl AzureQueueClient {
    /// Wrap the shared HTTP client.
    #[must_use]
    pub const fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl QueueApi for AzureQueueClient {
    async fn send_message(
        &self,
        account: &AccountScope,
        queue: &str,
        text: &str,
    ) -> StorageResult<()> {
        const OPERATION: &str = "send_message";
        let url = account.resource_url(OPERATION, &format!("{queue}/messages"), &[])?;
        let redacted = redact_url(url.as_str());
        debug!(operation = OPERATION, url = %redacted, bytes = text.len(), "queue request");
        let response = self
            .http
            .post(url)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(message_body(text))
            .send()
            .await
            .map_err(|source| StorageError::transport(OPERATION, &redacted, source))?;
        check_status(OPERATION, response).map(drop)
    }
}

fn message_body(text: &str) -> String {
    format!(
        "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
        escape_xml(text)
    )
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
