//! Routing of copied objects to the processing queue.

use std::sync::Arc;
use std::time::Duration;

use ferry_events::ObjectReference;
use ferry_storage::{AccountScope, QueueApi, within};
use serde_json::Value;
use tracing::{info, warn};

/// Default top-level folder routed to the processing queue.
pub const DEFAULT_FOLDER: &str = "surge";
/// Default extension routed to the processing queue.
pub const DEFAULT_EXTENSION: &str = "zip";

/// Text between the first and second dot of a file name.
///
/// `data.tar.zip` yields `tar`; names without a dot, or with nothing after
/// the first dot, have no extension.
#[must_use]
pub fn first_dot_extension(file_name: &str) -> Option<&str> {
    file_name
        .split('.')
        .nth(1)
        .filter(|extension| !extension.is_empty())
}

/// Folder and extension literals deciding which objects are dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFilter {
    folder: String,
    extension: String,
}

impl Default for DispatchFilter {
    fn default() -> Self {
        Self::new(DEFAULT_FOLDER, DEFAULT_EXTENSION)
    }
}

impl DispatchFilter {
    /// Build a filter from its literals.
    #[must_use]
    pub fn new(folder: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            extension: extension.into(),
        }
    }

    /// Whether the object sits under the configured top-level folder
    /// (ASCII case-insensitive) and carries the configured extension
    /// (case-sensitive).
    #[must_use]
    pub fn should_dispatch(&self, object: &ObjectReference) -> bool {
        let Some(extension) = first_dot_extension(object.file_name()) else {
            return false;
        };
        object.top_level_folder().eq_ignore_ascii_case(&self.folder) && extension == self.extension
    }
}

/// Result of a dispatch decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The object did not match the filter.
    Skipped,
    /// The notification was enqueued.
    Enqueued,
    /// Enqueueing failed; the failure was logged and dropped.
    Failed,
}

impl DispatchOutcome {
    /// Label used for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Enqueued => "enqueued",
            Self::Failed => "failed",
        }
    }
}

/// Best-effort enqueueing of matching notifications.
pub struct Dispatcher {
    filter: DispatchFilter,
    queue: Arc<dyn QueueApi>,
    queue_name: String,
    call_timeout: Duration,
}

impl Dispatcher {
    /// Build a dispatcher sending to `queue_name`.
    #[must_use]
    pub fn new(
        filter: DispatchFilter,
        queue: Arc<dyn QueueApi>,
        queue_name: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            filter,
            queue,
            queue_name: queue_name.into(),
            call_timeout,
        }
    }

    /// Enqueue the serialized `payload` when `object` matches the filter.
    /// Never fails; enqueue errors are logged and reported as
    /// [`DispatchOutcome::Failed`].
    pub async fn dispatch(
        &self,
        object: &ObjectReference,
        payload: &Value,
        account: &AccountScope,
    ) -> DispatchOutcome {
        if !self.filter.should_dispatch(object) {
            return DispatchOutcome::Skipped;
        }
        let message = payload.to_string();
        let sent = within(
            "send_message",
            self.call_timeout,
            self.queue.send_message(account, &self.queue_name, &message),
        )
        .await;
        match sent {
            Ok(()) => {
                info!(queue = %self.queue_name, path = %object.object_path(), "dispatched processing task");
                DispatchOutcome::Enqueued
            }
            Err(err) => {
                warn!(
                    queue = %self.queue_name,
                    path = %object.object_path(),
                    error = %err,
                    code = err.error_code(),
                    "failed to enqueue processing task"
                );
                DispatchOutcome::Failed
            }
        }
    }
}
