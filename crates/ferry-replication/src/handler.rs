//! Per-notification entry point.
//!
//! # Design
//! - Non-creation notifications are dropped before any token work.
//! - Token freshness is settled before the copy and the dispatch start; the
//!   two then run concurrently and neither gates the other.
//! - Every failure is logged and folded into [`HandleOutcome`]; nothing is
//!   returned to the caller as an error.

use std::sync::Arc;

use ferry_events::{EventKind, StorageEvent};
use ferry_storage::AccountScope;
use ferry_telemetry::Metrics;
use serde_json::Value;
use tracing::field::Empty;
use tracing::{Instrument, Span, debug, error, info_span};

use crate::copy::{CopyOrchestrator, CopyReport, CopyTask};
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::tokens::AccessTokenCache;

/// Account endpoints the handler scopes fresh tokens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Source object-storage account URL; objects elsewhere are ignored.
    pub source: String,
    /// Destination file-share account URL.
    pub destination: String,
    /// Processing queue account URL.
    pub queue: String,
}

/// Final state of the copy for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyStatus {
    /// The destination accepted the copy.
    Accepted(CopyReport),
    /// The copy was abandoned.
    Failed {
        /// Provider error code, when one was reported.
        code: Option<String>,
        /// Error description.
        reason: String,
    },
}

/// What happened to one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The notification was not an object creation or could not be read.
    Ignored {
        /// Machine-readable reason.
        reason: &'static str,
    },
    /// The notification was valid but could not be acted on.
    Skipped {
        /// Machine-readable reason.
        reason: &'static str,
    },
    /// Copy and dispatch ran.
    Processed {
        /// Copy result.
        copy: CopyStatus,
        /// Dispatch result.
        dispatch: DispatchOutcome,
    },
}

impl HandleOutcome {
    /// Whether copy and dispatch ran for the notification.
    #[must_use]
    pub const fn is_processed(&self) -> bool {
        matches!(self, Self::Processed { .. })
    }
}

/// Handles object-created notifications end to end.
pub struct EventHandler {
    tokens: Arc<AccessTokenCache>,
    orchestrator: CopyOrchestrator,
    dispatcher: Dispatcher,
    endpoints: Endpoints,
    metrics: Metrics,
}

impl EventHandler {
    /// Assemble a handler from its collaborators.
    #[must_use]
    pub fn new(
        tokens: Arc<AccessTokenCache>,
        orchestrator: CopyOrchestrator,
        dispatcher: Dispatcher,
        endpoints: Endpoints,
        metrics: Metrics,
    ) -> Self {
        Self {
            tokens,
            orchestrator,
            dispatcher,
            endpoints,
            metrics,
        }
    }

    /// Shared token cache.
    #[must_use]
    pub const fn tokens(&self) -> &Arc<AccessTokenCache> {
        &self.tokens
    }

    /// Handle one notification document.
    pub async fn handle(&self, payload: &Value) -> HandleOutcome {
        let span = info_span!("storage_event", event_id = Empty, share = Empty);
        self.handle_in(payload, &span).instrument(span.clone()).await
    }

    fn is_source_account(&self, account: &str) -> bool {
        self.endpoints
            .source
            .split('/')
            .nth(2)
            .is_some_and(|host| host.eq_ignore_ascii_case(account))
    }

    async fn handle_in(&self, payload: &Value, span: &Span) -> HandleOutcome {
        let event = match StorageEvent::from_value(payload) {
            Ok(event) => event,
            Err(err) => {
                self.metrics.inc_event("malformed");
                debug!(reason = err.reason(), "ignoring unreadable notification");
                return HandleOutcome::Ignored {
                    reason: err.reason(),
                };
            }
        };
        if let Some(id) = &event.id {
            span.record("event_id", id.as_str());
        }
        let kind = event.kind();
        self.metrics.inc_event(kind.as_str());
        if kind != EventKind::ObjectCreated {
            debug!(event_type = %event.event_type, "ignoring notification type");
            return HandleOutcome::Ignored {
                reason: "unsupported_event_type",
            };
        }

        let object = match event.object() {
            Ok(object) => object,
            Err(err) => {
                debug!(reason = err.reason(), "ignoring notification without a usable url");
                return HandleOutcome::Ignored {
                    reason: err.reason(),
                };
            }
        };
        if !self.is_source_account(object.account()) {
            debug!(account = object.account(), "ignoring object outside the source account");
            return HandleOutcome::Ignored {
                reason: "foreign_account",
            };
        }
        span.record("share", object.container());

        let Ok(tokens) = self.tokens.fresh_tokens().await else {
            error!("dropping notification: no usable access tokens");
            return HandleOutcome::Skipped {
                reason: "tokens_unavailable",
            };
        };

        let destination = AccountScope::new(&self.endpoints.destination, tokens.destination.clone());
        let queue = AccountScope::new(&self.endpoints.queue, tokens.queue.clone());
        let task = CopyTask {
            source_url: event.data.url.clone().unwrap_or_default(),
            source_token: tokens.source.clone(),
            object,
            destination,
        };

        let (dispatch, copied) = tokio::join!(
            self.dispatcher.dispatch(&task.object, payload, &queue),
            self.orchestrator.copy(&task),
        );
        self.metrics.inc_dispatch(dispatch.as_str());

        let copy = match copied {
            Ok(report) => {
                self.metrics.inc_copy("accepted");
                self.metrics.add_directories_created(
                    u64::try_from(report.directories.created.len()).unwrap_or(u64::MAX),
                );
                CopyStatus::Accepted(report)
            }
            Err(err) => {
                self.metrics.inc_copy("failed");
                error!(
                    path = %task.object.object_path(),
                    code = err.error_code(),
                    error = %err,
                    "copy failed"
                );
                CopyStatus::Failed {
                    code: err.error_code().map(str::to_string),
                    reason: err.to_string(),
                }
            }
        };
        HandleOutcome::Processed { copy, dispatch }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::dispatch::DispatchFilter;
    use crate::tokens::ManagedSecrets;
    use ferry_test_support::fixtures::{blob_created_event, event_of_type, expiring_in_hours};
    use ferry_test_support::mocks::{FakeFileShare, FakeVault, RecordingQueue};
    use serde_json::json;

    struct Harness {
        vault: Arc<FakeVault>,
        files: Arc<FakeFileShare>,
        queue: Arc<RecordingQueue>,
        metrics: Metrics,
        handler: EventHandler,
    }

    fn harness() -> anyhow::Result<Harness> {
        let vault = Arc::new(FakeVault::new());
        vault.set_secret("internal-sas", "?sig=dst", expiring_in_hours(24));
        vault.set_secret("external-sas", "?sig=src", expiring_in_hours(24));
        vault.set_secret("queue-sas", "?sig=q", expiring_in_hours(24));
        let files = Arc::new(FakeFileShare::new());
        let queue = Arc::new(RecordingQueue::new());
        let metrics = Metrics::new()?;
        let timeout = Duration::from_secs(5);

        let tokens = Arc::new(AccessTokenCache::new(
            vault.clone(),
            ManagedSecrets {
                destination: "internal-sas".into(),
                source: "external-sas".into(),
                queue: "queue-sas".into(),
            },
            Duration::from_secs(4 * 60 * 60),
            metrics.clone(),
        ));
        let handler = EventHandler::new(
            tokens,
            CopyOrchestrator::new(files.clone(), 3, timeout),
            Dispatcher::new(DispatchFilter::default(), queue.clone(), "processing-tasks", timeout),
            Endpoints {
                source: "https://src".into(),
                destination: "https://internal.file.core.windows.net".into(),
                queue: "https://internal.queue.core.windows.net".into(),
            },
            metrics.clone(),
        );
        Ok(Harness {
            vault,
            files,
            queue,
            metrics,
            handler,
        })
    }

    #[tokio::test]
    async fn other_event_types_touch_nothing() -> anyhow::Result<()> {
        let h = harness()?;
        let outcome = h
            .handler
            .handle(&event_of_type(
                "Microsoft.Storage.BlobDeleted",
                "https://src/containerA/surge/a.zip",
            ))
            .await;

        assert_eq!(
            outcome,
            HandleOutcome::Ignored {
                reason: "unsupported_event_type"
            }
        );
        assert_eq!(h.vault.total_fetches(), 0);
        assert!(h.files.copy_requests().is_empty());
        assert_eq!(h.queue.attempts(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_payloads_are_ignored() -> anyhow::Result<()> {
        let h = harness()?;
        let missing_url = h
            .handler
            .handle(&json!({"eventType": "Microsoft.Storage.BlobCreated", "data": {}}))
            .await;
        let not_an_event = h.handler.handle(&json!([1, 2, 3])).await;
        let short_url = h
            .handler
            .handle(&blob_created_event("https://src/containerA"))
            .await;

        assert_eq!(missing_url, HandleOutcome::Ignored { reason: "data.url" });
        assert_eq!(
            not_an_event,
            HandleOutcome::Ignored {
                reason: "malformed_payload"
            }
        );
        assert_eq!(
            short_url,
            HandleOutcome::Ignored {
                reason: "missing_object_path"
            }
        );
        assert_eq!(h.vault.total_fetches(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn objects_from_other_accounts_are_ignored() -> anyhow::Result<()> {
        let h = harness()?;
        h.files.add_share("containerA");
        let outcome = h
            .handler
            .handle(&blob_created_event("https://elsewhere/containerA/surge/a.zip"))
            .await;
        let same_account = h
            .handler
            .handle(&blob_created_event("https://SRC/containerA/a.bin"))
            .await;

        assert_eq!(
            outcome,
            HandleOutcome::Ignored {
                reason: "foreign_account"
            }
        );
        assert!(same_account.is_processed());
        assert_eq!(h.files.copy_requests().len(), 1);
        assert_eq!(h.queue.attempts(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn token_outage_skips_the_event() -> anyhow::Result<()> {
        let h = harness()?;
        h.vault.set_failing(true);

        let outcome = h
            .handler
            .handle(&blob_created_event("https://src/containerA/surge/a.zip"))
            .await;

        assert_eq!(
            outcome,
            HandleOutcome::Skipped {
                reason: "tokens_unavailable"
            }
        );
        assert!(h.files.copy_requests().is_empty());
        assert_eq!(h.queue.attempts(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn copy_failure_does_not_block_dispatch() -> anyhow::Result<()> {
        let h = harness()?;
        h.files.add_share("containerA");
        h.files.fail_next_copy(403, "AuthorizationFailure");

        let outcome = h
            .handler
            .handle(&blob_created_event("https://src/containerA/surge/a.zip"))
            .await;

        let HandleOutcome::Processed { copy, dispatch } = outcome else {
            anyhow::bail!("expected processed outcome, got {outcome:?}");
        };
        assert!(matches!(copy, CopyStatus::Failed { code: Some(ref code), .. } if code == "AuthorizationFailure"));
        assert_eq!(dispatch, DispatchOutcome::Enqueued);
        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.copies_failed, 1);
        assert_eq!(snapshot.dispatched, 1);
        Ok(())
    }
}
