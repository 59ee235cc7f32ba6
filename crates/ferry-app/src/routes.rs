//! Notification webhook plus health and metrics endpoints.
//!
//! # Design
//! - `POST /events` accepts one notification or a batch, handles each in order
//!   and always answers `200` once the body parses; per-event failures are
//!   logged by the handler, not surfaced to the sender.
//! - Subscription validation handshakes are answered with the echoed code.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{Request, StatusCode, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ferry_events::{EventKind, StorageEvent};
use ferry_replication::EventHandler;
use ferry_telemetry::{Metrics, build_sha};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Span, error, info, warn};

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    handler: Arc<EventHandler>,
    metrics: Metrics,
}

impl AppState {
    /// Bundle the event handler and metrics registry.
    #[must_use]
    pub const fn new(handler: Arc<EventHandler>, metrics: Metrics) -> Self {
        Self { handler, metrics }
    }
}

/// Summary returned for a delivered batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsResponse {
    /// Notifications whose copy and dispatch ran.
    pub processed: usize,
    /// Notifications that were ignored or skipped.
    pub ignored: usize,
}

/// Answer to a subscription validation handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResponse {
    /// Echoed validation code.
    #[serde(rename = "validationResponse")]
    pub validation_response: String,
}

/// Liveness payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests.
    pub status: String,
    /// Build identifier.
    pub build: String,
}

#[derive(Debug, Serialize)]
struct ProblemBody {
    title: &'static str,
    status: u16,
    detail: String,
}

#[derive(Debug)]
struct RouteError {
    status: StatusCode,
    title: &'static str,
    detail: String,
}

impl RouteError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            title: "malformed notification body",
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            title: "internal server error",
            detail: detail.into(),
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let body = ProblemBody {
            title: self.title,
            status: self.status.as_u16(),
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Build the router with request tracing applied.
pub fn router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                route = %request.uri().path(),
                build_sha = %build_sha(),
                status_code = tracing::field::Empty,
                latency_ms = tracing::field::Empty
            )
        })
        .on_response(|response: &Response, latency: Duration, span: &Span| {
            span.record("status_code", response.status().as_u16());
            span.record(
                "latency_ms",
                u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            );
        });

    Router::new()
        .route("/events", post(receive_events))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(ServiceBuilder::new().layer(trace_layer))
        .with_state(state)
}

async fn receive_events(State(state): State<AppState>, body: Bytes) -> Result<Response, RouteError> {
    let document: Value = serde_json::from_slice(&body).map_err(|err| {
        warn!(error = %err, "rejecting unparseable notification body");
        RouteError::bad_request("body is not valid JSON")
    })?;
    let events = match document {
        Value::Array(items) => items,
        single => vec![single],
    };

    if let Some(code) = events.iter().find_map(validation_code) {
        info!("answering subscription validation");
        return Ok(Json(ValidationResponse {
            validation_response: code,
        })
        .into_response());
    }

    let mut summary = EventsResponse {
        processed: 0,
        ignored: 0,
    };
    for event in &events {
        if state.handler.handle(event).await.is_processed() {
            summary.processed += 1;
        } else {
            summary.ignored += 1;
        }
    }
    Ok(Json(summary).into_response())
}

fn validation_code(event: &Value) -> Option<String> {
    StorageEvent::from_value(event)
        .ok()
        .filter(|event| event.kind() == EventKind::SubscriptionValidation)
        .and_then(|event| event.data.validation_code)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        build: build_sha().to_string(),
    })
}

async fn metrics(State(state): State<AppState>) -> Result<Response, RouteError> {
    let body = state.metrics.render().map_err(|err| {
        error!(error = %err, "failed to render metrics");
        RouteError::internal("failed to render metrics")
    })?;
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .map_err(|err| {
            error!(error = %err, "failed to build metrics response");
            RouteError::internal("failed to build metrics response")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_replication::{
        AccessTokenCache, CopyOrchestrator, DispatchFilter, Dispatcher, Endpoints, ManagedSecrets,
    };
    use ferry_test_support::fixtures::{blob_created_event, expiring_in_hours, validation_event};
    use ferry_test_support::mocks::{FakeFileShare, FakeVault, RecordingQueue};
    use serde_json::json;
    use tower::ServiceExt;

    struct Fixture {
        files: Arc<FakeFileShare>,
        metrics: Metrics,
        router: Router,
    }

    fn fixture() -> anyhow::Result<Fixture> {
        let vault = Arc::new(FakeVault::new());
        vault.set_secret("internal-sas", "?sig=dst", expiring_in_hours(24));
        vault.set_secret("external-sas", "?sig=src", expiring_in_hours(24));
        vault.set_secret("queue-sas", "?sig=q", expiring_in_hours(24));
        let files = Arc::new(FakeFileShare::new());
        files.add_share("containerA");
        let metrics = Metrics::new()?;
        let timeout = Duration::from_secs(5);
        let tokens = Arc::new(AccessTokenCache::new(
            vault,
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
            Dispatcher::new(
                DispatchFilter::default(),
                Arc::new(RecordingQueue::new()),
                "processing-tasks",
                timeout,
            ),
            Endpoints {
                source: "https://src.blob.core.windows.net".into(),
                destination: "https://internal.file.core.windows.net".into(),
                queue: "https://internal.queue.core.windows.net".into(),
            },
            metrics.clone(),
        );
        let router = router(AppState::new(Arc::new(handler), metrics.clone()));
        Ok(Fixture {
            files,
            metrics,
            router,
        })
    }

    async fn post_events(router: Router, body: String) -> anyhow::Result<(StatusCode, Bytes)> {
        let request = Request::builder()
            .method("POST")
            .uri("/events")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))?;
        let response = router.oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, bytes))
    }

    #[tokio::test]
    async fn batches_are_processed_in_order() -> anyhow::Result<()> {
        let fixture = fixture()?;
        let batch = json!([
            blob_created_event("https://src.blob.core.windows.net/containerA/a.bin"),
            json!({"eventType": "Microsoft.Storage.BlobDeleted", "data": {"url": "https://src/containerA/b.bin"}}),
            blob_created_event("https://src.blob.core.windows.net/containerA/c.bin"),
        ]);

        let (status, body) = post_events(fixture.router, batch.to_string()).await?;

        assert_eq!(status, StatusCode::OK);
        let summary: EventsResponse = serde_json::from_slice(&body)?;
        assert_eq!(
            summary,
            EventsResponse {
                processed: 2,
                ignored: 1
            }
        );
        let paths: Vec<String> = fixture
            .files
            .copy_requests()
            .into_iter()
            .map(|request| request.file_path)
            .collect();
        assert_eq!(paths, ["a.bin", "c.bin"]);
        assert_eq!(fixture.metrics.snapshot().copies_accepted, 2);
        Ok(())
    }

    #[tokio::test]
    async fn single_notifications_are_accepted() -> anyhow::Result<()> {
        let fixture = fixture()?;
        let event = blob_created_event("https://src.blob.core.windows.net/containerA/a.bin");

        let (status, body) = post_events(fixture.router, event.to_string()).await?;

        assert_eq!(status, StatusCode::OK);
        let summary: EventsResponse = serde_json::from_slice(&body)?;
        assert_eq!(summary.processed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn validation_handshake_echoes_the_code() -> anyhow::Result<()> {
        let fixture = fixture()?;
        let batch = json!([validation_event("abc-123")]);

        let (status, body) = post_events(fixture.router, batch.to_string()).await?;

        assert_eq!(status, StatusCode::OK);
        let answer: ValidationResponse = serde_json::from_slice(&body)?;
        assert_eq!(answer.validation_response, "abc-123");
        assert!(fixture.files.copy_requests().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unparseable_bodies_are_rejected() -> anyhow::Result<()> {
        let fixture = fixture()?;
        let (status, _) = post_events(fixture.router, "{not json".to_string()).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn health_and_metrics_respond() -> anyhow::Result<()> {
        let fixture = fixture()?;
        let Json(health_response) = health().await;
        assert_eq!(health_response.status, "ok");

        let response = fixture
            .router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let text = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        assert!(String::from_utf8(text.to_vec())?.contains("directories_created_total"));
        Ok(())
    }
}
