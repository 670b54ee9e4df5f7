//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics  — Prometheus text format
//!   GET /healthz  — Liveness check (always 200 if process is running)
//!   GET /readyz   — Readiness check (200 once the gRPC listener is bound)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::{
    encoding::{text::encode, EncodeLabelSet},
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kms_crypto::SealError;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    operation: &'static str,
    outcome: &'static str,
}

/// Request counters shared by the gRPC handlers.
///
/// Outcomes only separate client errors from server faults; an unseal that
/// failed authentication counts as `ok`.
#[derive(Clone, Default)]
pub struct Metrics {
    requests: Family<RequestLabels, Counter>,
}

impl Metrics {
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "kms_requests",
            "Seal/Unseal requests by operation and outcome",
            metrics.requests.clone(),
        );
        metrics
    }

    pub fn record<T>(&self, operation: &'static str, result: &Result<T, SealError>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) if e.is_invalid_argument() => "invalid_argument",
            Err(_) => "internal",
        };
        self.requests
            .get_or_create(&RequestLabels { operation, outcome })
            .inc();
    }
}

/// Shared state for the HTTP endpoints
#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<Registry>,
    pub ready: Arc<AtomicBool>,
}

/// Serve Prometheus metrics and health endpoints on `addr` (e.g. "127.0.0.1:9150")
pub async fn serve(addr: String, state: HealthState) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz, /readyz");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

fn router(state: HealthState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &state.registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

/// Liveness check: returns 200 if the process is running.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check: returns 200 once the gRPC API accepts connections, 503 before.
async fn readyz_handler(State(state): State<HealthState>) -> impl IntoResponse {
    if state.ready.load(Ordering::Acquire) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
