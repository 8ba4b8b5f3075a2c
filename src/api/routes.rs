use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use http::HeaderName;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::observability::{get_metrics, HealthChecker, LatencyTimer};
use crate::services::ReconciliationService;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReconciliationService>,
    pub health_checker: Arc<HealthChecker>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: Arc<ReconciliationService>, health_checker: Arc<HealthChecker>) -> Self {
        Self {
            service,
            health_checker,
            metrics_handle: None,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

/// Records request count and latency, labelled by route template.
async fn metrics_middleware(req: Request, next: Next) -> Response {
    let timer = LatencyTimer::new();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    get_metrics().record_http_request(&method, &path, response.status().as_u16(), timer.elapsed_ms());
    response
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/detailed", get(handlers::detailed_health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        // Candidate retrieval
        .route(
            "/reconciliation/transactions/orphans",
            get(handlers::list_orphan_transactions),
        )
        .route(
            "/reconciliation/accounts/unmatched",
            get(handlers::list_unmatched_accounts),
        )
        .route(
            "/reconciliation/transactions/:id/candidates",
            get(handlers::transaction_candidates),
        )
        .route(
            "/reconciliation/accounts/:kind/:id/candidates",
            get(handlers::account_candidates),
        )
        // Links
        .route("/reconciliation/links", post(handlers::create_link))
        .route(
            "/reconciliation/links/:transaction_id",
            delete(handlers::delete_link),
        )
        // Classification
        .route(
            "/reconciliation/transactions/:id/classification",
            post(handlers::classify_transaction).delete(handlers::clear_classification),
        )
        // Auto-match and summary
        .route("/reconciliation/auto-match", post(handlers::run_auto_match))
        .route("/reconciliation/summary", get(handlers::get_summary))
        .route_layer(middleware::from_fn(metrics_middleware))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .with_state(state)
}
