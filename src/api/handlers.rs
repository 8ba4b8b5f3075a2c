use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::api::requests::{
    scope_from_ids, scope_from_query, AutoMatchRequest, ClassifyRequest, LinkRequest,
    ListOrphansQuery, ListUnmatchedQuery, ScopeQuery, TransactionCandidatesQuery,
};
use crate::api::responses::{
    AccountResponse, ApiResponse, CandidateResponse, ErrorResponse, HealthResponse, ListResponse,
    TransactionResponse, ValidationErrorDetail,
};
use crate::error::AppError;
use crate::events::LinkOrigin;
use crate::models::{AccountKind, AccountRef, ReconciliationSummary};
use crate::observability::AggregatedHealth;
use crate::services::AutoMatchReport;

use super::routes::AppState;

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ApiResponse<()>>);

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Maps a service error onto the response envelope.
///
/// Infrastructure failures are logged and reported with a generic message.
pub fn error_response(err: AppError) -> ApiError {
    let status = match &err {
        AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = match &err {
        AppError::Validation(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => msg.clone(),
        other => {
            tracing::error!("Request failed: {}", other);
            "An internal error occurred".to_string()
        }
    };

    (
        status,
        Json(ApiResponse::<()>::error(ErrorResponse::new(err.code(), message))),
    )
}

fn validation_response(errors: &ValidationErrors) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(
            ErrorResponse::new("VALIDATION_ERROR", "Request validation failed")
                .with_details(ValidationErrorDetail::from_errors(errors)),
        )),
    )
}

fn validate(request: &impl Validate) -> Result<(), ApiError> {
    request.validate().map_err(|e| validation_response(&e))
}

// ============================================================================
// Health Handlers
// ============================================================================

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let health = state.health_checker.check_all().await;
    Json(ApiResponse::success(HealthResponse::from(&health)))
}

/// Detailed health check with per-dependency latency.
pub async fn detailed_health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<AggregatedHealth>>) {
    let health = state.health_checker.check_all().await;
    let status = if health.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(ApiResponse::success(health)))
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    if state.health_checker.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics recorder not installed".to_string(),
        ),
    }
}

// ============================================================================
// Candidate Retrieval Handlers
// ============================================================================

/// Orphan bank transactions of the scope.
pub async fn list_orphan_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListOrphansQuery>,
) -> ApiResult<ListResponse<TransactionResponse>> {
    validate(&query)?;
    let scope = scope_from_query(&query.company_ids).map_err(error_response)?;

    let rows = state
        .service
        .list_orphan_transactions(&scope, query.limit)
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(ListResponse::from_rows(rows))))
}

/// Payables or receivables no transaction links to.
pub async fn list_unmatched_accounts(
    State(state): State<AppState>,
    Query(query): Query<ListUnmatchedQuery>,
) -> ApiResult<ListResponse<AccountResponse>> {
    validate(&query)?;
    let scope = scope_from_query(&query.company_ids).map_err(error_response)?;

    let rows = state
        .service
        .list_unmatched_accounts(&scope, query.kind, query.limit)
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(ListResponse::from_rows(rows))))
}

/// Accounts ranked against a transaction.
pub async fn transaction_candidates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<TransactionCandidatesQuery>,
) -> ApiResult<ListResponse<CandidateResponse<AccountResponse>>> {
    validate(&query)?;
    let scope = scope_from_query(&query.company_ids).map_err(error_response)?;

    let ranked = state
        .service
        .transaction_candidates(&scope, id, query.kind)
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(ListResponse::from_rows(ranked))))
}

/// Transactions ranked against a payable or receivable.
pub async fn account_candidates(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<ListResponse<CandidateResponse<TransactionResponse>>> {
    validate(&query)?;
    let kind: AccountKind = kind.parse().map_err(error_response)?;
    let scope = scope_from_query(&query.company_ids).map_err(error_response)?;

    let ranked = state
        .service
        .account_candidates(&scope, AccountRef { kind, id })
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(ListResponse::from_rows(ranked))))
}

// ============================================================================
// Link Handlers
// ============================================================================

/// Link a transaction to a payable or receivable.
pub async fn create_link(
    State(state): State<AppState>,
    Json(request): Json<LinkRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TransactionResponse>>), ApiError> {
    validate(&request)?;
    let scope = scope_from_ids(&request.company_ids).map_err(error_response)?;

    let linked = state
        .service
        .link(&scope, request.transaction_id, request.account(), LinkOrigin::Manual)
        .await
        .map_err(error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(TransactionResponse::from(linked))),
    ))
}

/// Remove the link of a transaction.
pub async fn delete_link(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<TransactionResponse> {
    validate(&query)?;
    let scope = scope_from_query(&query.company_ids).map_err(error_response)?;

    let unlinked = state
        .service
        .unlink(&scope, transaction_id)
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(TransactionResponse::from(unlinked))))
}

// ============================================================================
// Classification Handlers
// ============================================================================

/// Classify a transaction as a non-operational exception.
pub async fn classify_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ClassifyRequest>,
) -> ApiResult<TransactionResponse> {
    validate(&request)?;
    let scope = scope_from_ids(&request.company_ids).map_err(error_response)?;

    let classified = state
        .service
        .classify(&scope, id, request.classification())
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(TransactionResponse::from(classified))))
}

/// Clear the classification of a transaction.
pub async fn clear_classification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<TransactionResponse> {
    validate(&query)?;
    let scope = scope_from_query(&query.company_ids).map_err(error_response)?;

    let cleared = state
        .service
        .clear_classification(&scope, id)
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(TransactionResponse::from(cleared))))
}

// ============================================================================
// Auto-match and Summary Handlers
// ============================================================================

/// Run an auto-match pass over the scope.
pub async fn run_auto_match(
    State(state): State<AppState>,
    Json(request): Json<AutoMatchRequest>,
) -> ApiResult<AutoMatchReport> {
    validate(&request)?;
    let scope = scope_from_ids(&request.company_ids).map_err(error_response)?;

    let report = state
        .service
        .auto_match(&scope)
        .await
        .map_err(error_response)?;

    Ok(Json(ApiResponse::success(report)))
}

/// Reconciliation counts and rate of the scope.
pub async fn get_summary(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> ApiResult<ReconciliationSummary> {
    validate(&query)?;
    let scope = scope_from_query(&query.company_ids).map_err(error_response)?;

    let summary = state.service.summary(&scope).await.map_err(error_response)?;

    Ok(Json(ApiResponse::success(summary)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(error_response(AppError::Validation("x".into())).0, StatusCode::BAD_REQUEST);
        assert_eq!(error_response(AppError::NotFound("x".into())).0, StatusCode::NOT_FOUND);
        assert_eq!(error_response(AppError::Conflict("x".into())).0, StatusCode::CONFLICT);
        assert_eq!(
            error_response(AppError::Database(sqlx::Error::PoolTimedOut)).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let (_, Json(body)) = error_response(AppError::Internal(anyhow::anyhow!("secret dsn")));
        let error = body.error.unwrap();
        assert_eq!(error.code, "INTERNAL_ERROR");
        assert_eq!(error.message, "An internal error occurred");
    }
}
