//! Report REST API routes
//!
//! ## Endpoints
//!
//! - `GET /api/reports/:view` - any registered view
//! - `GET /api/clients/status` - client-status
//! - `GET /api/clients/segments` - client-segment
//! - `GET /api/prospects/status` - prospect-status
//! - `GET /health` - liveness
//!
//! Any other verb on a report path answers 405 with `Allow: GET`.

use axum::{
    extract::{Path, Query, State},
    http::{
        header::{ALLOW, CACHE_CONTROL},
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::auth::AccessPolicy;
use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::reports::{RawFilters, ReportService, ViewName};

// ============================================================================
// State
// ============================================================================

/// State for report routes
#[derive(Clone)]
pub struct ReportState {
    pub service: Arc<ReportService>,
    pub policy: Arc<dyn AccessPolicy>,
    pub user_header: HeaderName,
    pub cache_control: HeaderValue,
}

impl ReportState {
    pub fn new(
        service: Arc<ReportService>,
        policy: Arc<dyn AccessPolicy>,
        config: &ReportConfig,
    ) -> Result<Self, ReportError> {
        let user_header = HeaderName::try_from(config.user_header.as_str()).map_err(|_| {
            ReportError::validation(format!(
                "REPORT_USER_HEADER is not a valid header name: '{}'",
                config.user_header
            ))
        })?;
        let cache_control = HeaderValue::try_from(config.cache_control())
            .map_err(|_| ReportError::validation("cache control value is not a valid header"))?;
        Ok(Self {
            service,
            policy,
            user_header,
            cache_control,
        })
    }
}

// ============================================================================
// Error mapping
// ============================================================================

/// HTTP status for each error kind
pub fn status_for(err: &ReportError) -> StatusCode {
    match err {
        ReportError::InvalidMethod { .. } => StatusCode::METHOD_NOT_ALLOWED,
        ReportError::UnknownView(_) | ReportError::Validation(_) => StatusCode::BAD_REQUEST,
        ReportError::AccessDenied => StatusCode::FORBIDDEN,
        ReportError::NotFound(_) => StatusCode::NOT_FOUND,
        ReportError::QueryFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        ReportError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        // Data source details stay in the logs
        let message = match &self {
            ReportError::QueryFailed { .. } => "Internal server error".to_string(),
            ReportError::Timeout { .. } => "Report temporarily unavailable".to_string(),
            other => other.to_string(),
        };
        let body = Json(json!({ "error": message }));

        match self {
            ReportError::InvalidMethod { allowed, .. } => {
                (status, [(ALLOW, allowed)], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create router for report endpoints
pub fn create_report_router(state: ReportState) -> Router {
    Router::new()
        .route(
            "/api/reports/:view",
            get(get_report).fallback(method_not_allowed),
        )
        .route(
            "/api/clients/status",
            get(get_client_status).fallback(method_not_allowed),
        )
        .route(
            "/api/clients/segments",
            get(get_client_segments).fallback(method_not_allowed),
        )
        .route(
            "/api/prospects/status",
            get(get_prospect_status).fallback(method_not_allowed),
        )
        .route("/health", get(health))
        .fallback(not_found)
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/reports/:view
///
/// ## Query Parameters
///
/// - `page`, `limit`: page window (defaults 1 and 10)
/// - `status` / `segment`: category name or `all`
/// - `search`: substring of name or phone
/// - `startDate`, `endDate`: inclusive ISO dates on last activity
/// - `product`, `marketplace`: comma lists, `_NONE_` matches blank
async fn get_report(
    State(state): State<ReportState>,
    Path(view): Path<String>,
    headers: HeaderMap,
    Query(params): Query<RawFilters>,
) -> Result<Response, ReportError> {
    run_report(&state, &view, &headers, params).await
}

async fn get_client_status(
    State(state): State<ReportState>,
    headers: HeaderMap,
    Query(params): Query<RawFilters>,
) -> Result<Response, ReportError> {
    run_report(&state, ViewName::ClientStatus.as_str(), &headers, params).await
}

async fn get_client_segments(
    State(state): State<ReportState>,
    headers: HeaderMap,
    Query(params): Query<RawFilters>,
) -> Result<Response, ReportError> {
    run_report(&state, ViewName::ClientSegment.as_str(), &headers, params).await
}

async fn get_prospect_status(
    State(state): State<ReportState>,
    headers: HeaderMap,
    Query(params): Query<RawFilters>,
) -> Result<Response, ReportError> {
    run_report(&state, ViewName::ProspectStatus.as_str(), &headers, params).await
}

async fn run_report(
    state: &ReportState,
    view: &str,
    headers: &HeaderMap,
    params: RawFilters,
) -> Result<Response, ReportError> {
    let email = headers
        .get(&state.user_header)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = state.policy.authorize(email) {
        tracing::warn!(view, "Report access denied");
        return Err(e);
    }

    let report = state.service.run(view, &params).await?;

    Ok((
        [(CACHE_CONTROL, state.cache_control.clone())],
        Json(report),
    )
        .into_response())
}

async fn method_not_allowed(method: Method) -> ReportError {
    ReportError::InvalidMethod {
        method: method.to_string(),
        allowed: "GET",
    }
}

async fn not_found(method: Method, uri: axum::http::Uri) -> ReportError {
    ReportError::NotFound(format!("{} {}", method, uri.path()))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&ReportError::UnknownView("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&ReportError::AccessDenied), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&ReportError::query_failed("page for client-status", "boom")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&ReportError::Timeout {
                context: "count".into(),
                timeout_ms: 10
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_method_not_allowed_sets_allow_header() {
        let response = ReportError::InvalidMethod {
            method: "POST".into(),
            allowed: "GET",
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET");
    }
}
