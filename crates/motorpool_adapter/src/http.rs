#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use motorpool_kernel_contracts::query::DerivedView;
use tower_http::cors::CorsLayer;
use tracing::{warn, Instrument};

use crate::{
    AdapterError, AdapterHealthResponse, AdapterRuntime, BookingRequestView, ListRequestsParams,
    StatusUpdateAdapterRequest, SubmitBookingAdapterRequest,
};
use motorpool_workflow::WorkflowError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const API_PREFIX: &str = "/api";

#[derive(Debug, Clone)]
pub struct AppState {
    runtime: AdapterRuntime,
    request_seq: Arc<AtomicU64>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

impl AdapterError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdapterError::Workflow(WorkflowError::NotFound { .. })
            | AdapterError::UnknownRequest(_) => StatusCode::NOT_FOUND,
            AdapterError::Workflow(WorkflowError::InvalidTransition { .. })
            | AdapterError::Workflow(WorkflowError::Validation(_))
            | AdapterError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AdapterError::Workflow(WorkflowError::Storage(_))
            | AdapterError::LockPoisoned
            | AdapterError::Journal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Routes for the booking API, mounted at the root and again under `/api`.
///
/// Every route answers CORS requests and preflights from any origin.
pub fn build_router(runtime: AdapterRuntime) -> Router {
    let state = AppState {
        runtime,
        request_seq: Arc::new(AtomicU64::new(0)),
    };
    let requests = Router::new()
        .route("/requests", post(submit_request).get(list_requests))
        .route("/requests/accepted", get(accepted_requests))
        .route("/requests/rejected", get(rejected_requests))
        .route("/requests/completed", get(completed_requests))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/status", patch(update_status));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(requests.clone())
        .nest(API_PREFIX, requests)
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            request_tracing_middleware,
        ))
        .with_state(state)
}

async fn request_tracing_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = request.uri().path().to_string();
    let request_id = incoming_request_id(request.headers()).unwrap_or_else(|| {
        format!("req-{}", state.request_seq.fetch_add(1, Ordering::Relaxed) + 1)
    });

    let span = tracing::info_span!(
        "http.request",
        request_id = %request_id,
        method = %method,
        route = %route,
    );

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn incoming_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(ToString::to_string)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AdapterError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            warn!(reason = %rejection.body_text(), "request body rejected");
            Err(AdapterError::InvalidRequest(rejection.body_text()))
        }
    }
}

async fn healthz(
    State(state): State<AppState>,
) -> Result<Json<AdapterHealthResponse>, AdapterError> {
    Ok(Json(state.runtime.health_report()?))
}

async fn submit_request(
    State(state): State<AppState>,
    payload: Result<Json<SubmitBookingAdapterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingRequestView>), AdapterError> {
    let request = json_body(payload)?;
    let created = state.runtime.submit_booking(request, None)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_requests(
    State(state): State<AppState>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<Vec<BookingRequestView>>, AdapterError> {
    let pairs = match query {
        Ok(Query(pairs)) => pairs,
        Err(rejection) => {
            warn!(reason = %rejection.body_text(), "query string rejected");
            return Err(AdapterError::InvalidRequest(rejection.body_text()));
        }
    };
    let params = ListRequestsParams::from_query_pairs(pairs);
    Ok(Json(state.runtime.list_requests(&params)?))
}

async fn accepted_requests(
    State(state): State<AppState>,
) -> Result<Json<Vec<BookingRequestView>>, AdapterError> {
    Ok(Json(state.runtime.derived_view(DerivedView::Accepted)?))
}

async fn rejected_requests(
    State(state): State<AppState>,
) -> Result<Json<Vec<BookingRequestView>>, AdapterError> {
    Ok(Json(state.runtime.derived_view(DerivedView::Rejected)?))
}

async fn completed_requests(
    State(state): State<AppState>,
) -> Result<Json<Vec<BookingRequestView>>, AdapterError> {
    Ok(Json(state.runtime.derived_view(DerivedView::Completed)?))
}

async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookingRequestView>, AdapterError> {
    Ok(Json(state.runtime.get_request(&id)?))
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdateAdapterRequest>, JsonRejection>,
) -> Result<Json<BookingRequestView>, AdapterError> {
    let request = json_body(payload)?;
    Ok(Json(state.runtime.update_status(&id, request, None)?))
}
