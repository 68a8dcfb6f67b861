use crate::blocking;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use dispatch_core::listing::{DashboardSummary, EmergencyQuery};
use dispatch_core::records::{Ambulance, EmergencyRequest, Operator};
use dispatch_core::{DispatchBackend, DispatchError, DispatchService, ReconcileReport};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Email of the signed-in operator. Every API route requires it; the intake
/// webhooks do not.
pub const OPERATOR_HEADER: &str = "x-operator-email";

#[derive(Debug)]
pub struct ApiError(pub DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(DispatchError::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(DispatchError::Validation(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::Conflict { .. } | DispatchError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            DispatchError::Unauthenticated => StatusCode::UNAUTHORIZED,
            DispatchError::Assistant(_) => StatusCode::BAD_GATEWAY,
            DispatchError::Store(_)
            | DispatchError::Serialization(_)
            | DispatchError::Config(_)
            | DispatchError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct DispatchBody {
    pub ambulance_id: String,
}

pub fn api_router(service: DispatchService) -> Router {
    Router::new()
        .route("/emergencies", get(list_emergencies))
        .route("/ambulances/available", get(available_ambulances))
        .route("/dashboard", get(dashboard))
        .route("/emergencies/:id/dispatch", post(dispatch))
        .route("/emergencies/:id/complete", post(complete))
        .route("/emergencies/:id/cancel", post(cancel))
        .route("/reconcile", post(reconcile))
        .with_state(service)
}

/// Resolves the operator named by [`OPERATOR_HEADER`]. A missing header or
/// an email with no operator record is `Unauthenticated`.
async fn authorize(service: &DispatchService, headers: &HeaderMap) -> Result<Operator, ApiError> {
    let email = headers
        .get(OPERATOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .ok_or(DispatchError::Unauthenticated)?
        .to_string();
    let service = service.clone();
    Ok(blocking(move || {
        service
            .backend()
            .operator_by_email(&email)?
            .ok_or(DispatchError::Unauthenticated)
    })
    .await?)
}

pub(crate) async fn list_emergencies(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    query: Result<Query<EmergencyQuery>, QueryRejection>,
) -> ApiResult<Vec<EmergencyRequest>> {
    authorize(&service, &headers).await?;
    let Query(query) = query?;
    let requests = blocking(move || service.backend().emergencies()).await?;
    Ok(Json(query.apply(requests)))
}

pub(crate) async fn available_ambulances(
    State(service): State<DispatchService>,
    headers: HeaderMap,
) -> ApiResult<Vec<Ambulance>> {
    authorize(&service, &headers).await?;
    Ok(Json(blocking(move || service.fetch_available_ambulances()).await?))
}

pub(crate) async fn dashboard(
    State(service): State<DispatchService>,
    headers: HeaderMap,
) -> ApiResult<DashboardSummary> {
    authorize(&service, &headers).await?;
    let summary = blocking(move || {
        let requests = service.backend().emergencies()?;
        let ambulances = service.backend().ambulances()?;
        Ok(DashboardSummary::from_records(&requests, &ambulances))
    })
    .await?;
    Ok(Json(summary))
}

pub(crate) async fn dispatch(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Result<Json<DispatchBody>, JsonRejection>,
) -> ApiResult<EmergencyRequest> {
    let operator = authorize(&service, &headers).await?;
    let Json(body) = body?;
    let request = blocking(move || {
        service.dispatch_ambulance(&id, &body.ambulance_id)?;
        service.backend().emergency(id.trim())
    })
    .await?;
    info!(operator = %operator.email, emergency_id = %request.id, "dispatched over api");
    Ok(Json(request))
}

pub(crate) async fn complete(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<EmergencyRequest> {
    let operator = authorize(&service, &headers).await?;
    let request = blocking(move || service.complete_emergency(&id)).await?;
    info!(operator = %operator.email, emergency_id = %request.id, "completed over api");
    Ok(Json(request))
}

pub(crate) async fn cancel(
    State(service): State<DispatchService>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<EmergencyRequest> {
    let operator = authorize(&service, &headers).await?;
    let request = blocking(move || service.cancel_emergency(&id)).await?;
    info!(operator = %operator.email, emergency_id = %request.id, "cancelled over api");
    Ok(Json(request))
}

pub(crate) async fn reconcile(
    State(service): State<DispatchService>,
    headers: HeaderMap,
) -> ApiResult<ReconcileReport> {
    authorize(&service, &headers).await?;
    Ok(Json(blocking(move || service.reconcile()).await?))
}
