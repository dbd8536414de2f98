//! HTTP API over the controller.
//!
//! The acting user is taken from the `Adfs-*` headers set by the SSO proxy.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::controller::{CallbackUpdate, Controller};
use crate::error::RelmonError;
use crate::relmon::{CategoryInput, Job, JobRequest, UserInfo};

#[derive(Clone)]
pub struct ApiState {
    pub controller: Arc<Controller>,
    /// Wakes the tick loop.
    pub trigger: Arc<Notify>,
}

impl ApiState {
    fn tick_soon(&self) {
        self.trigger.notify_one();
    }
}

#[derive(Deserialize)]
struct EditRequest {
    #[serde(default)]
    categories: Vec<CategoryInput>,
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: String,
}

impl MessageResponse {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

impl IntoResponse for RelmonError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelmonError::JobNotFound(_) => StatusCode::NOT_FOUND,
            RelmonError::InvalidJob(_)
            | RelmonError::InvalidCallback(_)
            | RelmonError::MalformedFileName(_) => StatusCode::BAD_REQUEST,
            RelmonError::DuplicateName(_) | RelmonError::UnexpectedStatus { .. } => {
                StatusCode::CONFLICT
            }
            RelmonError::SecretMismatch(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = MessageResponse {
            success: false,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/relmons", get(list_handler).post(create_handler))
        .route("/api/relmons/{id}", post(edit_handler).delete(delete_handler))
        .route("/api/relmons/{id}/reset", post(reset_handler))
        .route("/api/update", post(update_handler))
        .route("/api/tick", post(tick_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run_api(addr: SocketAddr, state: ApiState, shutdown: CancellationToken) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting API server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind API server");
            shutdown.cancel();
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        tracing::error!(error = %e, "API server failed");
    }
}

fn user_from_headers(headers: &HeaderMap) -> Option<UserInfo> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };

    let login = header("Adfs-Login");
    if login.is_empty() {
        return None;
    }
    Some(UserInfo {
        login,
        fullname: header("Adfs-Fullname"),
        email: header("Adfs-Email"),
    })
}

async fn list_handler(State(state): State<ApiState>) -> Result<Json<Vec<Job>>, RelmonError> {
    Ok(Json(state.controller.list_jobs().await?))
}

async fn create_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<JobRequest>,
) -> Result<impl IntoResponse, RelmonError> {
    let job = state
        .controller
        .create_job(request, user_from_headers(&headers))
        .await?;
    state.tick_soon();
    Ok((StatusCode::CREATED, Json(job)))
}

async fn edit_handler(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<EditRequest>,
) -> Result<Json<Job>, RelmonError> {
    let job = state
        .controller
        .edit_job(&id, request.categories, user_from_headers(&headers))
        .await?;
    state.tick_soon();
    Ok(Json(job))
}

async fn reset_handler(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Job>, RelmonError> {
    let job = state
        .controller
        .request_reset(&id, user_from_headers(&headers))
        .await?;
    state.tick_soon();
    Ok(Json(job))
}

async fn delete_handler(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Job>, RelmonError> {
    let job = state
        .controller
        .request_delete(&id, user_from_headers(&headers))
        .await?;
    state.tick_soon();
    Ok(Json(job))
}

async fn update_handler(
    State(state): State<ApiState>,
    Json(update): Json<CallbackUpdate>,
) -> Result<Json<MessageResponse>, RelmonError> {
    let outcome = state.controller.apply_callback(update).await?;
    if outcome.status_changed {
        state.tick_soon();
    }
    Ok(MessageResponse::ok("OK"))
}

async fn tick_handler(State(state): State<ApiState>) -> impl IntoResponse {
    state.tick_soon();
    (StatusCode::ACCEPTED, MessageResponse::ok("Tick scheduled"))
}
