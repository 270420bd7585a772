//! API Server module
//!
//! This module provides the HTTP API the chat bridge and the CLI talk to.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::models::{CoreError, TaskDraft, TaskId, UserId, WeekendStatus};
use crate::Core;

/// Request to store a completion report
#[derive(Serialize, Deserialize)]
pub struct ReportRequest {
    pub report: String,
}

/// Request to replace a task's text
#[derive(Serialize, Deserialize)]
pub struct EditTextRequest {
    pub text: String,
}

/// Request to replace a task's checklist
#[derive(Serialize, Deserialize)]
pub struct ChecklistRequest {
    pub items: Vec<String>,
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 3000).into(),
        }
    }
}

/// API responses
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn error_status(error: &CoreError) -> StatusCode {
    match error {
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Helper function to map Core results to Axum responses
fn map_core_result<T: Serialize>(result: Result<T, CoreError>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(e) => {
            let status = error_status(&e);
            if status.is_server_error() {
                tracing::error!("request failed: {}", e);
            }
            (status, Json(ApiResponse::<T>::error(e.to_string()))).into_response()
        }
    }
}

/// Builds the application router
pub fn router(core: Core) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // --- Per-user endpoints --- //
        .route(
            "/api/users/:user/tasks",
            get(list_tasks_handler).post(create_task_handler),
        )
        .route("/api/users/:user/stats", get(stats_handler))
        .route("/api/users/:user/history", get(history_handler))
        .route("/api/users/:user/events", get(events_handler))
        // --- Per-task endpoints --- //
        .route(
            "/api/tasks/:id",
            get(get_task_handler).delete(delete_task_handler),
        )
        .route("/api/tasks/:id/complete", post(complete_task_handler))
        .route("/api/tasks/:id/report", post(report_handler))
        .route("/api/tasks/:id/text", put(edit_text_handler))
        .route("/api/tasks/:id/checklist", put(checklist_handler))
        .route("/api/tasks/:id/reminders", get(reminders_handler))
        .route("/api/motivation", get(motivation_handler))
        .route("/api/weekend", get(weekend_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(core)
}

/// Starts the API server
pub async fn serve(core: Core, config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(core);

    // Start server
    tracing::info!("Starting server on {}", config.address);
    let listener = TcpListener::bind(config.address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- User Handlers --- //

async fn create_task_handler(
    State(core): State<Core>,
    Path(user): Path<i64>,
    Json(draft): Json<TaskDraft>,
) -> impl IntoResponse {
    map_core_result(core.create_task(UserId::new(user), draft).await)
}

async fn list_tasks_handler(State(core): State<Core>, Path(user): Path<i64>) -> impl IntoResponse {
    map_core_result(core.list_active(UserId::new(user)).await)
}

async fn stats_handler(State(core): State<Core>, Path(user): Path<i64>) -> impl IntoResponse {
    map_core_result(core.stats(UserId::new(user)).await)
}

async fn history_handler(State(core): State<Core>, Path(user): Path<i64>) -> impl IntoResponse {
    map_core_result(core.history(UserId::new(user)).await)
}

/// Streams the reminders delivered to one user as server-sent events
async fn events_handler(State(core): State<Core>, Path(user): Path<i64>) -> impl IntoResponse {
    let user = UserId::new(user);
    let receiver = core.subscribe();

    let stream = futures::stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(message) if message.user == user => {
                    let data = serde_json::to_string(&message).unwrap_or_default();
                    let event = format!("event: reminder\ndata: {}\n\n", data);
                    return Some((Ok::<_, Infallible>(event), receiver));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("event stream for user {} skipped {} reminders", user, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    // Set headers for event stream
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
        (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
    ];

    (headers, Body::from_stream(stream))
}

// --- Task Handlers --- //

async fn get_task_handler(State(core): State<Core>, Path(id): Path<u64>) -> impl IntoResponse {
    map_core_result(core.get_task(TaskId::new(id)).await)
}

async fn delete_task_handler(State(core): State<Core>, Path(id): Path<u64>) -> impl IntoResponse {
    map_core_result(core.delete_task(TaskId::new(id)).await)
}

async fn complete_task_handler(
    State(core): State<Core>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    map_core_result(core.complete_task(TaskId::new(id)).await)
}

async fn report_handler(
    State(core): State<Core>,
    Path(id): Path<u64>,
    Json(payload): Json<ReportRequest>,
) -> impl IntoResponse {
    map_core_result(core.submit_report(TaskId::new(id), payload.report).await)
}

async fn edit_text_handler(
    State(core): State<Core>,
    Path(id): Path<u64>,
    Json(payload): Json<EditTextRequest>,
) -> impl IntoResponse {
    map_core_result(core.edit_text(TaskId::new(id), payload.text).await)
}

async fn checklist_handler(
    State(core): State<Core>,
    Path(id): Path<u64>,
    Json(payload): Json<ChecklistRequest>,
) -> impl IntoResponse {
    map_core_result(core.set_checklist(TaskId::new(id), payload.items).await)
}

async fn reminders_handler(State(core): State<Core>, Path(id): Path<u64>) -> impl IntoResponse {
    map_core_result(core.pending_reminders(TaskId::new(id)).await)
}

async fn motivation_handler(State(core): State<Core>) -> impl IntoResponse {
    map_core_result::<String>(Ok(core.motivation()))
}

async fn weekend_handler(State(core): State<Core>) -> impl IntoResponse {
    map_core_result::<WeekendStatus>(Ok(core.weekend()))
}
