//! Control surface: liveness and the one-way stop switch.

use crate::server::AppContext;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

pub const RUNNING_MESSAGE: &str = "Streaming is running!";
pub const STOPPED_MESSAGE: &str = "Streaming stopped!";
pub const NOT_RUNNING_MESSAGE: &str = "Streaming is not running.";

pub fn control_routes() -> Router<AppContext> {
    Router::new()
        .route("/", get(status))
        .route("/stop", post(stop))
}

/// The process is up. `active` mirrors the run flag only.
async fn status(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(json!({
        "message": RUNNING_MESSAGE,
        "active": ctx.run_state.is_active(),
    }))
}

/// Clear the run flag. The supervisor notices before its next item.
async fn stop(State(ctx): State<AppContext>) -> impl IntoResponse {
    if ctx.run_state.request_stop() {
        tracing::info!("Stopping the stream...");
        (StatusCode::OK, Json(json!({ "message": STOPPED_MESSAGE })))
    } else {
        tracing::debug!("Stop requested but streaming is not running");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": NOT_RUNNING_MESSAGE })),
        )
    }
}
