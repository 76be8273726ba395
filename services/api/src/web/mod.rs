pub mod export_task;
pub mod rest;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use rest::{
    export_handler, list_chats_handler, qr_handler, reset_session_handler, status_handler,
};
use state::AppState;

/// Builds the REST router. CORS and the Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/qr", get(qr_handler))
        .route("/chats", get(list_chats_handler))
        .route("/export/clean-for-training", get(export_handler))
        .route("/reset-session", post(reset_session_handler))
        .with_state(app_state)
}
