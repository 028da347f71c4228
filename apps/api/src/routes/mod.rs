pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::tools::handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Session lifecycle
        .route("/api/v1/sessions", post(handlers::handle_create_session))
        .route("/api/v1/sessions/:id", get(handlers::handle_get_session))
        .route(
            "/api/v1/sessions/:id/resume",
            post(handlers::handle_upload_resume),
        )
        .route("/api/v1/sessions/:id/reset", post(handlers::handle_reset))
        // Tools
        .route(
            "/api/v1/sessions/:id/cover-letter",
            post(handlers::handle_cover_letter),
        )
        .route(
            "/api/v1/sessions/:id/cover-letter/download",
            get(handlers::handle_download_cover_letter),
        )
        .route("/api/v1/sessions/:id/check", post(handlers::handle_check))
        .route("/api/v1/sessions/:id/match", post(handlers::handle_match))
        .route("/api/v1/sessions/:id/chat", post(handlers::handle_chat))
        .with_state(state)
}
