use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_size as usize;

    Router::new()
        // Files
        .route(
            "/files",
            get(handlers::list_files)
                .post(handlers::create_file)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/files/:id", get(handlers::get_file))
        .route("/files/:id/content", get(handlers::get_file_content))
        // References
        .route(
            "/files/:id/references",
            post(handlers::add_reference).delete(handlers::release_reference),
        )
        .route("/owners/:owner/files", get(handlers::owner_files))
        .route(
            "/owners/:owner/references",
            axum::routing::delete(handlers::release_owner),
        )
        // Admin
        .route(
            "/admin/file-cleanup",
            get(handlers::file_cleanup_stats).post(handlers::file_cleanup),
        )
        .route(
            "/admin/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        // Internal
        .route("/_internal/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
