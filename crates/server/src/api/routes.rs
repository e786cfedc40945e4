use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware, statistics, torrents};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Torrents
        .route("/torrents", get(torrents::list_torrents))
        .route("/torrents/count", get(torrents::count_torrents))
        .route("/torrents/{info_hash}", get(torrents::get_torrent))
        .route("/torrents/{info_hash}/files", get(torrents::get_files))
        // Statistics
        .route("/statistics", get(statistics::get_statistics))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
