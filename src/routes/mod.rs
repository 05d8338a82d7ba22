//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router serves the viewer WebSocket, a health probe and the
//! static viewer assets. Production compresses responses; development serves
//! straight from the source directory and disables caching.

pub mod ws;

use axum::Router;
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderValue, StatusCode};
use axum::routing::get;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Mode;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mode = state.config.mode;
    let assets = ServeDir::new(&state.config.assets_dir).append_index_html_on_directories(true);

    let router = Router::new()
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .fallback_service(assets)
        .layer(cors)
        .with_state(state);

    let router = match mode {
        Mode::Production => router.layer(CompressionLayer::new()),
        Mode::Development => {
            router.layer(SetResponseHeaderLayer::overriding(CACHE_CONTROL, HeaderValue::from_static("no-store")))
        }
    };

    router.layer(TraceLayer::new_for_http())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
