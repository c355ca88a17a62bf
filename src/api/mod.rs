//! REST API module using Axum
//!
//! Thin HTTP surface over the calculation engine:
//! - POST preop / postop calculations under the configured API prefix
//! - GET settings for the active registry limits
//! - GET /health at the root

pub mod envelope;
pub mod handlers;
pub mod middleware;
mod routes;

pub use envelope::ApiError;
pub use handlers::ApiState;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::middleware as axum_mw;
use axum::Router;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Env var listing allowed CORS origins, comma-separated.
pub const CORS_ORIGINS_ENV_VAR: &str = "IOL_CORS_ORIGINS";

/// Build a CORS layer that allows any origin by default.
///
/// Set `IOL_CORS_ORIGINS` to a comma-separated list of origins to restrict it.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);
    match std::env::var(CORS_ORIGINS_ENV_VAR) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base.allow_origin(Any),
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    let server = state.config.server.clone();
    let api = routes::api_routes(state.clone());

    let router = if server.api_path == "/" {
        Router::new().merge(api)
    } else {
        Router::new().nest(&server.api_path, api)
    };

    router
        .merge(routes::health_routes(state))
        // Middleware
        .layer(axum_mw::from_fn(middleware::no_store))
        .layer(TimeoutLayer::new(Duration::from_secs(server.request_timeout_secs)))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(server.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer())
}
