//! API route definitions
//!
//! - POST {api_path}/preop - Preoperative power predictions
//! - POST {api_path}/postop - Postoperative predictions and constant optimization
//! - GET {api_path}/settings - Active registry limits
//! - GET /health - Liveness

use axum::middleware as axum_mw;
use axum::{routing::{get, post}, Router};

use super::handlers::{self, ApiState};
use super::middleware;

/// Calculation and settings routes, mounted under the configured prefix
pub fn api_routes(state: ApiState) -> Router {
    let calculations = Router::new()
        .route("/preop", post(handlers::post_preop))
        .route("/postop", post(handlers::post_postop))
        .route_layer(axum_mw::from_fn(middleware::require_json));

    Router::new()
        .merge(calculations)
        .route("/settings", get(handlers::get_settings))
        .with_state(state)
}

/// Health endpoint at root level
pub fn health_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state)
}
