//! API route handlers
//!
//! Calculation handlers take the raw body so that JSON failures produce the
//! engine's own messages instead of axum's rejections. The content type is
//! checked earlier by [`super::middleware::require_json`].
//! The engine runs on the blocking pool; it fans out onto rayon from there.

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use super::envelope::ApiError;
use crate::config::{EngineConfig, FormulaConfig, LimitsConfig, OptimizationConfig};
use crate::engine::{self, RequestError};
use crate::types::{LensConstantSpec, PostopResponse, PreopEyeResult, VariableSpec};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Engine configuration the server was started with
    pub config: Arc<EngineConfig>,
    /// Server start, for uptime reporting
    pub started: Instant,
}

impl ApiState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            started: Instant::now(),
        }
    }
}

// ============================================================================
// Calculation Endpoints
// ============================================================================

/// POST {api_path}/preop - Power predictions for each eye and IOL
pub async fn post_preop(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<Vec<PreopEyeResult>>, ApiError> {
    let body = json_body(&body)?;
    let config = Arc::clone(&state.config);
    let results = tokio::task::spawn_blocking(move || engine::preop(&body, &config))
        .await
        .map_err(join_error)?
        .inspect_err(|e| debug!(error = %e, "Preop request rejected"))?;
    Ok(Json(results))
}

/// POST {api_path}/postop - Refraction predictions, optionally after
/// optimizing the lens constant
pub async fn post_postop(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<PostopResponse>, ApiError> {
    let body = json_body(&body)?;
    let config = Arc::clone(&state.config);
    let response = tokio::task::spawn_blocking(move || engine::postop(&body, &config))
        .await
        .map_err(join_error)?
        .inspect_err(|e| debug!(error = %e, "Postop request rejected"))?;
    Ok(Json(response))
}

fn json_body(body: &[u8]) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|_| RequestError::NotJson.into())
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    error!(error = %e, "Calculation task failed");
    ApiError::internal(engine::CALCULATION_FAILED)
}

// ============================================================================
// Settings Endpoint
// ============================================================================

/// Registry limits as served to API consumers
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub formula: FormulaConfig,
    pub limits: LimitsConfig,
    pub optimization: OptimizationConfig,
    pub lens_constants: BTreeMap<String, LensConstantSpec>,
    pub variables: BTreeMap<String, VariableSpec>,
}

/// GET {api_path}/settings - Active limits, constants and variables
pub async fn get_settings(State(state): State<ApiState>) -> Json<SettingsResponse> {
    let config = &state.config;
    Json(SettingsResponse {
        formula: config.formula.clone(),
        limits: config.limits.clone(),
        optimization: config.optimization.clone(),
        lens_constants: config.lens_constants.clone(),
        variables: config.variables.clone(),
    })
}

// ============================================================================
// Health Endpoint
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub formula: &'static str,
    pub uptime_seconds: u64,
}

/// GET /health
pub async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        formula: state.config.formula.kind.formula().name(),
        uptime_seconds: state.started.elapsed().as_secs(),
    })
}
