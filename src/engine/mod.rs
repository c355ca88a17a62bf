//! Calculation engine
//!
//! Two request modes share one pipeline shape:
//!
//! ```text
//! JSON body ──► request checks ──► per-eye validation ──► formula ──► response
//!               (RequestError)     (EyeError / IolError)
//! ```
//!
//! - **Preop**: for each eye and IOL, search candidate powers for the ones
//!   whose predicted refraction lands nearest the target.
//! - **Postop**: predict the refraction an implanted lens produced, optionally
//!   after back-solving the lens constant from observed refractions.

pub mod errors;
pub mod postop;
pub mod powers;
pub mod preop;
pub mod request;
pub mod selector;

pub use errors::{EyeError, IolError, RequestError, CALCULATION_FAILED};
pub use postop::{calculate_postop, ConstantSolver, OptimizationOutcome, OptimizationSample};
pub use preop::calculate_preop;
pub use request::{parse_postop, parse_preop, PostopRequest, PreopRequest};

use serde_json::Value;
use tracing::info;

use crate::config::EngineConfig;
use crate::types::{PostopResponse, PreopEyeResult};

/// Validate and calculate a preoperative request body.
pub fn preop(body: &Value, config: &EngineConfig) -> Result<Vec<PreopEyeResult>, RequestError> {
    let request = parse_preop(body, config)?;
    let results = calculate_preop(&request, config);
    info!(
        eyes = results.len(),
        failed = results.iter().filter(|r| r.error_message().is_some()).count(),
        "Preop request calculated"
    );
    Ok(results)
}

/// Validate and calculate a postoperative request body.
pub fn postop(body: &Value, config: &EngineConfig) -> Result<PostopResponse, RequestError> {
    let request = parse_postop(body, config)?;
    let response = calculate_postop(&request, config)?;
    info!(
        eyes = response.predictions.len(),
        optimized = request.optimize,
        "Postop request calculated"
    );
    Ok(response)
}
