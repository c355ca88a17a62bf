//! Request-level validation.
//!
//! Each mode runs an ordered list of pure checks over the raw JSON body and
//! stops at the first failure. Checks record what they validated into a
//! [`Draft`], which becomes the typed request once every check passes.
//!
//! Order: unknown root property, `KIndex`, `V`, mode-specific properties,
//! then `Eyes`.

use serde_json::Value;

use super::errors::RequestError;
use crate::config::EngineConfig;
use crate::types::{JsonObject, LensConstants};

/// Accepted spellings of the vertex distance property, in priority order.
const VERTEX_DISTANCE_KEYS: [&str; 2] = ["V", "VertexDistance"];

/// Validated preoperative request. Eyes and IOLs stay raw: they are checked
/// one by one so a bad item does not sink the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PreopRequest {
    pub k_index: f64,
    pub vertex_distance: f64,
    pub predictions_per_iol: usize,
    pub iols: Option<Vec<Value>>,
    pub eyes: Vec<Value>,
}

/// Validated postoperative request.
#[derive(Debug, Clone, PartialEq)]
pub struct PostopRequest {
    pub k_index: f64,
    pub vertex_distance: f64,
    /// Request constants, already rounded to their declared precision
    pub constants: LensConstants,
    pub optimize: bool,
    pub eyes: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Preop,
    Postop,
}

/// Values accumulated by the checks.
#[derive(Debug, Default)]
struct Draft {
    k_index: f64,
    vertex_distance: f64,
    predictions_per_iol: usize,
    iols: Option<Vec<Value>>,
    constants: LensConstants,
    optimize: bool,
    eyes: Vec<Value>,
}

type Check = fn(&JsonObject, &EngineConfig, Mode, &mut Draft) -> Result<(), RequestError>;

const PREOP_CHECKS: &[Check] = &[
    check_root_properties,
    check_k_index,
    check_vertex_distance,
    check_predictions_per_iol,
    check_root_iols,
    check_eyes,
];

const POSTOP_CHECKS: &[Check] = &[
    check_root_properties,
    check_k_index,
    check_vertex_distance,
    check_optimize,
    check_lens_constants,
    check_eyes,
];

/// Validate a preoperative request body.
pub fn parse_preop(body: &Value, config: &EngineConfig) -> Result<PreopRequest, RequestError> {
    let draft = run(body, config, Mode::Preop, PREOP_CHECKS)?;
    Ok(PreopRequest {
        k_index: draft.k_index,
        vertex_distance: draft.vertex_distance,
        predictions_per_iol: draft.predictions_per_iol,
        iols: draft.iols,
        eyes: draft.eyes,
    })
}

/// Validate a postoperative request body.
pub fn parse_postop(body: &Value, config: &EngineConfig) -> Result<PostopRequest, RequestError> {
    let draft = run(body, config, Mode::Postop, POSTOP_CHECKS)?;
    Ok(PostopRequest {
        k_index: draft.k_index,
        vertex_distance: draft.vertex_distance,
        constants: draft.constants,
        optimize: draft.optimize,
        eyes: draft.eyes,
    })
}

fn run(
    body: &Value,
    config: &EngineConfig,
    mode: Mode,
    checks: &[Check],
) -> Result<Draft, RequestError> {
    let root = body.as_object().ok_or(RequestError::NotAnObject)?;
    let mut draft = Draft {
        vertex_distance: config.formula.default_vertex_distance,
        ..Draft::default()
    };
    for check in checks {
        check(root, config, mode, &mut draft)?;
    }
    Ok(draft)
}

/// Root properties accepted in `mode`.
fn root_properties(config: &EngineConfig, mode: Mode) -> Vec<&str> {
    let mut allowed = vec!["KIndex", "Eyes"];
    if config.formula.kind.uses_vertex_distance() {
        allowed.extend(VERTEX_DISTANCE_KEYS);
    }
    match mode {
        Mode::Preop => allowed.extend(["PredictionsPerIol", "IOLs"]),
        Mode::Postop => {
            allowed.push("Optimize");
            allowed.extend(config.lens_constants.keys().map(String::as_str));
        }
    }
    allowed
}

// ============================================================================
// Checks
// ============================================================================

fn check_root_properties(
    root: &JsonObject,
    config: &EngineConfig,
    mode: Mode,
    _draft: &mut Draft,
) -> Result<(), RequestError> {
    let allowed = root_properties(config, mode);
    match root.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(RequestError::UnknownProperty(key.clone())),
        None => Ok(()),
    }
}

fn check_k_index(
    root: &JsonObject,
    config: &EngineConfig,
    _mode: Mode,
    draft: &mut Draft,
) -> Result<(), RequestError> {
    let bounds = config.limits.k_index;
    match root.get("KIndex").and_then(Value::as_f64) {
        Some(k) if bounds.contains(k) => {
            draft.k_index = k;
            Ok(())
        }
        _ => Err(RequestError::KIndex {
            min: bounds.min,
            max: bounds.max,
        }),
    }
}

fn check_vertex_distance(
    root: &JsonObject,
    config: &EngineConfig,
    _mode: Mode,
    draft: &mut Draft,
) -> Result<(), RequestError> {
    if !config.formula.kind.uses_vertex_distance() {
        return Ok(());
    }
    let Some(raw) = VERTEX_DISTANCE_KEYS.iter().find_map(|key| root.get(*key)) else {
        return Ok(());
    };
    let bounds = config.limits.vertex_distance;
    match raw.as_f64() {
        Some(v) if bounds.contains(v) => {
            draft.vertex_distance = v;
            Ok(())
        }
        _ => Err(RequestError::VertexDistance {
            min: bounds.min,
            max: bounds.max,
        }),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn check_predictions_per_iol(
    root: &JsonObject,
    config: &EngineConfig,
    _mode: Mode,
    draft: &mut Draft,
) -> Result<(), RequestError> {
    let bounds = config.limits.predictions_per_iol;
    let value = root.get("PredictionsPerIol").and_then(Value::as_f64);
    match value {
        Some(n)
            if n.fract() == 0.0 && n >= bounds.min as f64 && n <= bounds.max as f64 =>
        {
            draft.predictions_per_iol = n as usize;
            Ok(())
        }
        _ => Err(RequestError::PredictionsPerIol {
            min: bounds.min,
            max: bounds.max,
        }),
    }
}

fn check_root_iols(
    root: &JsonObject,
    config: &EngineConfig,
    _mode: Mode,
    draft: &mut Draft,
) -> Result<(), RequestError> {
    let bounds = config.limits.iols_per_eye;
    match root.get("IOLs") {
        None => Ok(()),
        Some(Value::Array(iols)) if bounds.contains(iols.len()) => {
            draft.iols = Some(iols.clone());
            Ok(())
        }
        Some(_) => Err(RequestError::Iols {
            min: bounds.min,
            max: bounds.max,
        }),
    }
}

fn check_optimize(
    root: &JsonObject,
    _config: &EngineConfig,
    _mode: Mode,
    draft: &mut Draft,
) -> Result<(), RequestError> {
    match root.get("Optimize") {
        Some(Value::Bool(optimize)) => {
            draft.optimize = *optimize;
            Ok(())
        }
        _ => Err(RequestError::Optimize),
    }
}

fn check_lens_constants(
    root: &JsonObject,
    config: &EngineConfig,
    _mode: Mode,
    draft: &mut Draft,
) -> Result<(), RequestError> {
    for (name, spec) in &config.lens_constants {
        match root.get(name).and_then(Value::as_f64) {
            Some(value) if spec.contains(value) => draft.constants.set(name, spec.round(value)),
            _ => {
                return Err(RequestError::LensConstant {
                    name: name.clone(),
                    min: spec.min,
                    max: spec.max,
                })
            }
        }
    }
    Ok(())
}

fn check_eyes(
    root: &JsonObject,
    config: &EngineConfig,
    mode: Mode,
    draft: &mut Draft,
) -> Result<(), RequestError> {
    let bounds = match mode {
        Mode::Preop => config.limits.preop_eyes,
        Mode::Postop => config.limits.postop_eyes,
    };
    match root.get("Eyes") {
        Some(Value::Array(eyes)) if bounds.contains(eyes.len()) => {
            draft.eyes = eyes.clone();
            Ok(())
        }
        _ => Err(RequestError::Eyes {
            min: bounds.min,
            max: bounds.max,
        }),
    }
}
