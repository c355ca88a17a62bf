//! Postoperative engine and lens-constant optimization.
//!
//! Direct mode predicts one refraction per eye from its implanted power.
//! Optimizing mode first back-solves the A-constant so the mean prediction
//! error over the population vanishes, then predicts with the solved value.
//!
//! ## Solver
//!
//! ```text
//! totalError       = Σ (predicted − observed)
//! totalSensitivity = Σ 0.0006 × (P² + (K1 + K2) × P)
//! ΔELP             = totalError / totalSensitivity
//! A'               = linearization⁻¹(linearization(A) − ΔELP)
//! ```
//!
//! Iteration stops once `|totalError / n| < 10^-decimals` or the iteration
//! cap is reached. The initial evaluation counts as iteration 1. Sums run
//! sequentially in input order so results are bit-reproducible.

use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::errors::{EyeError, RequestError};
use super::request::PostopRequest;
use crate::config::defaults::FALLBACK_CONSTANT_DECIMALS;
use crate::config::EngineConfig;
use crate::types::{EyeVariables, LensConstants, PostopEye, PostopPrediction, PostopResponse};
use crate::vergence::{normalize, round_to, VergenceFormula};

/// Eye-level properties besides the declared biometric variables.
const EYE_PROPERTIES: [&str; 2] = ["IolPower", "Ref"];

// ============================================================================
// Entry Point
// ============================================================================

/// Calculate a validated postoperative request.
///
/// Fails as a whole only when optimization preconditions are not met.
pub fn calculate_postop(
    request: &PostopRequest,
    config: &EngineConfig,
) -> Result<PostopResponse, RequestError> {
    let formula = config.formula.kind.formula();
    let mut constants = request.constants.clone();

    if request.optimize {
        constants = optimize(request, config, formula)?;
    }

    let decimals = config.formula.round_answer_decimals;
    let predictions = request
        .eyes
        .par_iter()
        .enumerate()
        .map(|(index, raw)| {
            let result = parse_eye(raw, request.k_index, config).and_then(|eye| {
                formula
                    .predict(&constants, &eye.variables, request.vertex_distance, eye.implanted_power)
                    .map_err(EyeError::from)
            });
            match result {
                Ok(rx) => PostopPrediction::Refraction(round_to(rx, decimals)),
                Err(e) => {
                    debug!(eye = index, error = %e, "Postop eye rejected");
                    PostopPrediction::Error(e.to_string())
                }
            }
        })
        .collect();

    Ok(PostopResponse {
        constants,
        predictions,
    })
}

/// Check optimization preconditions, run the solver and return the request
/// constants with the optimized one replaced.
fn optimize(
    request: &PostopRequest,
    config: &EngineConfig,
    formula: &'static dyn VergenceFormula,
) -> Result<LensConstants, RequestError> {
    let has_reference = |raw: &Value| {
        raw.get("Ref")
            .and_then(Value::as_f64)
            .is_some_and(|r| !r.is_nan())
    };
    if !request.eyes.iter().all(has_reference) {
        return Err(RequestError::MissingReference);
    }

    // Eyes that validate and predict at the starting constants
    let samples: Vec<OptimizationSample> = request
        .eyes
        .par_iter()
        .filter_map(|raw| {
            let eye = parse_eye(raw, request.k_index, config).ok()?;
            formula
                .predict(&request.constants, &eye.variables, request.vertex_distance, eye.implanted_power)
                .ok()?;
            OptimizationSample::new(eye, formula)
        })
        .collect();

    let min = config.optimization.min_eyes;
    let max = config.limits.postop_eyes.max;
    if samples.len() < min || samples.len() > max {
        return Err(RequestError::OptimizationEyeCount { min, max });
    }
    if samples.len() < config.optimization.ideal_min_eyes {
        warn!(
            eyes = samples.len(),
            ideal = config.optimization.ideal_min_eyes,
            "Optimizing with fewer eyes than ideal; the constant may be unreliable"
        );
    }

    let Some((name, spec)) = config.optimizable_constant() else {
        // Config validation guarantees the optimizable constant is declared
        return Ok(request.constants.clone());
    };

    let solver = ConstantSolver {
        formula,
        vertex_distance: request.vertex_distance,
        constant: name,
        decimals: spec.rounding_decimals.unwrap_or(FALLBACK_CONSTANT_DECIMALS),
        max_iterations: config.optimization.max_iterations,
    };
    let outcome = solver.solve(&samples, request.constants.clone());

    info!(
        constant = name,
        value = outcome.constant,
        iterations = outcome.iterations,
        converged = outcome.converged,
        eyes = samples.len(),
        "Lens constant optimized"
    );

    Ok(outcome.constants)
}

/// Validate one postoperative eye.
fn parse_eye(raw: &Value, k_index: f64, config: &EngineConfig) -> Result<PostopEye, EyeError> {
    let obj = raw.as_object().ok_or(EyeError::NotAnObject)?;

    if let Some(key) = obj.keys().find(|key| {
        !EYE_PROPERTIES.contains(&key.as_str())
            && !config
                .declared_variables()
                .any(|(name, _)| name.as_str() == key.as_str())
    }) {
        return Err(EyeError::InvalidProperty(key.clone()));
    }

    let variables = normalize(&EyeVariables::from_json(obj), k_index, config)?;

    let bounds = config.limits.iol_power;
    let implanted_power = obj
        .get("IolPower")
        .and_then(Value::as_f64)
        .filter(|p| bounds.contains(*p))
        .ok_or(EyeError::ImplantedPower {
            min: bounds.min,
            max: bounds.max,
        })?;

    Ok(PostopEye {
        variables,
        implanted_power,
        observed_refraction: obj.get("Ref").and_then(Value::as_f64),
    })
}

// ============================================================================
// Solver
// ============================================================================

/// One eye's contribution to the solve.
#[derive(Debug, Clone)]
pub struct OptimizationSample {
    pub eye: PostopEye,
    pub observed: f64,
    pub sensitivity: f64,
}

impl OptimizationSample {
    /// `None` when the eye carries no observed refraction or its sensitivity
    /// cannot be computed.
    pub fn new(eye: PostopEye, formula: &dyn VergenceFormula) -> Option<Self> {
        let observed = eye.observed_refraction?;
        let sensitivity = formula.sensitivity(&eye.variables, eye.implanted_power).ok()?;
        Some(Self {
            eye,
            observed,
            sensitivity,
        })
    }
}

/// Solver state, moved through iterations.
#[derive(Debug, Clone)]
pub struct OptimizationState {
    pub constants: LensConstants,
    pub iteration_count: u32,
    pub total_error: f64,
    pub total_sensitivity: f64,
}

/// Result of one solve.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    /// Input constants with the optimized one replaced by its rounded value
    pub constants: LensConstants,
    /// Rounded optimized value
    pub constant: f64,
    pub iterations: u32,
    pub converged: bool,
}

/// Iterative solver for one lens constant.
pub struct ConstantSolver<'a> {
    pub formula: &'a dyn VergenceFormula,
    pub vertex_distance: f64,
    /// Wire name of the constant to adjust
    pub constant: &'a str,
    /// Convergence threshold and output precision
    pub decimals: u32,
    pub max_iterations: u32,
}

impl ConstantSolver<'_> {
    pub fn solve(&self, samples: &[OptimizationSample], initial: LensConstants) -> OptimizationOutcome {
        #[allow(clippy::cast_precision_loss)]
        let eye_count = samples.len().max(1) as f64;
        let threshold = 1.0 / 10f64.powi(i32::try_from(self.decimals).unwrap_or(i32::MAX));
        let linearization = self.formula.elp_linearization();

        let mut state = OptimizationState {
            total_error: self.total_error(samples, &initial),
            total_sensitivity: samples.iter().fold(0.0, |acc, s| acc + s.sensitivity),
            constants: initial,
            iteration_count: 1,
        };

        while (state.total_error / eye_count).abs() >= threshold
            && state.iteration_count < self.max_iterations
        {
            if !state.total_sensitivity.is_normal() {
                warn!(
                    total_sensitivity = state.total_sensitivity,
                    "Sensitivity sum unusable, stopping optimization"
                );
                break;
            }
            let Some(current) = state.constants.get(self.constant) else {
                break;
            };

            let delta_elp = state.total_error / state.total_sensitivity;
            let mut constants = state.constants;
            constants.set(self.constant, linearization.shift(current, delta_elp));

            state = OptimizationState {
                total_error: self.total_error(samples, &constants),
                constants,
                iteration_count: state.iteration_count + 1,
                total_sensitivity: state.total_sensitivity,
            };
            debug!(
                iteration = state.iteration_count,
                mean_error = state.total_error / eye_count,
                "Optimization step"
            );
        }

        let converged = (state.total_error / eye_count).abs() < threshold;
        let mut constants = state.constants;
        let constant = constants
            .get(self.constant)
            .map_or(f64::NAN, |value| round_to(value, self.decimals));
        constants.set(self.constant, constant);

        OptimizationOutcome {
            constants,
            constant,
            iterations: state.iteration_count,
            converged,
        }
    }

    /// `Σ (predicted − observed)` in sample order; failed predictions add 0.
    fn total_error(&self, samples: &[OptimizationSample], constants: &LensConstants) -> f64 {
        samples.iter().fold(0.0, |acc, s| {
            let error = self
                .formula
                .predict(constants, &s.eye.variables, self.vertex_distance, s.eye.implanted_power)
                .map_or(0.0, |predicted| predicted - s.observed);
            acc + error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::request::parse_postop;
    use crate::types::VariableName;
    use crate::vergence::{ShammasCooke, T2};
    use serde_json::json;

    fn run(body: &Value) -> Result<PostopResponse, RequestError> {
        let config = EngineConfig::default();
        let request = parse_postop(body, &config)?;
        calculate_postop(&request, &config)
    }

    fn identical_eyes(count: usize, reference: f64) -> Value {
        json!(vec![
            json!({ "AL": 21.88, "K1": 45.91, "K2": 45.91, "IolPower": 27.5, "Ref": reference });
            count
        ])
    }

    fn optimize_body(reference: f64) -> Value {
        json!({
            "KIndex": 1.3375,
            "V": 12,
            "AConstant": 121,
            "Optimize": true,
            "Eyes": identical_eyes(50, reference)
        })
    }

    #[test]
    fn test_direct_mode_mixed_eyes() {
        let response = run(&json!({
            "KIndex": 1,
            "V": 12,
            "AConstant": 119,
            "Optimize": false,
            "Eyes": [
                { "badProperty": 1 },
                { "K1": 44.12, "K2": 44.12, "IolPower": 20 },
                { "AL": 41, "K1": 44.12, "K2": 44.12, "IolPower": 20 },
                { "AL": 23.6, "K1": 44.12, "K2": 44.12 },
                { "AL": 23.6, "K1": 44.12, "K2": 44.12, "IolPower": 20 }
            ]
        }))
        .unwrap();

        assert_eq!(response.constants.get("AConstant"), Some(119.0));
        let messages: Vec<_> = response
            .predictions
            .iter()
            .map(|p| p.error_message().map(str::to_string))
            .collect();
        assert_eq!(messages[0].as_deref(), Some("Invalid property: \"badProperty\""));
        assert_eq!(messages[1].as_deref(), Some("AL is not a valid number."));
        assert_eq!(messages[2].as_deref(), Some("AL must be between 13 and 40"));
        assert_eq!(
            messages[3].as_deref(),
            Some("IolPower must be a number between -20 and 80")
        );
        assert_eq!(response.predictions[4].refraction(), Some(0.3557));
    }

    #[test]
    fn test_direct_mode_ignores_ref() {
        let response = run(&json!({
            "KIndex": 1.3375,
            "AConstant": 119,
            "Optimize": false,
            "Eyes": [{ "AL": 23.6, "K1": 44.12, "K2": 44.12, "IolPower": 20, "Ref": 3 }]
        }))
        .unwrap();
        assert_eq!(response.predictions[0].refraction(), Some(0.3557));
    }

    #[test]
    fn test_optimize_to_emmetropia() {
        let response = run(&optimize_body(0.0)).unwrap();
        assert_eq!(response.constants.get("AConstant"), Some(121.17331));
        assert_eq!(response.predictions.len(), 50);
        assert!(response
            .predictions
            .iter()
            .all(|p| p.refraction().is_some_and(|rx| rx.abs() < 1e-4)));
    }

    #[test]
    fn test_optimize_to_myopic_reference() {
        let response = run(&optimize_body(-0.25)).unwrap();
        assert_eq!(response.constants.get("AConstant"), Some(120.94121));
        assert!(response
            .predictions
            .iter()
            .all(|p| p.refraction().is_some_and(|rx| (rx + 0.25).abs() < 1e-4)));
    }

    #[test]
    fn test_optimize_requires_ref_on_every_eye() {
        let mut body = optimize_body(0.0);
        body["Eyes"][3].as_object_mut().unwrap().remove("Ref");
        assert_eq!(run(&body).unwrap_err(), RequestError::MissingReference);
    }

    #[test]
    fn test_optimize_requires_minimum_valid_eyes() {
        let mut body = optimize_body(0.0);
        body["Eyes"][0]["AL"] = json!(99);
        let err = run(&body).unwrap_err();
        assert_eq!(
            err.to_string(),
            "When optimizing lens constants, you must provide between 50 and 10000 eyes with valid data."
        );
    }

    #[test]
    fn test_invalid_eyes_still_reported_after_optimizing() {
        let mut body = optimize_body(0.0);
        let mut eyes = identical_eyes(51, 0.0);
        eyes[50]["IolPower"] = json!(100);
        body["Eyes"] = eyes;
        let response = run(&body).unwrap();
        assert_eq!(response.predictions.len(), 51);
        assert!(response.predictions[50].error_message().is_some());
        assert_eq!(response.constants.get("AConstant"), Some(121.17331));
    }

    fn sample(reference: f64) -> OptimizationSample {
        let eye = PostopEye {
            variables: EyeVariables::new()
                .with(VariableName::AxialLength, 23.6)
                .with(VariableName::K1, 44.12)
                .with(VariableName::K2, 44.12),
            implanted_power: 20.0,
            observed_refraction: Some(reference),
        };
        OptimizationSample::new(eye, &ShammasCooke).unwrap()
    }

    fn solver(formula: &dyn VergenceFormula) -> ConstantSolver<'_> {
        ConstantSolver {
            formula,
            vertex_distance: 12.0,
            constant: "AConstant",
            decimals: 5,
            max_iterations: 20,
        }
    }

    #[test]
    fn test_zero_initial_error_stops_after_first_iteration() {
        let initial = LensConstants::new().with("AConstant", 119.000_001);
        let exact = ShammasCooke
            .predict(&initial, &sample(0.0).eye.variables, 12.0, 20.0)
            .unwrap();
        let samples = vec![sample(exact); 60];

        let outcome = solver(&ShammasCooke).solve(&samples, initial);
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.converged);
        assert_eq!(outcome.constant, 119.0);
    }

    #[test]
    fn test_iteration_cap_is_respected() {
        let samples = vec![sample(5.0); 50];
        let mut capped = solver(&ShammasCooke);
        capped.max_iterations = 2;
        let outcome = capped.solve(&samples, LensConstants::new().with("AConstant", 119.0));
        assert_eq!(outcome.iterations, 2);
        assert!(!outcome.converged);
    }

    #[test]
    fn test_t2_solver_converges() {
        let samples = vec![sample(0.0); 50];
        let outcome = solver(&T2).solve(&samples, LensConstants::new().with("AConstant", 119.0));
        assert!(outcome.converged);
        let rx = T2
            .predict(&outcome.constants, &samples[0].eye.variables, 12.0, 20.0)
            .unwrap();
        assert!(rx.abs() < 1e-3);
    }

    #[test]
    fn test_zero_sensitivity_stops_without_nan() {
        let mut flat = sample(1.0);
        flat.eye.implanted_power = 0.0;
        flat.sensitivity = 0.0;
        let outcome =
            solver(&ShammasCooke).solve(&vec![flat; 50], LensConstants::new().with("AConstant", 119.0));
        assert_eq!(outcome.constant, 119.0);
        assert_eq!(outcome.iterations, 1);
    }
}
