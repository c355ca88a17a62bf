//! Preoperative engine: per-eye, per-IOL power predictions.
//!
//! Eyes and their IOLs are evaluated on the rayon pool; results come back in
//! request order. A failing eye or IOL becomes an error record and never
//! aborts its siblings.

use rayon::prelude::*;
use serde_json::Value;
use tracing::debug;

use super::errors::{EyeError, IolError};
use super::powers::candidate_powers;
use super::request::PreopRequest;
use super::selector::select_best;
use crate::config::EngineConfig;
use crate::types::{
    EyeVariables, IolResult, IolSpec, LensConstants, PowerRange, PredictionRecord, PreopEye,
    PreopEyeResult,
};
use crate::vergence::{normalize, round_to, VergenceFormula};

/// Eye-level properties besides the declared biometric variables.
const EYE_PROPERTIES: [&str; 2] = ["TgtRx", "IOLs"];

/// IOL-level properties besides the declared lens constants.
const IOL_PROPERTIES: [&str; 1] = ["Powers"];

/// Shared per-request context.
struct Preop<'a> {
    request: &'a PreopRequest,
    config: &'a EngineConfig,
    formula: &'static dyn VergenceFormula,
}

/// Calculate every eye of a validated request.
pub fn calculate_preop(request: &PreopRequest, config: &EngineConfig) -> Vec<PreopEyeResult> {
    let ctx = Preop {
        request,
        config,
        formula: config.formula.kind.formula(),
    };
    request
        .eyes
        .par_iter()
        .enumerate()
        .map(|(index, eye)| match ctx.eye(eye) {
            Ok(iols) => PreopEyeResult::Iols { iols },
            Err(e) => {
                debug!(eye = index, error = %e, "Preop eye rejected");
                PreopEyeResult::error(e.to_string())
            }
        })
        .collect()
}

impl Preop<'_> {
    fn eye(&self, raw: &Value) -> Result<Vec<IolResult>, EyeError> {
        let obj = raw.as_object().ok_or(EyeError::NotAnObject)?;

        if let Some(key) = obj.keys().find(|key| !self.is_eye_property(key)) {
            return Err(EyeError::InvalidProperty(key.clone()));
        }

        let variables = normalize(&EyeVariables::from_json(obj), self.request.k_index, self.config)?;

        let bounds = self.config.limits.target_refraction;
        let target_refraction = obj
            .get("TgtRx")
            .and_then(Value::as_f64)
            .filter(|t| bounds.contains(*t))
            .ok_or(EyeError::TargetRefraction {
                min: bounds.min,
                max: bounds.max,
            })?;

        // Eye-level IOLs override the request-level list
        let count = self.config.limits.iols_per_eye;
        let iols = match obj.get("IOLs").filter(|v| !v.is_null()) {
            Some(Value::Array(iols)) => Some(iols.as_slice()),
            Some(_) => None,
            None => self.request.iols.as_deref(),
        }
        .filter(|iols| count.contains(iols.len()))
        .ok_or(EyeError::IolCount {
            min: count.min,
            max: count.max,
        })?;

        let eye = PreopEye {
            variables,
            target_refraction,
        };

        Ok(iols
            .par_iter()
            .enumerate()
            .map(|(index, iol)| match self.iol(&eye, iol) {
                Ok(predictions) => IolResult::Predictions { predictions },
                Err(e) => {
                    debug!(iol = index, error = %e, "IOL rejected");
                    IolResult::error(e.to_string())
                }
            })
            .collect())
    }

    fn iol(&self, eye: &PreopEye, raw: &Value) -> Result<Vec<PredictionRecord>, IolError> {
        let spec = self.parse_iol(raw)?;
        let candidates = candidate_powers(spec.powers.as_deref(), &self.config.limits);

        let records = select_best(
            eye.target_refraction,
            &candidates,
            self.request.predictions_per_iol,
            |power| {
                self.formula.predict(
                    &spec.constants,
                    &eye.variables,
                    self.request.vertex_distance,
                    power,
                )
            },
        )
        .ok_or(IolError::Calculation)?;

        let decimals = self.config.formula.round_answer_decimals;
        Ok(records
            .into_iter()
            .map(|r| PredictionRecord {
                predicted_refraction: round_to(r.predicted_refraction, decimals),
                ..r
            })
            .collect())
    }

    /// Validate one IOL object into its rounded constants and power ranges.
    fn parse_iol(&self, raw: &Value) -> Result<IolSpec, IolError> {
        let obj = raw.as_object().ok_or(IolError::NotAnObject)?;

        if let Some(key) = obj.keys().find(|key| {
            !IOL_PROPERTIES.contains(&key.as_str()) && !self.config.lens_constants.contains_key(*key)
        }) {
            return Err(IolError::InvalidProperty(key.clone()));
        }

        let mut constants = LensConstants::new();
        for (name, spec) in &self.config.lens_constants {
            let value = obj
                .get(name)
                .and_then(Value::as_f64)
                .filter(|v| spec.contains(*v))
                .ok_or_else(|| IolError::ConstantOutOfRange {
                    name: name.clone(),
                    min: spec.min,
                    max: spec.max,
                })?;
            constants.set(name, spec.round(value));
        }

        let powers = match obj.get("Powers") {
            None => None,
            Some(Value::Array(ranges))
                if !ranges.is_empty() && ranges.len() <= self.config.limits.max_power_ranges =>
            {
                Some(self.parse_power_ranges(ranges)?)
            }
            Some(_) => return Err(IolError::PowersShape),
        };

        Ok(IolSpec { constants, powers })
    }

    fn parse_power_ranges(&self, ranges: &[Value]) -> Result<Vec<PowerRange>, IolError> {
        let limits = &self.config.limits;
        let invalid = || IolError::PowerRange {
            min: limits.iol_power.min,
            max: limits.iol_power.max,
            min_step: limits.min_power_step,
        };
        ranges
            .iter()
            .map(|raw| {
                let field = |key: &str| raw.get(key).and_then(Value::as_f64);
                match (field("From"), field("To"), field("By")) {
                    (Some(from), Some(to), Some(step)) => {
                        let range = PowerRange::new(from, to, step);
                        if range.is_valid(&limits.iol_power, limits.min_power_step) {
                            Ok(range)
                        } else {
                            Err(invalid())
                        }
                    }
                    _ => Err(invalid()),
                }
            })
            .collect()
    }

    fn is_eye_property(&self, key: &str) -> bool {
        EYE_PROPERTIES.contains(&key)
            || self
                .config
                .declared_variables()
                .any(|(name, _)| name.as_str() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::request::parse_preop;
    use serde_json::json;

    fn run(body: Value) -> Vec<PreopEyeResult> {
        let config = EngineConfig::default();
        let request = parse_preop(&body, &config).unwrap();
        calculate_preop(&request, &config)
    }

    fn scenario(predictions_per_iol: usize) -> Vec<PredictionRecord> {
        let results = run(json!({
            "KIndex": 1.3375,
            "V": 12,
            "PredictionsPerIol": predictions_per_iol,
            "IOLs": [{ "AConstant": 119, "Powers": [{ "From": 6, "To": 30, "By": 0.5 }] }],
            "Eyes": [{ "AL": 24, "K1": 40, "K2": 42, "TgtRx": -1 }]
        }));
        results[0].iols().unwrap()[0].predictions().unwrap().to_vec()
    }

    #[test]
    fn test_single_prediction_is_best() {
        let records = scenario(1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].power, 25.0);
        assert_eq!(records[0].predicted_refraction, -1.1545);
        assert!(records[0].is_best_option);
    }

    #[test]
    fn test_three_predictions_around_best() {
        let records = scenario(3);
        let got: Vec<_> = records
            .iter()
            .map(|r| (r.power, r.predicted_refraction, r.is_best_option))
            .collect();
        assert_eq!(
            got,
            vec![(24.5, -0.78, false), (25.0, -1.1545, true), (25.5, -1.5336, false)]
        );
    }

    #[test]
    fn test_five_predictions_extend_both_sides() {
        let records = scenario(5);
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].power, 24.0);
        assert_eq!(records[0].predicted_refraction, -0.4099);
        assert_eq!(records[4].power, 26.0);
        assert_eq!(records[4].predicted_refraction, -1.9174);
        assert_eq!(records.iter().filter(|r| r.is_best_option).count(), 1);
    }

    #[test]
    fn test_eye_iols_override_request_iols() {
        let results = run(json!({
            "KIndex": 1.3375,
            "PredictionsPerIol": 1,
            "IOLs": [{ "AConstant": 119, "Powers": [{ "From": 6, "To": 30, "By": 0.5 }] }],
            "Eyes": [{
                "AL": 24, "K1": 40, "K2": 42, "TgtRx": -1,
                "IOLs": [{ "AConstant": 119, "Powers": [{ "From": 6, "To": 31, "By": 5 }] }]
            }]
        }));
        let records = results[0].iols().unwrap()[0].predictions().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].power, 26.0);
        assert_eq!(records[0].predicted_refraction, -1.9174);
    }

    #[test]
    fn test_partial_failures_keep_siblings() {
        let results = run(json!({
            "KIndex": 1.3375,
            "PredictionsPerIol": 1,
            "Eyes": [
                {},
                { "AL": 24, "K1": 40, "K2": 42, "TgtRx": -1, "badProperty": 1 },
                { "AL": 24, "K1": 40, "K2": 42, "TgtRx": -1 },
                { "AL": 24, "K1": 40, "K2": 42, "TgtRx": -1,
                  "IOLs": [{ "badProperty": 1 }, {}, { "AConstant": 119 }] },
                7
            ]
        }));
        assert_eq!(results[0].error_message(), Some("AL is not a valid number."));
        assert_eq!(
            results[1].error_message(),
            Some("Invalid property: \"badProperty\"")
        );
        assert!(results[2]
            .error_message()
            .unwrap()
            .starts_with("This eye does not have a valid amount of IOLs."));

        let iols = results[3].iols().unwrap();
        assert_eq!(iols[0].error_message(), Some("Invalid property: \"badProperty\""));
        assert_eq!(iols[1].error_message(), Some("AConstant must be between 101 and 129"));
        let defaults = iols[2].predictions().unwrap();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].power, 25.0, "default power set is searched");

        assert_eq!(results[4].error_message(), Some("Each eye must be an object."));
    }

    #[test]
    fn test_target_refraction_checked_after_biometry() {
        let results = run(json!({
            "KIndex": 1.3375,
            "PredictionsPerIol": 1,
            "IOLs": [{ "AConstant": 119 }],
            "Eyes": [
                { "AL": 50, "K1": 40, "K2": 42, "TgtRx": 99 },
                { "AL": 24, "K1": 40, "K2": 42, "TgtRx": 99 },
                { "AL": 24, "K1": 40, "K2": 42 }
            ]
        }));
        assert_eq!(results[0].error_message(), Some("AL must be between 13 and 40"));
        let tgt = "TgtRx must be a valid number between -15 and +30.";
        assert_eq!(results[1].error_message(), Some(tgt));
        assert_eq!(results[2].error_message(), Some(tgt));
    }

    #[test]
    fn test_powers_shape_and_range_errors() {
        let results = run(json!({
            "KIndex": 1.3375,
            "PredictionsPerIol": 1,
            "Eyes": [{
                "AL": 24, "K1": 40, "K2": 42, "TgtRx": -1,
                "IOLs": [
                    { "AConstant": 119, "Powers": [] },
                    { "AConstant": 119, "Powers": { "From": 6 } },
                    { "AConstant": 119, "Powers": [{ "From": 30, "To": 6, "By": 0.5 }] },
                    { "AConstant": 119, "Powers": [{ "From": 6, "To": 30, "By": 0.01 }] },
                    { "AConstant": 119, "Powers": [{ "From": 6, "To": 30 }] }
                ]
            }]
        }));
        let iols = results[0].iols().unwrap();
        let shape = "If you specify Powers, you must specify an array with at least one range";
        assert_eq!(iols[0].error_message(), Some(shape));
        assert_eq!(iols[1].error_message(), Some(shape));
        for iol in &iols[2..] {
            assert!(iol
                .error_message()
                .unwrap()
                .starts_with("At least one power range is invalid"));
        }
    }

    #[test]
    fn test_k_index_rescales_before_prediction() {
        let body = |k_index: f64| {
            json!({
                "KIndex": k_index,
                "PredictionsPerIol": 1,
                "IOLs": [{ "AConstant": 119, "Powers": [{ "From": 6, "To": 30, "By": 0.5 }] }],
                "Eyes": [{ "AL": 24, "K1": 40, "K2": 42, "TgtRx": -1 }]
            })
        };
        let canonical = run(body(1.3375));
        let identity = run(body(1.0));
        let rescaled = run(body(1.332));
        assert_eq!(canonical, identity);
        assert_ne!(canonical, rescaled);
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let first = scenario(9);
        for _ in 0..5 {
            assert_eq!(scenario(9), first);
        }
    }
}
