//! Eye-variable normalization.
//!
//! Range-checks one eye's biometry against the registry, then rescales the
//! keratometry to the canonical keratometric index:
//!
//! ```text
//! K' = (n_canonical − 1) / (n_supplied − 1) × K
//! ```
//!
//! A supplied index of exactly 1 means the Ks are already canonical.

use crate::config::EngineConfig;
use crate::types::{EyeVariables, Usage, VariableName};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("{0} is not a valid number.")]
    MissingRequiredVariable(VariableName),

    #[error("{name} must be between {min} and {max}")]
    OutOfRange { name: VariableName, min: f64, max: f64 },
}

/// Validate `variables` and convert their Ks from `k_index` to the canonical
/// index. The first failure in variable declaration order is returned.
#[allow(clippy::float_cmp)]
pub fn normalize(
    variables: &EyeVariables,
    k_index: f64,
    config: &EngineConfig,
) -> Result<EyeVariables, NormalizeError> {
    for (name, spec) in config.declared_variables() {
        let value = variables.get(name);
        if spec.usage == Usage::Required && value.map_or(true, f64::is_nan) {
            return Err(NormalizeError::MissingRequiredVariable(name));
        }
        if let Some(v) = value {
            if !spec.contains(v) {
                return Err(NormalizeError::OutOfRange {
                    name,
                    min: spec.min,
                    max: spec.max,
                });
            }
        }
    }

    let canonical = config.formula.canonical_k_index;
    let mut normalized = variables.clone();
    if k_index != 1.0 && k_index != canonical {
        let factor = (canonical - 1.0) / (k_index - 1.0);
        for name in [VariableName::K1, VariableName::K2] {
            if let Some(k) = variables.get(name) {
                normalized.set(name, factor * k);
            }
        }
    }
    Ok(normalized)
}
