//! Vergence Formulas
//!
//! Thick-lens vergence models that turn biometry, lens constants and an IOL
//! power into a predicted spectacle refraction.
//!
//! ## Formula Families
//!
//! - **Shammas-Cooke**: variable vertex distance `V`
//! - **T2**: fixed 12 mm vertex distance
//!
//! Both expose a linear ELP model in the A-constant,
//! `ELP = slope × A + offset`, which the lens-constant solver inverts, and the
//! Gatinel refraction-vs-ELP sensitivity:
//!
//! ```text
//! sensitivity = 0.0006 × (P² + (K1 + K2) × P)
//! ```
//!
//! Formulas never range-check their inputs. Call [`normalizer::normalize`]
//! first.

pub mod normalizer;
mod shammas_cooke;
mod t2;

pub use normalizer::{normalize, NormalizeError};
pub use shammas_cooke::ShammasCooke;
pub use t2::T2;

use serde::{Deserialize, Serialize};

use crate::config::defaults::GATINEL_COEFFICIENT;
use crate::types::{EyeVariables, LensConstants, VariableName};

/// Wire name of the A-constant every shipped formula reads.
pub const A_CONSTANT: &str = "AConstant";

/// Inputs both shipped formulas require.
const CORE_VARIABLES: [VariableName; 3] =
    [VariableName::AxialLength, VariableName::K1, VariableName::K2];

// ============================================================================
// Errors
// ============================================================================

/// Numeric failure inside a formula. Never a validation failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    #[error("formula input {0} is missing")]
    MissingVariable(VariableName),

    #[error("lens constant {0} is missing")]
    MissingConstant(&'static str),

    #[error("calculation produced a non-finite refraction ({0})")]
    NonFinite(f64),
}

// ============================================================================
// Strategy Trait
// ============================================================================

/// Linear effective-lens-position model: `ELP = slope × constant + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElpLinearization {
    pub slope: f64,
    pub offset: f64,
}

impl ElpLinearization {
    pub fn elp(&self, constant: f64) -> f64 {
        constant * self.slope + self.offset
    }

    /// Constant whose ELP is `elp`.
    pub fn constant_for(&self, elp: f64) -> f64 {
        (elp - self.offset) / self.slope
    }

    /// Constant after moving its ELP down by `delta_elp`.
    pub fn shift(&self, constant: f64, delta_elp: f64) -> f64 {
        self.constant_for(self.elp(constant) - delta_elp)
    }
}

/// One vergence formula family.
pub trait VergenceFormula: Send + Sync {
    /// Display name for logs and the settings endpoint
    fn name(&self) -> &'static str;

    /// Biometric variables `predict` reads
    fn required_variables(&self) -> &'static [VariableName] {
        &CORE_VARIABLES
    }

    /// Whether the request-level `V` feeds the formula
    fn uses_vertex_distance(&self) -> bool;

    /// ELP model used to move the A-constant during optimization
    fn elp_linearization(&self) -> ElpLinearization;

    /// Predicted spectacle refraction (D) for an IOL of `power` diopters.
    ///
    /// `variables` must already be normalized to the canonical K index.
    fn predict(
        &self,
        constants: &LensConstants,
        variables: &EyeVariables,
        vertex_distance: f64,
        power: f64,
    ) -> Result<f64, FormulaError>;

    /// Gatinel sensitivity of refraction to ELP for this eye and power.
    fn sensitivity(&self, variables: &EyeVariables, power: f64) -> Result<f64, FormulaError> {
        let k_sum = variables
            .k_sum()
            .ok_or(FormulaError::MissingVariable(VariableName::K1))?;
        Ok(GATINEL_COEFFICIENT * (power * power + k_sum * power))
    }
}

/// Selects the formula family at process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaKind {
    #[default]
    ShammasCooke,
    T2,
}

impl FormulaKind {
    pub fn formula(self) -> &'static dyn VergenceFormula {
        match self {
            Self::ShammasCooke => &ShammasCooke,
            Self::T2 => &T2,
        }
    }

    pub fn required_variables(self) -> &'static [VariableName] {
        self.formula().required_variables()
    }

    pub fn uses_vertex_distance(self) -> bool {
        self.formula().uses_vertex_distance()
    }

    /// Lens constant the formula reads.
    pub const fn lens_constant(self) -> &'static str {
        A_CONSTANT
    }
}

impl std::fmt::Display for FormulaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.formula().name())
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Round half away from zero on `value × 10^decimals`.
///
/// Idempotent: `round_to(round_to(x, n), n) == round_to(x, n)`.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals.min(i32::MAX as u32) as i32);
    (value * factor).round() / factor
}

/// Fetch a formula input, treating absence as a numeric failure.
pub(crate) fn input(variables: &EyeVariables, name: VariableName) -> Result<f64, FormulaError> {
    variables
        .get(name)
        .ok_or(FormulaError::MissingVariable(name))
}

pub(crate) fn a_constant(constants: &LensConstants) -> Result<f64, FormulaError> {
    constants
        .get(A_CONSTANT)
        .ok_or(FormulaError::MissingConstant(A_CONSTANT))
}

pub(crate) fn finite(refraction: f64) -> Result<f64, FormulaError> {
    if refraction.is_finite() {
        Ok(refraction)
    } else {
        Err(FormulaError::NonFinite(refraction))
    }
}
