//! Shammas-Cooke vergence formula
//!
//! Closed-form thick-lens solution with a variable vertex distance:
//!
//! ```text
//! aveK  = (K1 + K2) / 2
//! pACD  = 0.5835 × A − 64.4
//! Kpost = 0.9611 × aveK − 0.2296 × AL + 6.8872
//! ```
//!
//! The refraction is a ratio of two polynomials in AL, pACD, Kpost, P and V.

use super::{a_constant, finite, input, ElpLinearization, FormulaError, VergenceFormula};
use crate::types::{EyeVariables, LensConstants, VariableName};

/// pACD per unit A-constant
const ELP_SLOPE: f64 = 0.5835;
/// pACD at A = 0
const ELP_OFFSET: f64 = -64.4;

#[derive(Debug, Clone, Copy, Default)]
pub struct ShammasCooke;

impl VergenceFormula for ShammasCooke {
    fn name(&self) -> &'static str {
        "Shammas-Cooke"
    }

    fn uses_vertex_distance(&self) -> bool {
        true
    }

    fn elp_linearization(&self) -> ElpLinearization {
        ElpLinearization {
            slope: ELP_SLOPE,
            offset: ELP_OFFSET,
        }
    }

    #[allow(clippy::many_single_char_names, clippy::suboptimal_flops)]
    fn predict(
        &self,
        constants: &LensConstants,
        variables: &EyeVariables,
        vertex_distance: f64,
        power: f64,
    ) -> Result<f64, FormulaError> {
        let al = input(variables, VariableName::AxialLength)?;
        let k1 = input(variables, VariableName::K1)?;
        let k2 = input(variables, VariableName::K2)?;
        let a_constant = a_constant(constants)?;
        let v = vertex_distance;
        let p = power;

        let ave_k = (k1 + k2) / 2.0;
        let a = self.elp_linearization().elp(a_constant);
        let k = ave_k * 0.9611 - 0.2296 * al + 6.8872;

        let numerator = 53440.0 * (9.0 * al + 23.0) * k
            - ((40.0 * (9.0 * al + 22.0) * a - 400.0 * a * a + 18.0 * al + 45.0) * k
                - 486_972.0 * al
                + 541_080.0 * a
                - 1_217_430.0)
                * p
            - 722_882_880.0;

        let denominator = 53440.0 * (9.0 * v * al + 23.0 * v) * k
            + (36.0 * (13527.0 * v + 500.0) * al
                - 40.0 * (13527.0 * v - 9000.0 * al - 22000.0) * a
                - 400_000.0 * a * a
                + (400.0 * v * a * a
                    - 18.0 * v * al
                    - 40.0 * (9.0 * v * al + 22.0 * v) * a
                    - 45.0 * v)
                    * k
                + 1_217_430.0 * v
                + 45000.0)
                * p
            - 722_882_880.0 * v
            - 480_960_000.0 * al
            - 1_229_120_000.0;

        finite(1000.0 * numerator / denominator)
    }
}
