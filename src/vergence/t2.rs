//! T2 vergence formula
//!
//! General thin-lens vergence model with a fixed 12 mm vertex distance.
//! Ks are taken as `333 / r`, so the canonical 337.5-based Ks are rescaled:
//!
//! ```text
//! K0  = 333 / 337.5 × aveK
//! ELP = −10.32566272 + 0.326300537 × AL + 0.135332269 × aveK
//!       + 0.62467 × A − 68.747 − 3.336
//! AL' = 0.97971 × AL + 0.65696
//! Rx  = 1000 / (1000 / (1336 / (1336 / (1336 / (AL' − ELP) − P) + ELP) − K0) + 12)
//! ```

use super::{a_constant, finite, input, ElpLinearization, FormulaError, VergenceFormula};
use crate::types::{EyeVariables, LensConstants, VariableName};

/// Spectacle vertex distance (mm); `V` is ignored.
const VERTEX_MM: f64 = 12.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct T2;

impl VergenceFormula for T2 {
    fn name(&self) -> &'static str {
        "T2"
    }

    fn uses_vertex_distance(&self) -> bool {
        false
    }

    fn elp_linearization(&self) -> ElpLinearization {
        ElpLinearization {
            slope: 0.62467,
            offset: -68.747,
        }
    }

    #[allow(clippy::suboptimal_flops)]
    fn predict(
        &self,
        constants: &LensConstants,
        variables: &EyeVariables,
        _vertex_distance: f64,
        power: f64,
    ) -> Result<f64, FormulaError> {
        let axial_length = input(variables, VariableName::AxialLength)?;
        let k1 = input(variables, VariableName::K1)?;
        let k2 = input(variables, VariableName::K2)?;
        let a_constant = a_constant(constants)?;

        let ave_k = (k1 + k2) / 2.0;
        let k0 = 333.0 / 337.5 * ave_k;
        let elp = -10.325_662_72 + 0.326_300_537 * axial_length + 0.135_332_269 * ave_k
            + 0.62467 * a_constant
            - 68.747
            - 3.336;
        let al = 0.97971 * axial_length + 0.65696;

        finite(
            1000.0
                / (1000.0 / (1336.0 / (1336.0 / (1336.0 / (al - elp) - power) + elp) - k0)
                    + VERTEX_MM),
        )
    }
}
