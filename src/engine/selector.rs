//! Best-match selection.
//!
//! Picks the candidate power whose prediction is nearest the target, then
//! grows a window of neighbouring powers around it until `count` are chosen.
//! The window always stays contiguous in power order, so the output is
//! already sorted ascending.

use tracing::debug;

use crate::types::PredictionRecord;
use crate::vergence::FormulaError;

/// One successfully evaluated candidate.
#[derive(Debug, Clone, Copy)]
struct Evaluated {
    power: f64,
    refraction: f64,
}

/// Up to `count` records around the best match for `target`, ascending by
/// power, with exactly one flagged as the best option.
///
/// `candidates` must be ascending. Candidates whose prediction fails are
/// skipped; `None` when every candidate fails. Refractions are unrounded.
pub fn select_best<F>(
    target: f64,
    candidates: &[f64],
    count: usize,
    predict: F,
) -> Option<Vec<PredictionRecord>>
where
    F: Fn(f64) -> Result<f64, FormulaError>,
{
    let evaluated: Vec<Evaluated> = candidates
        .iter()
        .filter_map(|&power| match predict(power) {
            Ok(refraction) => Some(Evaluated { power, refraction }),
            Err(e) => {
                debug!(power, error = %e, "Candidate power skipped");
                None
            }
        })
        .collect();

    if evaluated.is_empty() {
        return None;
    }
    let error = |e: &Evaluated| (e.refraction - target).abs();

    // Strict `<` keeps the lower power on ties
    let mut best = 0;
    for (i, candidate) in evaluated.iter().enumerate().skip(1) {
        if error(candidate) < error(&evaluated[best]) {
            best = i;
        }
    }

    // Window is evaluated[low..high]
    let mut low = best;
    let mut high = best + 1;
    while high - low < count.max(1) {
        let below = low.checked_sub(1).map(|i| &evaluated[i]);
        let above = evaluated.get(high);
        match (below, above) {
            (Some(b), Some(a)) => {
                // Ties take the lower side
                if error(b) <= error(a) {
                    low -= 1;
                } else {
                    high += 1;
                }
            }
            (Some(_), None) => low -= 1,
            (None, Some(_)) => high += 1,
            (None, None) => break,
        }
    }

    Some(
        evaluated[low..high]
            .iter()
            .enumerate()
            .map(|(i, e)| PredictionRecord {
                power: e.power,
                predicted_refraction: e.refraction,
                is_best_option: low + i == best,
            })
            .collect(),
    )
}
