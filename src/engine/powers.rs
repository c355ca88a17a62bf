//! Candidate power enumeration.
//!
//! Each range `{From, To, By}` yields `From + i × By` for `i = 0, 1, …` while
//! the value does not exceed `To`. Floating-point drift from `0.1`-style
//! steps is removed by snapping to a 1e-6 grid, but only when the snap moves
//! the value by less than the drift tolerance, so declared values with more
//! decimals are kept as given. The union of all ranges is sorted and
//! deduplicated.

use crate::config::defaults::POWER_GRID_DECIMALS;
use crate::config::LimitsConfig;
use crate::types::PowerRange;
use crate::vergence::round_to;

/// Slack on the inclusive upper bound, and the largest drift a grid snap may
/// correct.
const DRIFT_TOLERANCE: f64 = 1e-9;

/// Upper bound on candidates taken from a single range.
const MAX_CANDIDATES_PER_RANGE: u32 = 100_000;

/// Ascending, duplicate-free powers covered by `ranges`.
///
/// Ranges with a non-positive step or non-finite bound contribute nothing.
pub fn enumerate(ranges: &[PowerRange]) -> Vec<f64> {
    let mut powers = Vec::new();
    for range in ranges {
        if !(range.step > 0.0) || !range.from.is_finite() || !range.to.is_finite() {
            continue;
        }
        for i in 0..MAX_CANDIDATES_PER_RANGE {
            let power = without_drift(range.from + f64::from(i) * range.step);
            if power > range.to + DRIFT_TOLERANCE {
                break;
            }
            powers.push(power.min(range.to));
        }
    }
    powers.sort_by(f64::total_cmp);
    powers.dedup();
    powers
}

fn without_drift(power: f64) -> f64 {
    let snapped = round_to(power, POWER_GRID_DECIMALS);
    if (snapped - power).abs() < DRIFT_TOLERANCE {
        snapped
    } else {
        power
    }
}

/// Candidates for one IOL: its own ranges, or the registry default set when
/// it declared none.
pub fn candidate_powers(ranges: Option<&[PowerRange]>, limits: &LimitsConfig) -> Vec<f64> {
    match ranges {
        Some(ranges) => enumerate(ranges),
        None => enumerate(&limits.default_power_set()),
    }
}
