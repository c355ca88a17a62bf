//! IOL, lens-constant and power-range types

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use super::JsNumber;
use crate::config::Bounds;

// ============================================================================
// Lens Constants
// ============================================================================

/// Registry entry for one lens constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensConstantSpec {
    pub min: f64,
    pub max: f64,
    /// Decimals the constant is rounded to once validated or optimized.
    /// Omit for constants the solver never touches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounding_decimals: Option<u32>,
}

impl LensConstantSpec {
    pub const fn new(min: f64, max: f64, rounding_decimals: Option<u32>) -> Self {
        Self {
            min,
            max,
            rounding_decimals,
        }
    }

    /// NaN is never in range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Round to the declared precision; unrounded when none is declared.
    pub fn round(&self, value: f64) -> f64 {
        match self.rounding_decimals {
            Some(decimals) => crate::vergence::round_to(value, decimals),
            None => value,
        }
    }
}

/// Lens-constant values keyed by wire name.
///
/// Serializes as a flat JSON object so it can be merged into a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LensConstants(BTreeMap<String, f64>);

impl LensConstants {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl Serialize for LensConstants {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, &JsNumber(*value))?;
        }
        map.end()
    }
}

// ============================================================================
// Powers
// ============================================================================

/// Inclusive arithmetic range of candidate IOL powers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerRange {
    #[serde(rename = "From")]
    pub from: f64,
    #[serde(rename = "To")]
    pub to: f64,
    #[serde(rename = "By")]
    pub step: f64,
}

impl PowerRange {
    pub const fn new(from: f64, to: f64, step: f64) -> Self {
        Self { from, to, step }
    }

    /// `from <= to`, both inside `power`, and `step >= min_step`.
    pub fn is_valid(&self, power: &Bounds, min_step: f64) -> bool {
        self.from <= self.to
            && power.contains(self.from)
            && power.contains(self.to)
            && self.step >= min_step
    }
}

impl std::fmt::Display for PowerRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {} by {}", self.from, self.to, self.step)
    }
}

/// One validated IOL: its constants and candidate powers.
///
/// `powers` is `None` only when the IOL omitted `Powers`; an empty array is
/// rejected during validation.
#[derive(Debug, Clone, PartialEq)]
pub struct IolSpec {
    pub constants: LensConstants,
    pub powers: Option<Vec<PowerRange>>,
}
