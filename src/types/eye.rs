//! Per-eye biometry types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::JsonObject;

/// Biometric variables an eye may carry.
///
/// Declaration order is validation order: the first failing variable in this
/// order is the one reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VariableName {
    /// Axial length (mm)
    #[serde(rename = "AL")]
    AxialLength,
    /// Flat keratometry meridian (D)
    K1,
    /// Steep keratometry meridian (D)
    K2,
    /// Anterior chamber depth (mm)
    #[serde(rename = "ACD")]
    AnteriorChamberDepth,
    /// Central corneal thickness (µm)
    #[serde(rename = "CCT")]
    CentralCornealThickness,
    /// Crystalline lens thickness (mm)
    #[serde(rename = "LT")]
    LensThickness,
    /// Horizontal white-to-white (mm)
    #[serde(rename = "WTW")]
    WhiteToWhite,
    /// Corneal diameter (mm)
    #[serde(rename = "CD")]
    CornealDiameter,
}

impl VariableName {
    pub const ALL: [Self; 8] = [
        Self::AxialLength,
        Self::K1,
        Self::K2,
        Self::AnteriorChamberDepth,
        Self::CentralCornealThickness,
        Self::LensThickness,
        Self::WhiteToWhite,
        Self::CornealDiameter,
    ];

    /// Wire name of the variable (`"AL"`, `"K1"`, ...).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AxialLength => "AL",
            Self::K1 => "K1",
            Self::K2 => "K2",
            Self::AnteriorChamberDepth => "ACD",
            Self::CentralCornealThickness => "CCT",
            Self::LensThickness => "LT",
            Self::WhiteToWhite => "WTW",
            Self::CornealDiameter => "CD",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == key)
    }
}

impl std::fmt::Display for VariableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How strictly a variable must be supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Usage {
    Required,
    Recommended,
    Optional,
}

/// Registry entry for one biometric variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub min: f64,
    pub max: f64,
    pub usage: Usage,
    /// Human-readable label for documentation output
    #[serde(default)]
    pub display_name: String,
}

impl VariableSpec {
    pub fn new(min: f64, max: f64, usage: Usage, display_name: &str) -> Self {
        Self {
            min,
            max,
            usage,
            display_name: display_name.to_string(),
        }
    }

    /// Inclusive range check. NaN is never in range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Mapping from variable name to value for one eye.
///
/// Values taken from the wire that are present but not numbers are stored as
/// NaN so range validation rejects them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EyeVariables {
    values: BTreeMap<VariableName, f64>,
}

impl EyeVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for tests and fixtures.
    #[must_use]
    pub fn with(mut self, name: VariableName, value: f64) -> Self {
        self.values.insert(name, value);
        self
    }

    /// Collect every known variable key present in a JSON eye object.
    pub fn from_json(eye: &JsonObject) -> Self {
        let values = eye
            .iter()
            .filter_map(|(key, value)| {
                VariableName::from_key(key).map(|name| (name, value.as_f64().unwrap_or(f64::NAN)))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, name: VariableName) -> Option<f64> {
        self.values.get(&name).copied()
    }

    pub fn set(&mut self, name: VariableName, value: f64) {
        self.values.insert(name, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (VariableName, f64)> + '_ {
        self.values.iter().map(|(name, value)| (*name, *value))
    }

    /// Sum of both keratometry meridians, when both are present.
    pub fn k_sum(&self) -> Option<f64> {
        Some(self.get(VariableName::K1)? + self.get(VariableName::K2)?)
    }
}

/// A validated preoperative eye.
#[derive(Debug, Clone, PartialEq)]
pub struct PreopEye {
    pub variables: EyeVariables,
    pub target_refraction: f64,
}

/// A validated postoperative eye.
#[derive(Debug, Clone, PartialEq)]
pub struct PostopEye {
    pub variables: EyeVariables,
    pub implanted_power: f64,
    /// Measured postoperative refraction (`Ref`); required when optimizing.
    pub observed_refraction: Option<f64>,
}
