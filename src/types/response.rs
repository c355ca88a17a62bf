//! Response payload types
//!
//! Field names follow the wire format (`IOL`, `Rx`, `IsBestOption`, ...).
//! Every number goes through [`JsNumber`] so whole values print as `25`
//! rather than `25.0`.

use serde::{Serialize, Serializer};

use super::LensConstants;

/// Largest integer an f64 holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// f64 that serializes whole values as JSON integers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JsNumber(pub f64);

impl Serialize for JsNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        js_number(&self.0, serializer)
    }
}

/// `serialize_with` helper behind [`JsNumber`]. `-0` prints as `0`.
#[allow(clippy::cast_possible_truncation, clippy::trivially_copy_pass_by_ref)]
pub fn js_number<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    let v = *value;
    if v.is_finite() && v.fract() == 0.0 && v.abs() <= MAX_SAFE_INTEGER {
        serializer.serialize_i64(v as i64)
    } else {
        serializer.serialize_f64(v)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

// ============================================================================
// Preoperative
// ============================================================================

/// One candidate power and its predicted refraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionRecord {
    #[serde(rename = "IOL", serialize_with = "js_number")]
    pub power: f64,
    #[serde(rename = "Rx", serialize_with = "js_number")]
    pub predicted_refraction: f64,
    #[serde(rename = "IsBestOption", skip_serializing_if = "is_false")]
    pub is_best_option: bool,
}

/// Outcome for one IOL of one eye.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IolResult {
    Error {
        #[serde(rename = "Error")]
        error: String,
    },
    Predictions {
        #[serde(rename = "Predictions")]
        predictions: Vec<PredictionRecord>,
    },
}

impl IolResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn predictions(&self) -> Option<&[PredictionRecord]> {
        match self {
            Self::Predictions { predictions } => Some(predictions),
            Self::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(error),
            Self::Predictions { .. } => None,
        }
    }
}

/// Outcome for one preoperative eye.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PreopEyeResult {
    Error {
        #[serde(rename = "Error")]
        error: String,
    },
    Iols {
        #[serde(rename = "IOLs")]
        iols: Vec<IolResult>,
    },
}

impl PreopEyeResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn iols(&self) -> Option<&[IolResult]> {
        match self {
            Self::Iols { iols } => Some(iols),
            Self::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(error),
            Self::Iols { .. } => None,
        }
    }
}

// ============================================================================
// Postoperative
// ============================================================================

/// Predicted refraction for one postoperative eye, or why there is none.
#[derive(Debug, Clone, PartialEq)]
pub enum PostopPrediction {
    Refraction(f64),
    Error(String),
}

impl PostopPrediction {
    pub const fn refraction(&self) -> Option<f64> {
        match self {
            Self::Refraction(rx) => Some(*rx),
            Self::Error(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            Self::Refraction(_) => None,
        }
    }
}

impl Serialize for PostopPrediction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Refraction(rx) => js_number(rx, serializer),
            Self::Error(message) => serializer.serialize_str(message),
        }
    }
}

/// Postoperative response: the (possibly optimized) constants, then one
/// prediction per eye in request order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostopResponse {
    #[serde(flatten)]
    pub constants: LensConstants,
    #[serde(rename = "Predictions")]
    pub predictions: Vec<PostopPrediction>,
}
