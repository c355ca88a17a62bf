//! Engine error tiers
//!
//! - [`RequestError`]: the whole request is rejected with one message
//! - [`EyeError`]: one eye fails, its siblings are still calculated
//! - [`IolError`]: one IOL of an otherwise valid eye fails
//!
//! Display strings are the exact messages returned to API callers.

use crate::vergence::{FormulaError, NormalizeError};

/// Message for any numeric failure inside a formula.
pub const CALCULATION_FAILED: &str = "An unknown error occurred while calculating.";

/// Whole-request rejection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    #[error("Request is not valid JSON")]
    NotJson,

    #[error("Request is not an object")]
    NotAnObject,

    #[error("Root property \"{0}\" is not a valid property.")]
    UnknownProperty(String),

    #[error("Root property \"KIndex\" must be a number between {min} and {max}.")]
    KIndex { min: f64, max: f64 },

    #[error("Root property \"V\" must be a number between {min} and {max}.")]
    VertexDistance { min: f64, max: f64 },

    #[error("Root property \"PredictionsPerIol\" is a required integer between {min} and {max}")]
    PredictionsPerIol { min: usize, max: usize },

    #[error("Root property \"IOLs\" (if specified) must contain between {min} and {max}.")]
    Iols { min: usize, max: usize },

    #[error("Root property \"Optimize\" must be a boolean.")]
    Optimize,

    #[error("Root property \"{name}\" is required and must be between {min} and {max}")]
    LensConstant { name: String, min: f64, max: f64 },

    #[error("Root property \"Eyes\" must be an array containing between {min} and {max} eyes.")]
    Eyes { min: usize, max: usize },

    #[error("Ref is required for every eye because Optimize is true.")]
    MissingReference,

    #[error("When optimizing lens constants, you must provide between {min} and {max} eyes with valid data.")]
    OptimizationEyeCount { min: usize, max: usize },
}

/// Per-eye failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EyeError {
    #[error("Each eye must be an object.")]
    NotAnObject,

    #[error("Invalid property: \"{0}\"")]
    InvalidProperty(String),

    #[error(transparent)]
    Variable(#[from] NormalizeError),

    #[error("TgtRx must be a valid number between {min} and {max:+}.")]
    TargetRefraction { min: f64, max: f64 },

    #[error("This eye does not have a valid amount of IOLs. You can specify default IOLs in the root \"IOLs\" property, and you can override it within individual eyes. You must specify between {min} and {max} IOLs.")]
    IolCount { min: usize, max: usize },

    #[error("IolPower must be a number between {min} and {max}")]
    ImplantedPower { min: f64, max: f64 },

    #[error("An unknown error occurred while calculating.")]
    Calculation(FormulaError),
}

/// Per-IOL failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IolError {
    #[error("Each IOL must be an object.")]
    NotAnObject,

    #[error("Invalid property: \"{0}\"")]
    InvalidProperty(String),

    #[error("{name} must be between {min} and {max}")]
    ConstantOutOfRange { name: String, min: f64, max: f64 },

    #[error("If you specify Powers, you must specify an array with at least one range")]
    PowersShape,

    #[error("At least one power range is invalid: they must specify valid numbers for \"From,\" \"To,\" and \"By.\" \"From\" cannot be greater than \"To,\" \"From\" and \"To\" must be between {min} and {max}, and \"By\" must be at least {min_step}.")]
    PowerRange { min: f64, max: f64, min_step: f64 },

    #[error("An unknown error occurred while calculating.")]
    Calculation,
}

impl From<FormulaError> for EyeError {
    fn from(e: FormulaError) -> Self {
        Self::Calculation(e)
    }
}
