//! iol-vergence: IOL power prediction and lens-constant optimization
//!
//! Predicts postoperative refraction from biometry and an intraocular lens
//! with a thick-lens vergence formula, and back-solves lens constants from
//! observed outcomes.
//!
//! ## Architecture
//!
//! - **Config**: TOML settings and limits registry, resolved once in `main`
//! - **Vergence**: K-index normalization and the `VergenceFormula` strategies
//! - **Engine**: request validation, power search and the constant solver
//! - **API**: axum HTTP surface over the engine

pub mod api;
pub mod config;
pub mod engine;
pub mod types;
pub mod vergence;

// Re-export configuration
pub use config::EngineConfig;

// Re-export commonly used types
pub use types::{
    EyeVariables, IolResult, LensConstants, PostopPrediction, PostopResponse, PowerRange,
    PredictionRecord, PreopEyeResult, VariableName,
};

// Re-export formulas
pub use vergence::{FormulaKind, ShammasCooke, VergenceFormula, T2};

// Re-export engine entry points
pub use engine::{postop, preop, EyeError, IolError, RequestError};
