//! Shared data structures for IOL power prediction
//!
//! - Eye biometry: `VariableName`, `VariableSpec`, `EyeVariables`
//! - Lenses: `LensConstantSpec`, `LensConstants`, `PowerRange`, `IolSpec`
//! - Responses: `PredictionRecord`, `PreopEyeResult`, `PostopResponse`

mod eye;
mod iol;
mod response;

pub use eye::*;
pub use iol::*;
pub use response::*;

/// A JSON object as received on the wire.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;
