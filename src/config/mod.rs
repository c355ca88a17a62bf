//! Engine Configuration Module
//!
//! The settings and limits registry: numeric bounds for every biometric
//! variable, lens constant and array size, plus formula tuning values. Loaded
//! from TOML, falling back to built-in defaults.
//!
//! ## Loading Order
//!
//! 1. `IOL_ENGINE_CONFIG` environment variable (path to TOML file)
//! 2. `engine_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! A CLI `--config <path>` replaces the search entirely; a file given that
//! way must load and validate.
//!
//! The resolved [`EngineConfig`] is passed explicitly: the HTTP server keeps
//! it in `ApiState`, offline calculations borrow it.

mod engine_config;
pub mod defaults;
pub mod validation;

pub use engine_config::*;

use std::path::Path;

/// Resolve the registry for this process.
pub fn resolve(explicit: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    match explicit {
        Some(path) => {
            let config = EngineConfig::load_from_file(path)?;
            tracing::info!(path = %path.display(), formula = %config.formula.kind, "Loaded engine config");
            Ok(config)
        }
        None => Ok(EngineConfig::load()),
    }
}
