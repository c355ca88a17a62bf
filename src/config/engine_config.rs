//! Engine Configuration - every limit and formula tuning value as TOML
//!
//! Each struct implements `Default` with the built-in registry values, so an
//! absent or empty config file yields the stock engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::types::{LensConstantSpec, PowerRange, Usage, VariableName, VariableSpec};
use crate::vergence::FormulaKind;

/// Env var naming the config file to load.
pub const CONFIG_ENV_VAR: &str = "IOL_ENGINE_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "engine_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one engine deployment.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$IOL_ENGINE_CONFIG` env var
/// 2. `./engine_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Formula selection and numeric conventions
    #[serde(default)]
    pub formula: FormulaConfig,

    /// Request-level and per-item bounds
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Lens-constant solver settings
    #[serde(default)]
    pub optimization: OptimizationConfig,

    /// Lens constants by wire name (`AConstant`)
    #[serde(default = "default_lens_constants")]
    pub lens_constants: BTreeMap<String, LensConstantSpec>,

    /// Biometric variables by wire name (`AL`, `K1`, ...).
    ///
    /// Declaring this table replaces the built-in set entirely.
    #[serde(default = "default_variables")]
    pub variables: BTreeMap<String, VariableSpec>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            formula: FormulaConfig::default(),
            limits: LimitsConfig::default(),
            optimization: OptimizationConfig::default(),
            lens_constants: default_lens_constants(),
            variables: default_variables(),
            server: ServerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$IOL_ENGINE_CONFIG` environment variable
    /// 2. `./engine_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), formula = %config.formula.kind, "Loaded engine config from {CONFIG_ENV_VAR}");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV_VAR}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV_VAR} points to non-existent file, falling back");
            }
        }

        // 2. Check ./engine_config.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(formula = %config.formula.kind, "Loaded engine config from ./{LOCAL_CONFIG_FILE}");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No {LOCAL_CONFIG_FILE} found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        // Two-pass: check for unknown keys first (warnings only)
        let typo_warnings = super::validation::validate_unknown_keys(&contents);
        for w in &typo_warnings {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Registry entry for a biometric variable, if the deployment declares it.
    pub fn variable(&self, name: VariableName) -> Option<&VariableSpec> {
        self.variables.get(name.as_str())
    }

    /// Declared variables in validation order.
    pub fn declared_variables(&self) -> impl Iterator<Item = (VariableName, &VariableSpec)> + '_ {
        VariableName::ALL
            .into_iter()
            .filter_map(|name| self.variable(name).map(|spec| (name, spec)))
    }

    /// Registry entry for the lens constant the solver adjusts.
    pub fn optimizable_constant(&self) -> Option<(&str, &LensConstantSpec)> {
        let name = self.optimization.optimizable_constant.as_str();
        self.lens_constants.get(name).map(|spec| (name, spec))
    }

    /// Validate the registry for internal consistency.
    ///
    /// Rules:
    /// - Every bound pair is finite with min <= max
    /// - The canonical keratometric index is > 1
    /// - The optimizable constant is declared
    /// - Every formula input is declared as a Required variable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        // Formula
        let f = &self.formula;
        Self::check_finite(f.canonical_k_index, "formula.canonical_k_index", &mut errors);
        Self::check_finite(
            f.default_vertex_distance,
            "formula.default_vertex_distance",
            &mut errors,
        );
        if !(f.canonical_k_index > 1.0) {
            errors.push(format!(
                "formula.canonical_k_index ({}) must be > 1",
                f.canonical_k_index
            ));
        }
        if f.round_answer_decimals > 15 {
            errors.push(format!(
                "formula.round_answer_decimals ({}) must be <= 15",
                f.round_answer_decimals
            ));
        }
        if !self.limits.vertex_distance.contains(f.default_vertex_distance) {
            errors.push(format!(
                "formula.default_vertex_distance ({}) must lie within limits.vertex_distance",
                f.default_vertex_distance
            ));
        }

        // Limits
        let l = &self.limits;
        Self::check_bounds(&l.k_index, "limits.k_index", &mut errors);
        Self::check_bounds(&l.vertex_distance, "limits.vertex_distance", &mut errors);
        Self::check_bounds(&l.iol_power, "limits.iol_power", &mut errors);
        Self::check_bounds(&l.target_refraction, "limits.target_refraction", &mut errors);
        Self::check_counts(&l.iols_per_eye, "limits.iols_per_eye", &mut errors);
        Self::check_counts(&l.preop_eyes, "limits.preop_eyes", &mut errors);
        Self::check_counts(&l.postop_eyes, "limits.postop_eyes", &mut errors);
        Self::check_counts(&l.predictions_per_iol, "limits.predictions_per_iol", &mut errors);
        if l.k_index.min < 1.0 {
            errors.push(format!("limits.k_index.min ({}) must be >= 1", l.k_index.min));
        }
        if l.max_power_ranges == 0 {
            errors.push("limits.max_power_ranges must be > 0".to_string());
        }
        Self::check_finite(l.min_power_step, "limits.min_power_step", &mut errors);
        if !(l.min_power_step > 0.0) {
            errors.push(format!(
                "limits.min_power_step ({}) must be > 0",
                l.min_power_step
            ));
        }
        if let Some(ref ranges) = l.default_powers {
            for (i, range) in ranges.iter().enumerate() {
                if !range.step.is_finite() || !range.is_valid(&l.iol_power, l.min_power_step) {
                    errors.push(format!(
                        "limits.default_powers[{i}] ({range}) must lie within limits.iol_power with By >= {}",
                        l.min_power_step
                    ));
                }
            }
        }

        // Lens constants
        for (name, spec) in &self.lens_constants {
            Self::check_bounds(
                &Bounds::new(spec.min, spec.max),
                &format!("lens_constants.{name}"),
                &mut errors,
            );
        }
        let lens_constant = self.formula.kind.lens_constant();
        if !self.lens_constants.contains_key(lens_constant) {
            errors.push(format!(
                "formula {} reads lens constant \"{lens_constant}\", which is not declared in [lens_constants]",
                self.formula.kind
            ));
        }

        // Optimization
        let o = &self.optimization;
        if self.optimizable_constant().is_none() {
            errors.push(format!(
                "optimization.optimizable_constant \"{}\" is not declared in [lens_constants]",
                o.optimizable_constant
            ));
        }
        if o.min_eyes == 0 {
            errors.push("optimization.min_eyes must be > 0".to_string());
        }
        if o.min_eyes > l.postop_eyes.max {
            errors.push(format!(
                "optimization.min_eyes ({}) must be <= limits.postop_eyes.max ({})",
                o.min_eyes, l.postop_eyes.max
            ));
        }
        if o.max_iterations == 0 {
            errors.push("optimization.max_iterations must be > 0".to_string());
        }

        // Variables
        for (key, spec) in &self.variables {
            if VariableName::from_key(key).is_none() {
                errors.push(format!("variables.{key} is not a known biometric variable"));
            }
            Self::check_bounds(
                &Bounds::new(spec.min, spec.max),
                &format!("variables.{key}"),
                &mut errors,
            );
        }
        for &name in self.formula.kind.required_variables() {
            match self.variable(name) {
                None => errors.push(format!(
                    "formula {} needs variable {name}, which is not declared in [variables]",
                    self.formula.kind
                )),
                Some(spec) if spec.usage != Usage::Required => errors.push(format!(
                    "variables.{name}.usage must be Required (formula {} cannot run without it)",
                    self.formula.kind
                )),
                Some(_) => {}
            }
        }

        // Server
        let api_path = &self.server.api_path;
        if !api_path.starts_with('/') || (api_path.len() > 1 && api_path.ends_with('/')) {
            errors.push(format!(
                "server.api_path \"{api_path}\" must start with '/' and not end with one"
            ));
        }
        if self.server.request_timeout_secs == 0 {
            errors.push("server.request_timeout_secs must be > 0".to_string());
        }

        // Physical range validation
        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_bounds(bounds: &Bounds, name: &str, errors: &mut Vec<String>) {
        // NaN/Inf comparisons silently pass, catch them explicitly
        if !bounds.min.is_finite() || !bounds.max.is_finite() {
            errors.push(format!(
                "{name}: values must be finite (got min={}, max={})",
                bounds.min, bounds.max
            ));
            return;
        }
        if bounds.max < bounds.min {
            errors.push(format!(
                "{name}: max ({}) must be >= min ({})",
                bounds.max, bounds.min
            ));
        }
    }

    fn check_finite(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() {
            errors.push(format!("{name} must be a finite number (got {value})"));
        }
    }

    fn check_counts(bounds: &CountBounds, name: &str, errors: &mut Vec<String>) {
        if bounds.min == 0 {
            errors.push(format!("{name}.min must be > 0"));
        }
        if bounds.max < bounds.min {
            errors.push(format!(
                "{name}: max ({}) must be >= min ({})",
                bounds.max, bounds.min
            ));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Bounds
// ============================================================================

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// NaN is never contained.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Inclusive count range for arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBounds {
    pub min: usize,
    pub max: usize,
}

impl CountBounds {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, count: usize) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

// ============================================================================
// Formula Config
// ============================================================================

/// Formula family and numeric conventions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaConfig {
    /// Vergence formula family: "shammas_cooke" or "t2"
    #[serde(default)]
    pub kind: FormulaKind,

    /// Keratometric index the formula expects Ks in
    #[serde(default = "default_canonical_k_index")]
    pub canonical_k_index: f64,

    /// Decimals kept on every predicted refraction
    #[serde(default = "default_round_answer_decimals")]
    pub round_answer_decimals: u32,

    /// Vertex distance (mm) used when a request omits `V`
    #[serde(default = "default_vertex_distance")]
    pub default_vertex_distance: f64,
}

fn default_canonical_k_index() -> f64 { defaults::CANONICAL_K_INDEX }
fn default_round_answer_decimals() -> u32 { defaults::ROUND_ANSWER_DECIMALS }
fn default_vertex_distance() -> f64 { defaults::DEFAULT_VERTEX_DISTANCE_MM }

impl Default for FormulaConfig {
    fn default() -> Self {
        Self {
            kind: FormulaKind::default(),
            canonical_k_index: default_canonical_k_index(),
            round_answer_decimals: default_round_answer_decimals(),
            default_vertex_distance: default_vertex_distance(),
        }
    }
}

// ============================================================================
// Limits Config
// ============================================================================

/// Bounds applied by the request validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Keratometric index the caller may declare (`KIndex`)
    #[serde(default = "default_k_index")]
    pub k_index: Bounds,

    /// Corneal-to-spectacle vertex distance (`V`, mm)
    #[serde(default = "default_vertex_distance_bounds")]
    pub vertex_distance: Bounds,

    /// IOL power (D), for `IolPower` and every `Powers` range bound
    #[serde(default = "default_iol_power")]
    pub iol_power: Bounds,

    /// Target refraction (`TgtRx`, D)
    #[serde(default = "default_target_refraction")]
    pub target_refraction: Bounds,

    /// IOLs per eye, and for the request-level `IOLs` list
    #[serde(default = "default_iols_per_eye")]
    pub iols_per_eye: CountBounds,

    #[serde(default = "default_preop_eyes")]
    pub preop_eyes: CountBounds,

    #[serde(default = "default_postop_eyes")]
    pub postop_eyes: CountBounds,

    #[serde(default = "default_predictions_per_iol")]
    pub predictions_per_iol: CountBounds,

    /// Maximum `Powers` ranges per IOL
    #[serde(default = "default_max_power_ranges")]
    pub max_power_ranges: usize,

    /// Smallest accepted `By` step
    #[serde(default = "default_min_power_step")]
    pub min_power_step: f64,

    /// Candidate powers for IOLs that omit `Powers`.
    ///
    /// When unset, derived from `iol_power`: whole steps below 0 and above
    /// 33.5, half steps in between.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_powers: Option<Vec<PowerRange>>,
}

fn default_k_index() -> Bounds { Bounds::new(1.0, 2.0) }
fn default_vertex_distance_bounds() -> Bounds { Bounds::new(10.0, 16.0) }
fn default_iol_power() -> Bounds { Bounds::new(-20.0, 80.0) }
fn default_target_refraction() -> Bounds { Bounds::new(-15.0, 30.0) }
fn default_iols_per_eye() -> CountBounds { CountBounds::new(1, 100) }
fn default_preop_eyes() -> CountBounds { CountBounds::new(1, 100) }
fn default_postop_eyes() -> CountBounds { CountBounds::new(1, 10_000) }
fn default_predictions_per_iol() -> CountBounds { CountBounds::new(1, 21) }
fn default_max_power_ranges() -> usize { defaults::MAX_POWER_RANGES }
fn default_min_power_step() -> f64 { defaults::MIN_POWER_STEP }

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            k_index: default_k_index(),
            vertex_distance: default_vertex_distance_bounds(),
            iol_power: default_iol_power(),
            target_refraction: default_target_refraction(),
            iols_per_eye: default_iols_per_eye(),
            preop_eyes: default_preop_eyes(),
            postop_eyes: default_postop_eyes(),
            predictions_per_iol: default_predictions_per_iol(),
            max_power_ranges: default_max_power_ranges(),
            min_power_step: default_min_power_step(),
            default_powers: None,
        }
    }
}

impl LimitsConfig {
    /// PowerSet used when an IOL declares no usable ranges.
    pub fn default_power_set(&self) -> Vec<PowerRange> {
        if let Some(ref ranges) = self.default_powers {
            return ranges.clone();
        }
        vec![
            PowerRange::new(self.iol_power.min, 0.0, 1.0),
            PowerRange::new(0.5, 33.5, 0.5),
            PowerRange::new(34.0, self.iol_power.max, 1.0),
        ]
    }
}

// ============================================================================
// Optimization Config
// ============================================================================

/// Lens-constant solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Wire name of the lens constant the solver adjusts
    #[serde(default = "default_optimizable_constant")]
    pub optimizable_constant: String,

    /// Valid eyes required before optimizing
    #[serde(default = "default_min_eyes")]
    pub min_eyes: usize,

    /// Below this many valid eyes the result is logged as weak
    #[serde(default = "default_ideal_min_eyes")]
    pub ideal_min_eyes: usize,

    /// Iteration cap; the initial evaluation counts as the first
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_optimizable_constant() -> String { "AConstant".to_string() }
fn default_min_eyes() -> usize { defaults::MIN_EYES_FOR_OPTIMIZATION }
fn default_ideal_min_eyes() -> usize { defaults::IDEAL_MIN_EYES_FOR_OPTIMIZATION }
fn default_max_iterations() -> u32 { defaults::MAX_OPTIMIZATION_ITERATIONS }

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            optimizable_constant: default_optimizable_constant(),
            min_eyes: default_min_eyes(),
            ideal_min_eyes: default_ideal_min_eyes(),
            max_iterations: default_max_iterations(),
        }
    }
}

// ============================================================================
// Registry Tables
// ============================================================================

fn default_lens_constants() -> BTreeMap<String, LensConstantSpec> {
    BTreeMap::from([(
        "AConstant".to_string(),
        LensConstantSpec::new(101.0, 129.0, Some(5)),
    )])
}

fn default_variables() -> BTreeMap<String, VariableSpec> {
    BTreeMap::from([
        (
            VariableName::AxialLength.as_str().to_string(),
            VariableSpec::new(13.0, 40.0, Usage::Required, "Axial Length"),
        ),
        (
            VariableName::K1.as_str().to_string(),
            VariableSpec::new(32.0, 57.0, Usage::Required, "K1"),
        ),
        (
            VariableName::K2.as_str().to_string(),
            VariableSpec::new(32.0, 57.0, Usage::Required, "K2"),
        ),
    ])
}

// ============================================================================
// Server Config
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server bind address.
    ///
    /// Can be overridden by the `--addr` CLI flag.
    #[serde(default = "default_server_addr")]
    pub addr: String,

    /// Prefix for the calculation routes, without trailing slash
    #[serde(default = "default_api_path")]
    pub api_path: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}
fn default_api_path() -> String {
    defaults::API_PATH.to_string()
}
fn default_request_timeout_secs() -> u64 { defaults::REQUEST_TIMEOUT_SECS }
fn default_max_body_bytes() -> usize { defaults::MAX_BODY_BYTES }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
            api_path: default_api_path(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
