//! System-wide default constants.
//!
//! Centralises the numbers that seed the built-in registry and the HTTP layer.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Formula
// ============================================================================

/// Keratometric index every formula expects its Ks to be expressed in.
///
/// Ks are treated as `337.5 / r` (r = anterior corneal radius in mm).
pub const CANONICAL_K_INDEX: f64 = 1.3375;

/// Decimal places kept on every user-facing refraction.
pub const ROUND_ANSWER_DECIMALS: u32 = 4;

/// Corneal-to-spectacle vertex distance used when a request omits `V` (mm).
pub const DEFAULT_VERTEX_DISTANCE_MM: f64 = 12.0;

/// Precision used to snap enumerated powers onto their grid.
///
/// Removes `0.1 + 0.2` style drift before powers are deduplicated.
pub const POWER_GRID_DECIMALS: u32 = 6;

/// Rounding precision assumed for a lens constant that declares none.
pub const FALLBACK_CONSTANT_DECIMALS: u32 = 10;

// ============================================================================
// Optimization
// ============================================================================

/// Eyes required before a lens constant is optimized.
pub const MIN_EYES_FOR_OPTIMIZATION: usize = 50;

/// Eyes below which an optimized constant is considered statistically weak.
pub const IDEAL_MIN_EYES_FOR_OPTIMIZATION: usize = 100;

/// Hard cap on optimization iterations. The first evaluation counts as one.
pub const MAX_OPTIMIZATION_ITERATIONS: u32 = 20;

/// Gatinel coefficient for the refraction-vs-ELP sensitivity weight.
///
/// `sensitivity = GATINEL_COEFFICIENT × (P² + (K1 + K2) × P)`
pub const GATINEL_COEFFICIENT: f64 = 0.0006;

// ============================================================================
// Request Limits
// ============================================================================

/// Maximum number of `Powers` ranges per IOL.
pub const MAX_POWER_RANGES: usize = 99;

/// Smallest accepted `By` step in a power range (D).
pub const MIN_POWER_STEP: f64 = 0.1;

// ============================================================================
// HTTP Server
// ============================================================================

/// Default bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// Path prefix for the calculation endpoints (no trailing slash).
pub const API_PATH: &str = "/api/v1";

/// Per-request timeout enforced by the HTTP layer (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Largest accepted request body (bytes). 10 000 postop eyes fit well below this.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
