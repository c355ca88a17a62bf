//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use crate::types::VariableName;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for EngineConfig.
///
/// `*` stands for one user-chosen table name (a lens constant or variable).
/// Any new field added to EngineConfig must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [formula]
        "formula",
        "formula.kind",
        "formula.canonical_k_index",
        "formula.round_answer_decimals",
        "formula.default_vertex_distance",
        // [limits]
        "limits",
        "limits.k_index",
        "limits.k_index.min",
        "limits.k_index.max",
        "limits.vertex_distance",
        "limits.vertex_distance.min",
        "limits.vertex_distance.max",
        "limits.iol_power",
        "limits.iol_power.min",
        "limits.iol_power.max",
        "limits.target_refraction",
        "limits.target_refraction.min",
        "limits.target_refraction.max",
        "limits.iols_per_eye",
        "limits.iols_per_eye.min",
        "limits.iols_per_eye.max",
        "limits.preop_eyes",
        "limits.preop_eyes.min",
        "limits.preop_eyes.max",
        "limits.postop_eyes",
        "limits.postop_eyes.min",
        "limits.postop_eyes.max",
        "limits.predictions_per_iol",
        "limits.predictions_per_iol.min",
        "limits.predictions_per_iol.max",
        "limits.max_power_ranges",
        "limits.min_power_step",
        "limits.default_powers",
        // [optimization]
        "optimization",
        "optimization.optimizable_constant",
        "optimization.min_eyes",
        "optimization.ideal_min_eyes",
        "optimization.max_iterations",
        // [lens_constants.<name>]
        "lens_constants",
        "lens_constants.*",
        "lens_constants.*.min",
        "lens_constants.*.max",
        "lens_constants.*.rounding_decimals",
        // [variables.<name>]
        "variables",
        "variables.*",
        "variables.*.min",
        "variables.*.max",
        "variables.*.usage",
        "variables.*.display_name",
        // [server]
        "server",
        "server.addr",
        "server.api_path",
        "server.request_timeout_secs",
        "server.max_body_bytes",
    ];
    keys.iter().copied().collect()
}

/// Replace the user-chosen segment under a map-valued table with `*`.
///
/// `lens_constants.AConstant.min` → `lens_constants.*.min`
fn wildcard_key(key: &str) -> String {
    let mut parts: Vec<&str> = key.split('.').collect();
    if parts.len() >= 2 && matches!(parts[0], "lens_constants" | "variables") {
        parts[1] = "*";
    }
    parts.join(".")
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1)
                .min(curr[j] + 1)
                .min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist <= 3 && best.map_or(true, |(best_key, best_dist)| {
            dist < best_dist || (dist == best_dist && k < best_key)
        }) {
            best = Some((k, dist));
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys, it only warns. Existing configs
/// always continue to work.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    let found = walk_toml_keys(&value, "");
    let mut warnings = Vec::new();

    for key in &found {
        let pattern = wildcard_key(key);
        if !known.contains(pattern.as_str()) {
            let suggestion = suggest_correction(&pattern, &known);
            let message = format!("Unknown config key '{key}'");
            warnings.push(ValidationWarning {
                field: key.clone(),
                message,
                suggestion,
            });
        }
    }

    warnings
}

// ============================================================================
// Physical Range Validation
// ============================================================================

/// Validate physical ranges on a parsed EngineConfig.
///
/// Returns (errors, warnings): errors are impossible values that must
/// prevent startup; warnings are suspicious but not fatal.
pub fn validate_physical_ranges(
    config: &super::EngineConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // Axial length: 10-45 mm covers nanophthalmos through extreme myopia
    if let Some(al) = config.variable(VariableName::AxialLength) {
        if al.min <= 0.0 {
            errors.push(format!(
                "variables.AL.min = {} must be > 0 (axial length is a distance)",
                al.min
            ));
        }
        if al.min < 10.0 || al.max > 45.0 {
            warnings.push(ValidationWarning {
                field: "variables.AL".to_string(),
                message: format!(
                    "variables.AL = {}-{} is outside typical range (10-45 mm)",
                    al.min, al.max
                ),
                suggestion: None,
            });
        }
    }

    // Keratometry: a cornea flatter than 20 D or steeper than 70 D is implausible
    for name in [VariableName::K1, VariableName::K2] {
        if let Some(k) = config.variable(name) {
            if k.min <= 0.0 {
                errors.push(format!("variables.{name}.min = {} must be > 0", k.min));
            }
            if k.min < 20.0 || k.max > 70.0 {
                warnings.push(ValidationWarning {
                    field: format!("variables.{name}"),
                    message: format!(
                        "variables.{name} = {}-{} is outside typical range (20-70 D)",
                        k.min, k.max
                    ),
                    suggestion: None,
                });
            }
        }
    }

    // Vertex distance: spectacles sit a few millimetres off the cornea
    let v = &config.limits.vertex_distance;
    if v.min < 0.0 {
        errors.push(format!(
            "limits.vertex_distance.min = {} cannot be negative",
            v.min
        ));
    }
    if v.max > 25.0 {
        warnings.push(ValidationWarning {
            field: "limits.vertex_distance.max".to_string(),
            message: format!(
                "limits.vertex_distance.max = {} is outside typical range (up to 25 mm)",
                v.max
            ),
            suggestion: None,
        });
    }

    // Optimizing on fewer eyes than the minimum defeats the ideal threshold
    let o = &config.optimization;
    if o.ideal_min_eyes < o.min_eyes {
        warnings.push(ValidationWarning {
            field: "optimization.ideal_min_eyes".to_string(),
            message: format!(
                "optimization.ideal_min_eyes = {} is below min_eyes = {}",
                o.ideal_min_eyes, o.min_eyes
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("formula", "formula"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("limits", "limit"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let value: toml::Value = toml::from_str(
            r#"
[limits.iol_power]
min = -10.0
"#,
        )
        .unwrap();
        let keys = walk_toml_keys(&value, "");
        assert!(keys.contains(&"limits".to_string()));
        assert!(keys.contains(&"limits.iol_power".to_string()));
        assert!(keys.contains(&"limits.iol_power.min".to_string()));
    }

    #[test]
    fn test_wildcard_key_only_rewrites_map_tables() {
        assert_eq!(wildcard_key("lens_constants.AConstant.min"), "lens_constants.*.min");
        assert_eq!(wildcard_key("variables.ACD"), "variables.*");
        assert_eq!(wildcard_key("limits.iol_power.min"), "limits.iol_power.min");
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[optimization]
min_eye = 60
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].field.contains("min_eye"));
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("optimization.min_eyes")
        );
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[formula]
kind = "t2"

[lens_constants.AConstant]
min = 101.0
max = 129.0
rounding_decimals = 5

[variables.ACD]
min = 1.1
max = 5.9
usage = "Recommended"
display_name = "Anterior Chamber Depth"

[server]
api_path = "/api/v1/t2"
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(
            warnings.is_empty(),
            "Expected 0 warnings, got: {:?}",
            warnings
        );
    }

    #[test]
    fn test_typo_inside_map_table_is_caught() {
        let toml_str = r#"
[lens_constants.AConstant]
min = 101.0
max = 129.0
rounding_decimal = 5
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("lens_constants.*.rounding_decimals")
        );
    }

    #[test]
    fn test_unknown_section_produces_warning() {
        let toml_str = r#"
[telemetry]
enabled = true
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.iter().any(|w| w.field == "telemetry"));
    }

    #[test]
    fn test_physical_range_defaults_clean() {
        let (errors, warnings) = validate_physical_ranges(&EngineConfig::default());
        assert!(errors.is_empty(), "Defaults produced errors: {errors:?}");
        assert!(warnings.is_empty(), "Defaults produced warnings: {warnings:?}");
    }

    #[test]
    fn test_physical_range_axial_length_non_positive() {
        let mut config = EngineConfig::default();
        if let Some(al) = config.variables.get_mut("AL") {
            al.min = 0.0;
        }
        let (errors, warnings) = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("variables.AL.min")));
        assert!(warnings.iter().any(|w| w.field == "variables.AL"));
    }

    #[test]
    fn test_physical_range_wide_keratometry_warns() {
        let mut config = EngineConfig::default();
        if let Some(k1) = config.variables.get_mut("K1") {
            k1.max = 80.0;
        }
        let (errors, warnings) = validate_physical_ranges(&config);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.field == "variables.K1"));
    }

    #[test]
    fn test_physical_range_negative_vertex_distance() {
        let mut config = EngineConfig::default();
        config.limits.vertex_distance.min = -1.0;
        let (errors, _) = validate_physical_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("vertex_distance")));
    }
}
