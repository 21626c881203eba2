use serde::{Deserialize, Serialize};

/// Depth at which the standardized index is predicted.
pub const DEFAULT_REFERENCE_DEPTH: f64 = 80.0;

pub fn default_reference_depth() -> f64 {
    DEFAULT_REFERENCE_DEPTH
}

pub fn default_parallel_years() -> bool {
    true
}

/// Covariate levels held fixed when predicting the yearly index `cpue_t`.
///
/// Every categorical effect is taken at its reference code and depth at a
/// fixed value, so `cpue_t` varies only through the intercept and year effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLevels {
    #[serde(default)]
    pub geartype: usize,
    #[serde(default)]
    pub month: usize,
    #[serde(default)]
    pub hooksize: usize,
    #[serde(default)]
    pub statarea: usize,
    #[serde(default = "default_reference_depth")]
    pub depth: f64,
}

impl Default for ReferenceLevels {
    fn default() -> Self {
        Self {
            geartype: 0,
            month: 0,
            hooksize: 0,
            statarea: 0,
            depth: DEFAULT_REFERENCE_DEPTH,
        }
    }
}

/// Evaluation options for the joint objective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub reference: ReferenceLevels,
    /// Evaluate per-year field densities on the rayon pool. Partial results
    /// are always summed in year order.
    #[serde(default = "default_parallel_years")]
    pub parallel_years: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            reference: ReferenceLevels::default(),
            parallel_years: default_parallel_years(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: ModelConfig =
            serde_json::from_str(r#"{ "reference": { "month": 2 } }"#).expect("valid json");
        assert_eq!(cfg.reference.month, 2);
        assert_eq!(cfg.reference.geartype, 0);
        assert_eq!(cfg.reference.depth, DEFAULT_REFERENCE_DEPTH);
        assert!(cfg.parallel_years);
    }

    #[test]
    fn empty_config_is_default() {
        let cfg: ModelConfig = serde_json::from_str("{}").expect("valid json");
        assert_eq!(cfg, ModelConfig::default());
    }
}
