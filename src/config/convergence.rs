//! Convergence-detection configuration (`convergence` block of the experiment YAML).

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Epsilon, in cents, below which `improvement_threshold` is interpreted as
/// an absolute amount rather than a fraction (SPEC_FULL.md §4.7.1, resolving
/// the source's ambiguous absolute/relative switch near zero).
pub const IMPROVEMENT_EPSILON_CENTS: i64 = 100;

/// The `convergence` block of the experiment YAML.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConvergenceConfig {
    /// Hard iteration cap. Convergence reason "max-iterations" fires at
    /// `i >= max_iterations`.
    #[validate(range(min = 1))]
    pub max_iterations: usize,
    /// Relative-range threshold for the "stability" criterion.
    #[validate(range(min = 0.0, max = 1.0))]
    pub stability_threshold: f64,
    /// Number of most-recent iterations considered by the stability and
    /// no-improvement criteria.
    #[validate(range(min = 1))]
    pub stability_window: usize,
    /// Minimum improvement (absolute cents or relative fraction, switched
    /// by `IMPROVEMENT_EPSILON_CENTS`) below which "no-improvement" fires.
    #[validate(range(min = 0.0))]
    pub improvement_threshold: f64,
}

impl ConvergenceConfig {
    /// Validate this block's invariants.
    pub fn validate_config(&self) -> crate::error::Result<()> {
        self.validate()
            .map_err(|e| crate::error::Error::config_field(e.to_string(), "convergence"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_config() {
        let cfg = ConvergenceConfig {
            max_iterations: 10,
            stability_threshold: 0.02,
            stability_window: 5,
            improvement_threshold: 0.01,
        };
        assert!(cfg.validate_config().is_ok());
    }

    #[test]
    fn rejects_zero_max_iterations() {
        let cfg = ConvergenceConfig {
            max_iterations: 0,
            stability_threshold: 0.02,
            stability_window: 5,
            improvement_threshold: 0.01,
        };
        assert!(cfg.validate_config().is_err());
    }

    #[test]
    fn rejects_out_of_range_stability_threshold() {
        let cfg = ConvergenceConfig {
            max_iterations: 10,
            stability_threshold: 1.5,
            stability_window: 5,
            improvement_threshold: 0.01,
        };
        assert!(cfg.validate_config().is_err());
    }
}
