//! Evaluation-mode configuration (`evaluation` block of the experiment YAML).

use serde::{Deserialize, Serialize};

/// The evaluation mode selects how `PolicyEvaluator::generate_samples`
/// constructs its sample set (SPEC_FULL.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluationMode {
    /// Draw `num_samples` independent realizations per iteration.
    Bootstrap,
    /// A single deterministic realization per iteration, no temporal carry-over.
    DeterministicPairwise,
    /// A single deterministic realization per iteration, with the agent's
    /// prior accepted costs threaded through as `mode_metadata`.
    DeterministicTemporal,
}

impl EvaluationMode {
    /// Whether this mode requires `num_samples` to be set.
    pub fn requires_num_samples(self) -> bool {
        matches!(self, EvaluationMode::Bootstrap)
    }
}

/// The `evaluation` block of the experiment YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Which evaluation mode to run.
    pub mode: EvaluationMode,
    /// Number of bootstrap samples per iteration. Required (and must be
    /// `>= 1`) when `mode == Bootstrap`; ignored otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_samples: Option<usize>,
    /// Number of simulated ticks per sample.
    pub ticks: u32,
}

impl EvaluationConfig {
    /// Validate range/presence invariants that `validator`'s derive cannot
    /// express because they cross two fields (`mode` gates `num_samples`).
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.ticks == 0 {
            return Err(crate::error::Error::config_field(
                "evaluation.ticks must be >= 1",
                "evaluation.ticks",
            ));
        }

        if self.mode.requires_num_samples() {
            match self.num_samples {
                Some(n) if n >= 1 => {}
                _ => {
                    return Err(crate::error::Error::config_field(
                        "evaluation.num_samples must be >= 1 in bootstrap mode",
                        "evaluation.num_samples",
                    ))
                }
            }
        }

        Ok(())
    }

    /// Number of samples this configuration produces per iteration.
    pub fn effective_num_samples(&self) -> usize {
        match self.mode {
            EvaluationMode::Bootstrap => self.num_samples.unwrap_or(1),
            EvaluationMode::DeterministicPairwise | EvaluationMode::DeterministicTemporal => 1,
        }
    }
}
