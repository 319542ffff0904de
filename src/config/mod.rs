//! Experiment configuration: loading, validating, and hashing the YAML
//! document that drives one run of the optimization loop (§3).

pub mod convergence;
pub mod evaluation;
pub mod llm;
pub mod output;

pub use convergence::ConvergenceConfig;
pub use evaluation::{EvaluationConfig, EvaluationMode};
pub use llm::LlmConfig;
pub use output::OutputConfig;

use crate::constraints::{ConstraintsSource, ScenarioConstraints};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The on-disk shape of an experiment YAML document, before the two
/// mutually-exclusive constraint fields have been collapsed into a single
/// [`ConstraintsSource`].
#[derive(Debug, Clone, Deserialize)]
struct RawExperimentConfig {
    name: String,
    #[serde(default)]
    description: String,
    master_seed: u64,
    #[serde(rename = "optimized_agents")]
    agents: Vec<String>,
    scenario: String,
    evaluation: EvaluationConfig,
    convergence: ConvergenceConfig,
    llm: LlmConfig,
    #[serde(default)]
    output: OutputConfig,
    #[serde(default)]
    policy_constraints: Option<ScenarioConstraints>,
    #[serde(default)]
    constraints_module: Option<String>,
}

/// A fully loaded and validated experiment configuration.
///
/// Built by [`ExperimentConfig::load`] from an experiment YAML file; never
/// constructed directly from partially-validated parts, so that any
/// `ExperimentConfig` in hand is known-valid for the lifetime of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentConfig {
    /// Human-readable experiment name, used in run metadata and log context.
    pub name: String,
    /// Free-text description carried through to `config_snapshot`; not
    /// otherwise interpreted by the loop.
    #[serde(default)]
    pub description: String,
    /// Top-level seed all per-agent, per-iteration seeds derive from (§4.3).
    pub master_seed: u64,
    /// Agent identifiers evaluated each iteration, in a fixed processing order.
    ///
    /// Serialized as `optimized_agents` in the experiment YAML (§6).
    #[serde(rename = "optimized_agents")]
    pub agents: Vec<String>,
    /// Identifier of the external simulator scenario this run evaluates against.
    pub scenario: String,
    pub evaluation: EvaluationConfig,
    pub convergence: ConvergenceConfig,
    pub llm: LlmConfig,
    pub output: OutputConfig,
    /// Collapsed form of `policy_constraints` / `constraints_module`.
    #[serde(skip)]
    constraints: ConstraintsSource,
    /// Directory the source YAML file lived in; `system_prompt_file` and
    /// relative `output.directory` paths resolve against this.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl ExperimentConfig {
    /// Load and validate an experiment configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let raw: RawExperimentConfig = serde_yaml::from_str(&text)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::from_raw(raw, base_dir)
    }

    fn from_raw(raw: RawExperimentConfig, base_dir: PathBuf) -> Result<Self> {
        let constraints = match (raw.policy_constraints, raw.constraints_module) {
            (Some(_), Some(_)) => {
                return Err(Error::config_field(
                    "at most one of policy_constraints / constraints_module may be set",
                    "policy_constraints",
                ))
            }
            (Some(inline), None) => ConstraintsSource::Inline(inline),
            (None, Some(module)) => ConstraintsSource::Registry(module),
            (None, None) => {
                return Err(Error::config_field(
                    "one of policy_constraints / constraints_module is required",
                    "policy_constraints",
                ))
            }
        };

        if raw.agents.is_empty() {
            return Err(Error::config_field("agents must be non-empty", "agents"));
        }

        raw.evaluation.validate()?;
        raw.convergence.validate_config()?;
        raw.llm.validate_config()?;

        let config = ExperimentConfig {
            name: raw.name,
            description: raw.description,
            master_seed: raw.master_seed,
            agents: raw.agents,
            scenario: raw.scenario,
            evaluation: raw.evaluation,
            convergence: raw.convergence,
            llm: raw.llm,
            output: raw.output,
            constraints,
            base_dir,
        };

        // Fail fast on a missing/unreadable system_prompt_file rather than
        // deferring the error to the first LLM call of the run.
        config.get_system_prompt()?;

        Ok(config)
    }

    /// Resolve `policy_constraints` / `constraints_module` into a concrete
    /// [`ScenarioConstraints`].
    pub fn get_constraints(&self) -> Result<ScenarioConstraints> {
        self.constraints.resolve()
    }

    /// Resolve the system prompt text, reading `llm.system_prompt_file`
    /// relative to this config's source directory if `llm.system_prompt`
    /// was not set inline.
    pub fn get_system_prompt(&self) -> Result<Option<String>> {
        if let Some(inline) = &self.llm.system_prompt {
            return Ok(Some(inline.clone()));
        }
        if let Some(file) = &self.llm.system_prompt_file {
            let resolved = self.base_dir.join(file);
            let text = std::fs::read_to_string(&resolved).map_err(|e| {
                Error::config_field(
                    format!("failed to read system_prompt_file {}: {e}", resolved.display()),
                    "llm.system_prompt_file",
                )
            })?;
            return Ok(Some(text));
        }
        Ok(None)
    }

    /// Directory under which this run's database lives, resolved against
    /// this config's source directory.
    pub fn output_directory(&self) -> PathBuf {
        self.base_dir.join(&self.output.directory)
    }

    /// A stable content hash of this configuration, used as
    /// `ExperimentRecord.config_snapshot` so that two runs launched from
    /// byte-identical YAML (modulo key order and whitespace) share a snapshot.
    ///
    /// Relies on `serde_json`'s default map representation, which sorts keys
    /// lexicographically in the absence of the `preserve_order` feature, to
    /// produce a canonical encoding before hashing.
    pub fn config_hash(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self)?;
        Ok(blake3::hash(&canonical).to_hex().to_string())
    }

    /// The canonical JSON snapshot itself, persisted verbatim as
    /// `ExperimentRecord.config_snapshot`.
    pub fn config_snapshot(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
