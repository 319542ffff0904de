//! LLM client configuration (`llm` block of the experiment YAML).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

fn default_temperature() -> f64 {
    1.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    120
}

/// The `llm` block of the experiment YAML.
///
/// `model` is a `provider:name` string (e.g. `anthropic:claude-sonnet-4`);
/// the provider prefix selects the wire format inside `HttpLlmClient`
/// (§4.4.1). Anything beyond the named fields is captured in `extra` and
/// passed through opaquely to the provider (e.g. Anthropic's
/// `thinking_budget`, OpenAI's `reasoning_effort`).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LlmConfig {
    /// `provider:name` model identifier.
    #[validate(length(min = 1))]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f64,
    /// Maximum retry attempts for transport/5xx failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-call timeout, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Inline system prompt text. Mutually exclusive with `system_prompt_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Path to a file containing the system prompt, resolved relative to
    /// the experiment YAML's directory. Mutually exclusive with
    /// `system_prompt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_file: Option<String>,
    /// Anthropic-specific extended-thinking token budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
    /// OpenAI-specific reasoning effort (`"low"` | `"medium"` | `"high"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    /// Any additional provider-specific fields, passed through opaquely.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl LlmConfig {
    /// Per-call timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Split `model` into its `(provider, name)` halves.
    pub fn provider_and_name(&self) -> crate::error::Result<(&str, &str)> {
        self.model.split_once(':').ok_or_else(|| {
            crate::error::Error::config_field(
                format!("llm.model '{}' is not in provider:name form", self.model),
                "llm.model",
            )
        })
    }

    /// Validate range constraints and the system-prompt mutual exclusivity
    /// invariant that `validator`'s derive cannot express.
    pub fn validate_config(&self) -> crate::error::Result<()> {
        self.validate()
            .map_err(|e| crate::error::Error::config_field(e.to_string(), "llm"))?;

        if self.system_prompt.is_some() && self.system_prompt_file.is_some() {
            return Err(crate::error::Error::config_field(
                "at most one of llm.system_prompt / llm.system_prompt_file may be set",
                "llm.system_prompt",
            ));
        }

        self.provider_and_name()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> LlmConfig {
        LlmConfig {
            model: "anthropic:claude-sonnet-4".to_string(),
            temperature: 1.0,
            max_retries: 3,
            timeout_seconds: 120,
            system_prompt: None,
            system_prompt_file: None,
            thinking_budget: None,
            reasoning_effort: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn provider_and_name_split() {
        let cfg = base();
        assert_eq!(
            cfg.provider_and_name().unwrap(),
            ("anthropic", "claude-sonnet-4")
        );
    }

    #[test]
    fn rejects_model_without_provider_prefix() {
        let mut cfg = base();
        cfg.model = "claude-sonnet-4".to_string();
        assert!(cfg.validate_config().is_err());
    }

    #[test]
    fn rejects_both_system_prompt_fields() {
        let mut cfg = base();
        cfg.system_prompt = Some("a".to_string());
        cfg.system_prompt_file = Some("b.txt".to_string());
        assert!(cfg.validate_config().is_err());
    }

    #[test]
    fn rejects_temperature_out_of_range() {
        let mut cfg = base();
        cfg.temperature = 3.0;
        assert!(cfg.validate_config().is_err());
    }
}
