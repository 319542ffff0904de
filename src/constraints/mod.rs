//! Scenario constraints: the whitelist a proposed policy must satisfy.
//!
//! `ScenarioConstraints` is the only thing a proposed [`crate::policy::Policy`]
//! is validated against (§3). It is either declared inline in the experiment
//! YAML (`policy_constraints`) or looked up by name via the legacy
//! `constraints_module` field, resolved here as a process-wide
//! [`ConstraintsRegistry`] rather than a Python-style dotted import — see
//! SPEC_FULL.md §4.1 for why.

mod registry;

pub use registry::{register, resolve, ConstraintsRegistry};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The JSON-value primitive type a constrained parameter must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    /// A JSON number interpreted as an integer.
    Integer,
    /// A JSON number interpreted as a float.
    Float,
    /// A JSON boolean.
    Boolean,
    /// A JSON string.
    String,
}

/// Bounds and type for a single whitelisted parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterConstraint {
    /// Minimum allowed value (numeric parameters only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Maximum allowed value (numeric parameters only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Expected value type.
    #[serde(rename = "type")]
    pub parameter_type: ParameterType,
}

impl ParameterConstraint {
    /// Construct a numeric constraint with both bounds.
    pub fn numeric(min: f64, max: f64, parameter_type: ParameterType) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            parameter_type,
        }
    }
}

/// Whitelist of parameters and per-tree allowed actions for one experiment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConstraints {
    /// Parameter name -> allowed range/type.
    #[serde(default)]
    pub parameters: HashMap<String, ParameterConstraint>,
    /// Decision tree name -> whitelist of allowed action identifiers.
    #[serde(default)]
    pub allowed_actions: HashMap<String, Vec<String>>,
}

impl ScenarioConstraints {
    /// Create an empty constraint set (no parameters or trees declared).
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the constraint for a parameter name, if whitelisted.
    pub fn parameter(&self, name: &str) -> Option<&ParameterConstraint> {
        self.parameters.get(name)
    }

    /// Look up the allowed actions for a decision tree, if whitelisted.
    pub fn allowed_actions_for(&self, tree: &str) -> Option<&[String]> {
        self.allowed_actions.get(tree).map(|v| v.as_slice())
    }
}

/// Either an inline constraint set or a legacy named lookup.
///
/// At most one of the two YAML fields `policy_constraints` /
/// `constraints_module` may be present (§3 invariant); this enum makes that
/// mutual exclusivity a type-level property rather than a runtime check on
/// two `Option` fields.
#[derive(Debug, Clone)]
pub enum ConstraintsSource {
    /// Declared directly in the experiment YAML.
    Inline(ScenarioConstraints),
    /// Legacy dotted-path module reference, resolved against the
    /// process-wide [`ConstraintsRegistry`].
    Registry(String),
}

impl ConstraintsSource {
    /// Resolve to a concrete [`ScenarioConstraints`], consulting the
    /// registry for [`ConstraintsSource::Registry`].
    pub fn resolve(&self) -> crate::error::Result<ScenarioConstraints> {
        match self {
            ConstraintsSource::Inline(c) => Ok(c.clone()),
            ConstraintsSource::Registry(key) => resolve(key).ok_or_else(|| {
                crate::error::Error::config_field(
                    format!("no constraints registered under '{key}'"),
                    "constraints_module",
                )
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_source_resolves_directly() {
        let mut constraints = ScenarioConstraints::new();
        constraints.parameters.insert(
            "initial_liquidity_fraction".to_string(),
            ParameterConstraint::numeric(0.0, 1.0, ParameterType::Float),
        );
        let source = ConstraintsSource::Inline(constraints.clone());
        assert_eq!(source.resolve().unwrap(), constraints);
    }

    #[test]
    fn registry_source_fails_when_unregistered() {
        let source = ConstraintsSource::Registry("nonexistent.module".to_string());
        assert!(source.resolve().is_err());
    }
}
