//! Process-wide registry for named `ScenarioConstraints` builders.
//!
//! Replaces the legacy Python `constraints_module` dotted-import mechanism
//! (SPEC_FULL.md §4.1): experiment packs register a named builder function
//! once at process start, and the `constraints_module` field in an
//! experiment YAML is resolved as a lookup into this table rather than a
//! dynamic import.

use super::ScenarioConstraints;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::sync::RwLock;

type Builder = fn() -> ScenarioConstraints;

fn registry() -> &'static RwLock<HashMap<String, Builder>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, Builder>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a named constraints builder.
///
/// Calling this twice with the same key overwrites the previous entry;
/// experiment packs are expected to register once during their own
/// initialization.
pub fn register(key: impl Into<String>, builder: Builder) {
    registry()
        .write()
        .expect("constraints registry lock poisoned")
        .insert(key.into(), builder);
}

/// Resolve a registered key to a concrete `ScenarioConstraints`.
pub fn resolve(key: &str) -> Option<ScenarioConstraints> {
    registry()
        .read()
        .expect("constraints registry lock poisoned")
        .get(key)
        .map(|builder| builder())
}

/// A lightweight façade over the module-level functions, for callers that
/// prefer an owned handle over free functions (e.g. dependency injection in
/// tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintsRegistry;

impl ConstraintsRegistry {
    /// Register a named constraints builder.
    pub fn register(&self, key: impl Into<String>, builder: Builder) {
        register(key, builder)
    }

    /// Resolve a registered key to a concrete `ScenarioConstraints`.
    pub fn resolve(&self, key: &str) -> Option<ScenarioConstraints> {
        resolve(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::{ParameterConstraint, ParameterType};

    fn sample() -> ScenarioConstraints {
        let mut c = ScenarioConstraints::new();
        c.parameters.insert(
            "threshold".to_string(),
            ParameterConstraint::numeric(0.0, 1.0, ParameterType::Float),
        );
        c
    }

    #[test]
    fn register_then_resolve() {
        register("test.registry.sample", sample);
        let resolved = resolve("test.registry.sample").expect("registered");
        assert_eq!(resolved, sample());
    }

    #[test]
    fn unregistered_key_resolves_to_none() {
        assert!(resolve("test.registry.never_registered").is_none());
    }
}
