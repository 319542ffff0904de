//! Parses an LLM's raw structured output into a [`Policy`] with stable,
//! framework-assigned node ids.

use super::{Policy, PolicyNode};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// The shape an LLM's structured-output JSON is expected to match before
/// node ids are assigned. Identical to [`PolicyNode`] except `id` is absent
/// here — the LLM never controls node identity.
#[derive(Debug, Clone, Deserialize)]
struct RawNode {
    #[serde(default)]
    parameters: HashMap<String, serde_json::Value>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    children: Vec<RawNode>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPolicy {
    trees: HashMap<String, RawNode>,
}

/// Parses raw structured LLM output into a [`Policy`], assigning every
/// node's `id` from its position in its parent's `children` array.
pub struct PolicyParser;

impl PolicyParser {
    /// Parse a JSON value produced by `LLMClient::generate_structured` into
    /// a policy with deterministic node ids.
    pub fn parse(raw: &serde_json::Value) -> Result<Policy> {
        let raw: RawPolicy = serde_json::from_value(raw.clone())
            .map_err(|e| Error::policy_parse(format!("malformed policy document: {e}")))?;

        let mut trees = HashMap::with_capacity(raw.trees.len());
        for (name, root) in raw.trees {
            let node = Self::assign_ids(&name, &root);
            trees.insert(name, node);
        }
        Ok(Policy { trees })
    }

    fn assign_ids(prefix: &str, raw: &RawNode) -> PolicyNode {
        let children = raw
            .children
            .iter()
            .enumerate()
            .map(|(i, child)| Self::assign_ids(&format!("{prefix}.{i}"), child))
            .collect();

        PolicyNode {
            id: prefix.to_string(),
            parameters: raw.parameters.clone(),
            action: raw.action.clone(),
            children,
        }
    }
}
