//! Proposed decision policies: parsing, stable node identity, and
//! constraint validation (§3, §4.5).
//!
//! A [`Policy`] is the LLM's structured proposal for one agent: a set of
//! named decision trees, each an opaque tree of parameter assignments and
//! actions. The framework never interprets node contents beyond what
//! [`ConstraintValidator`] needs to check against a [`ScenarioConstraints`]
//! whitelist — the trees are opaque payloads handed to the external
//! simulator.

mod parser;
mod validator;

pub use parser::PolicyParser;
pub use validator::ConstraintValidator;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single node in a decision tree.
///
/// `id` is assigned deterministically by [`PolicyParser`] from the node's
/// position in its parent's `children` array, never by the LLM — so replay
/// of a stored policy always reproduces the same ids regardless of how the
/// LLM happened to order its own output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyNode {
    /// Stable identifier, e.g. `"settlement_order.0.1"`.
    pub id: String,
    /// Parameter assignments at this node (name -> JSON scalar value).
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    /// Action identifier this node selects, if it is a leaf/action node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Child nodes, in the order that determines their ids.
    #[serde(default)]
    pub children: Vec<PolicyNode>,
}

impl PolicyNode {
    /// Iterate this node and all of its descendants, depth-first.
    pub fn iter(&self) -> impl Iterator<Item = &PolicyNode> {
        PolicyNodeIter { stack: vec![self] }
    }
}

struct PolicyNodeIter<'a> {
    stack: Vec<&'a PolicyNode>,
}

impl<'a> Iterator for PolicyNodeIter<'a> {
    type Item = &'a PolicyNode;

    fn next(&mut self) -> Option<&'a PolicyNode> {
        let node = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

/// A full proposed policy for one agent: a named set of decision trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Decision tree name -> root node.
    pub trees: HashMap<String, PolicyNode>,
}

impl Policy {
    /// An empty policy with no decision trees.
    pub fn new() -> Self {
        Self {
            trees: HashMap::new(),
        }
    }

    /// Iterate every node across every tree, depth-first per tree.
    pub fn all_nodes(&self) -> impl Iterator<Item = (&str, &PolicyNode)> {
        self.trees
            .iter()
            .flat_map(|(name, root)| root.iter().map(move |node| (name.as_str(), node)))
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str, action: &str) -> PolicyNode {
        PolicyNode {
            id: id.to_string(),
            parameters: HashMap::new(),
            action: Some(action.to_string()),
            children: Vec::new(),
        }
    }

    #[test]
    fn all_nodes_visits_every_tree_and_descendant() {
        let mut policy = Policy::new();
        let root = PolicyNode {
            id: "settlement_order".to_string(),
            parameters: HashMap::new(),
            action: None,
            children: vec![leaf("settlement_order.0", "release"), leaf("settlement_order.1", "hold")],
        };
        policy.trees.insert("settlement_order".to_string(), root);
        let ids: Vec<&str> = policy.all_nodes().map(|(_, n)| n.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["settlement_order", "settlement_order.0", "settlement_order.1"]
        );
    }
}
