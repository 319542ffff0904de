//! Validates a proposed [`Policy`] against a [`ScenarioConstraints`]
//! whitelist, producing human-readable rejection reasons rather than
//! raising errors (§4.5: a constraint violation is an iteration-level
//! rejection, not a fatal error).

use super::Policy;
use crate::constraints::{ParameterType, ScenarioConstraints};

/// Stateless validator that checks a policy's parameter assignments and
/// actions against a constraint whitelist.
pub struct ConstraintValidator;

impl ConstraintValidator {
    /// Validate every node of `policy` against `constraints`, returning one
    /// rejection reason per violation found. An empty result means the
    /// policy is acceptable for evaluation.
    pub fn validate(policy: &Policy, constraints: &ScenarioConstraints) -> Vec<String> {
        let mut reasons = Vec::new();

        for (tree_name, node) in policy.all_nodes() {
            for (param_name, value) in &node.parameters {
                match constraints.parameter(param_name) {
                    None => reasons.push(format!(
                        "node {}: parameter '{param_name}' is not whitelisted",
                        node.id
                    )),
                    Some(constraint) => {
                        if let Some(reason) = check_value(&node.id, param_name, value, constraint.parameter_type)
                        {
                            reasons.push(reason);
                        }
                        if let Some(n) = value.as_f64() {
                            if let Some(min) = constraint.min {
                                if n < min {
                                    reasons.push(format!(
                                        "node {}: parameter '{param_name}' value {n} below minimum {min}",
                                        node.id
                                    ));
                                }
                            }
                            if let Some(max) = constraint.max {
                                if n > max {
                                    reasons.push(format!(
                                        "node {}: parameter '{param_name}' value {n} above maximum {max}",
                                        node.id
                                    ));
                                }
                            }
                        }
                    }
                }
            }

            if let Some(action) = &node.action {
                match constraints.allowed_actions_for(tree_name) {
                    None => reasons.push(format!(
                        "node {}: tree '{tree_name}' has no whitelisted actions",
                        node.id
                    )),
                    Some(allowed) if !allowed.iter().any(|a| a == action) => reasons.push(format!(
                        "node {}: action '{action}' is not whitelisted for tree '{tree_name}'",
                        node.id
                    )),
                    Some(_) => {}
                }
            }
        }

        reasons
    }
}

fn check_value(
    node_id: &str,
    param_name: &str,
    value: &serde_json::Value,
    expected: ParameterType,
) -> Option<String> {
    let matches = match expected {
        ParameterType::Integer => value.is_i64() || value.is_u64(),
        ParameterType::Float => value.is_number(),
        ParameterType::Boolean => value.is_boolean(),
        ParameterType::String => value.is_string(),
    };
    if matches {
        None
    } else {
        Some(format!(
            "node {node_id}: parameter '{param_name}' expected type {expected:?}, got {value}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ParameterConstraint;
    use crate::policy::PolicyNode;
    use std::collections::HashMap;

    fn constraints() -> ScenarioConstraints {
        let mut c = ScenarioConstraints::new();
        c.parameters.insert(
            "initial_liquidity_fraction".to_string(),
            ParameterConstraint::numeric(0.0, 1.0, ParameterType::Float),
        );
        c.allowed_actions
            .insert("settlement_order".to_string(), vec!["release".to_string(), "hold".to_string()]);
        c
    }

    fn policy_with_param(value: serde_json::Value) -> Policy {
        let mut params = HashMap::new();
        params.insert("initial_liquidity_fraction".to_string(), value);
        let mut policy = Policy::new();
        policy.trees.insert(
            "settlement_order".to_string(),
            PolicyNode {
                id: "settlement_order".to_string(),
                parameters: params,
                action: Some("release".to_string()),
                children: Vec::new(),
            },
        );
        policy
    }

    #[test]
    fn accepts_in_range_value_and_allowed_action() {
        let policy = policy_with_param(serde_json::json!(0.5));
        assert!(ConstraintValidator::validate(&policy, &constraints()).is_empty());
    }

    #[test]
    fn rejects_out_of_range_value() {
        let policy = policy_with_param(serde_json::json!(1.5));
        let reasons = ConstraintValidator::validate(&policy, &constraints());
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].contains("above maximum"));
    }

    #[test]
    fn rejects_unwhitelisted_parameter() {
        let mut params = HashMap::new();
        params.insert("unknown_param".to_string(), serde_json::json!(1));
        let mut policy = Policy::new();
        policy.trees.insert(
            "settlement_order".to_string(),
            PolicyNode {
                id: "settlement_order".to_string(),
                parameters: params,
                action: None,
                children: Vec::new(),
            },
        );
        let reasons = ConstraintValidator::validate(&policy, &constraints());
        assert!(reasons.iter().any(|r| r.contains("not whitelisted")));
    }

    #[test]
    fn rejects_disallowed_action() {
        let mut policy = Policy::new();
        policy.trees.insert(
            "settlement_order".to_string(),
            PolicyNode {
                id: "settlement_order".to_string(),
                parameters: HashMap::new(),
                action: Some("cancel".to_string()),
                children: Vec::new(),
            },
        );
        let reasons = ConstraintValidator::validate(&policy, &constraints());
        assert!(reasons.iter().any(|r| r.contains("not whitelisted for tree")));
    }
}
