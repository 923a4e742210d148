//! Resource assertions (spec §4.4): static assertions depend only on
//! `USER_*` tokens and are evaluated once per `ResourceSpec`; per-node
//! assertions reference any `K8_*` token and are evaluated against each
//! candidate node's `platform_workflow_allocatable_fields`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AdmissionError, CandidateRejection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operator {
    Le,
    Lt,
    Gt,
    Ge,
    Eq,
    Neq,
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_comparable_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Operator {
    /// Numeric comparison when both operands parse as numbers; otherwise falls
    /// back to string equality/inequality (`LE`/`LT`/`GT`/`GE` are undefined
    /// and evaluate to `false` for non-numeric operands).
    pub fn evaluate(self, left: &Value, right: &Value) -> bool {
        if let (Some(l), Some(r)) = (as_f64(left), as_f64(right)) {
            return match self {
                Operator::Le => l <= r,
                Operator::Lt => l < r,
                Operator::Gt => l > r,
                Operator::Ge => l >= r,
                Operator::Eq => l == r,
                Operator::Neq => l != r,
            };
        }
        let l = as_comparable_string(left);
        let r = as_comparable_string(right);
        match self {
            Operator::Eq => l == r,
            Operator::Neq => l != r,
            _ => false,
        }
    }
}

/// A single `{operator, left_operand, right_operand, assert_message}` rule
/// (spec §4.4). Operands are `{{...}}` templates over `USER_*`/`K8_*` tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceAssertion {
    pub operator: Operator,
    pub left_operand: String,
    pub right_operand: String,
    pub assert_message: String,
}

impl ResourceAssertion {
    /// Per-node iff either operand names a `K8_*` token (spec §4.4 split).
    pub fn is_per_node(&self) -> bool {
        self.left_operand.contains("K8_") || self.right_operand.contains("K8_")
    }
}

fn resolve_operand(template: &str, tokens: &BTreeMap<String, Value>) -> Value {
    osmo_compiler::tokens::substitute_tokens(&Value::String(template.to_string()), tokens)
}

fn evaluate_one(assertion: &ResourceAssertion, tokens: &BTreeMap<String, Value>) -> bool {
    let left = resolve_operand(&assertion.left_operand, tokens);
    let right = resolve_operand(&assertion.right_operand, tokens);
    assertion.operator.evaluate(&left, &right)
}

/// Evaluates every static assertion (spec §4.4 "Static"). Fails fast on the
/// first failing assertion, matching the spec's "Failure → reject".
pub fn evaluate_static(
    assertions: &[ResourceAssertion],
    user_tokens: &BTreeMap<String, Value>,
) -> Result<(), AdmissionError> {
    for assertion in assertions.iter().filter(|a| !a.is_per_node()) {
        if !evaluate_one(assertion, user_tokens) {
            return Err(AdmissionError::StaticAssertionFailed(assertion.assert_message.clone()));
        }
    }
    Ok(())
}

/// One candidate node's `K8_*` field map, taken from
/// `platform_workflow_allocatable_fields` (spec §4.4).
pub struct CandidateNode {
    pub hostname: String,
    pub k8_fields: BTreeMap<String, Value>,
}

/// Evaluates every per-node assertion against every candidate; succeeds if at
/// least one node passes all of them (spec §4.4 "Admission succeeds if at
/// least one node passes every assertion"). On failure, returns the full
/// per-node rejection table.
pub fn evaluate_per_node(
    assertions: &[ResourceAssertion],
    user_tokens: &BTreeMap<String, Value>,
    candidates: &[CandidateNode],
) -> Result<String, AdmissionError> {
    let per_node: Vec<&ResourceAssertion> = assertions.iter().filter(|a| a.is_per_node()).collect();
    if per_node.is_empty() {
        return candidates
            .first()
            .map(|c| c.hostname.clone())
            .ok_or_else(|| AdmissionError::NoCandidateNode(vec![]));
    }

    let mut rejections = Vec::new();
    for candidate in candidates {
        let mut tokens = user_tokens.clone();
        tokens.extend(candidate.k8_fields.clone());
        let mut reasons = Vec::new();
        for assertion in &per_node {
            if !evaluate_one(assertion, &tokens) {
                reasons.push(assertion.assert_message.clone());
            }
        }
        if reasons.is_empty() {
            return Ok(candidate.hostname.clone());
        }
        rejections.push(CandidateRejection { hostname: candidate.hostname.clone(), reasons });
    }
    Err(AdmissionError::NoCandidateNode(rejections))
}
