use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::PipelineError;
use crate::terminology::{GuardedDictionary, TermDictionary};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAction {
    /// Copied verbatim (plan names, prices).
    Pass,
    /// String values are translated; anything else is copied.
    Translate,
    /// Each string element of a list is translated; other elements are copied.
    TranslateEach,
}

/// Per-field rules for a plan object. Fields without a rule are translated when they hold a
/// string and copied otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPolicy {
    rules: BTreeMap<String, FieldAction>,
}

impl Default for FieldPolicy {
    fn default() -> Self {
        Self::pricing_plans()
    }
}

impl FieldPolicy {
    pub fn pricing_plans() -> Self {
        let rules = [
            ("name", FieldAction::Pass),
            ("price", FieldAction::Pass),
            ("period", FieldAction::Translate),
            ("features", FieldAction::TranslateEach),
            ("description", FieldAction::Translate),
        ]
        .into_iter()
        .map(|(k, a)| (k.to_string(), a))
        .collect();
        Self { rules }
    }

    /// The pricing-plan table with `overrides` layered on top.
    pub fn with_overrides(overrides: &BTreeMap<String, FieldAction>) -> Self {
        let mut policy = Self::pricing_plans();
        for (field, action) in overrides {
            policy.rules.insert(field.clone(), *action);
        }
        policy
    }

    pub fn action_for(&self, field: &str) -> FieldAction {
        self.rules
            .get(field)
            .copied()
            .unwrap_or(FieldAction::Translate)
    }
}

/// Leaf-level text transform used by the walker.
pub trait LeafTranslate {
    fn translate_leaf(&self, text: &str) -> String;
}

impl LeafTranslate for TermDictionary {
    fn translate_leaf(&self, text: &str) -> String {
        self.translate(text)
    }
}

impl LeafTranslate for GuardedDictionary<'_> {
    fn translate_leaf(&self, text: &str) -> String {
        self.translate(text)
    }
}

pub struct StructuralWalker<'a> {
    policy: &'a FieldPolicy,
}

impl<'a> StructuralWalker<'a> {
    pub fn new(policy: &'a FieldPolicy) -> Self {
        Self { policy }
    }

    /// Translates a plan list. Plan order, field order and unrecognised values are preserved;
    /// entries that are not objects pass through untouched.
    pub fn translate(&self, plans: &[Value], leaf: &dyn LeafTranslate) -> Vec<Value> {
        plans
            .iter()
            .map(|plan| match plan {
                Value::Object(fields) => Value::Object(self.translate_plan(fields, leaf)),
                other => other.clone(),
            })
            .collect()
    }

    fn translate_plan(
        &self,
        fields: &Map<String, Value>,
        leaf: &dyn LeafTranslate,
    ) -> Map<String, Value> {
        let mut out = Map::with_capacity(fields.len());
        for (key, value) in fields {
            let translated = match (self.policy.action_for(key), value) {
                (FieldAction::Pass, v) => v.clone(),
                (FieldAction::Translate | FieldAction::TranslateEach, Value::String(s)) => {
                    Value::String(leaf.translate_leaf(s))
                }
                (FieldAction::TranslateEach, Value::Array(items)) => Value::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => Value::String(leaf.translate_leaf(s)),
                            other => other.clone(),
                        })
                        .collect(),
                ),
                (_, v) => v.clone(),
            };
            out.insert(key.clone(), translated);
        }
        out
    }
}

/// How a plan list was stored, so it can be written back the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanEncoding {
    JsonString,
    Native,
}

/// Decodes a stored plan-list value: either a JSON array or a string holding one. Elements must be
/// objects or scalars.
pub fn decode_plans(
    field: &str,
    value: &Value,
) -> Result<(Vec<Value>, PlanEncoding), PipelineError> {
    let malformed = |reason: String| PipelineError::MalformedStructuredField {
        field: field.to_string(),
        reason,
    };
    let (parsed, encoding) = match value {
        Value::String(s) => (
            serde_json::from_str::<Value>(s).map_err(|e| malformed(format!("invalid JSON: {e}")))?,
            PlanEncoding::JsonString,
        ),
        other => (other.clone(), PlanEncoding::Native),
    };
    let Value::Array(plans) = parsed else {
        return Err(malformed("expected a list of plans".to_string()));
    };
    if let Some(pos) = plans.iter().position(Value::is_array) {
        return Err(malformed(format!("plan #{pos} is a nested list")));
    }
    Ok((plans, encoding))
}

pub fn encode_plans(plans: Value, encoding: PlanEncoding) -> Value {
    match encoding {
        PlanEncoding::Native => plans,
        // Serializing a `Value` cannot fail.
        PlanEncoding::JsonString => {
            Value::String(serde_json::to_string(&plans).unwrap_or_default())
        }
    }
}
