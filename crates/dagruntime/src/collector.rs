//! Input collection: merges a step's static configuration with the outputs
//! of its completed dependencies.
//!
//! Outputs are merged shallowly in dependency order, so a later dependency
//! overwrites keys written by an earlier one. Optional `NormalizationRules`
//! map key aliases onto canonical names and back-fill critical fields from
//! any completed step.

use dagcore::{NodeId, Step, StepStatus, ValueMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One canonical key and the alternative spellings producers use for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasRule {
    pub canonical: String,
    pub aliases: Vec<String>,
    /// Also write the canonical value back under every alias
    #[serde(default)]
    pub mirror: bool,
}

impl AliasRule {
    pub fn new(canonical: impl Into<String>, aliases: &[&str]) -> Self {
        Self {
            canonical: canonical.into(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            mirror: false,
        }
    }

    pub fn mirrored(mut self) -> Self {
        self.mirror = true;
        self
    }
}

/// Compatibility rules applied around the merge. Empty by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationRules {
    pub aliases: Vec<AliasRule>,
    /// Keys looked up across all completed steps when still missing after the merge
    pub critical_fields: Vec<String>,
}

impl NormalizationRules {
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty() && self.critical_fields.is_empty()
    }

    /// Rules for token-swap workflows whose nodes disagree on key spelling
    pub fn token_swap() -> Self {
        Self {
            aliases: vec![
                AliasRule::new("fromToken", &["from_token", "src"]).mirrored(),
                AliasRule::new("toToken", &["to_token", "dst"]).mirrored(),
                AliasRule::new("amount", &["amount_in", "amountIn"]),
                AliasRule::new("walletAddress", &["wallet_address", "address"]),
                AliasRule::new("chainId", &["chain_id"]),
            ],
            critical_fields: vec![
                "fromToken".into(),
                "toToken".into(),
                "amount".into(),
                "walletAddress".into(),
                "chainId".into(),
            ],
        }
    }

    /// Fill canonical keys from the first alias present, then mirror if asked
    pub fn normalize(&self, map: &mut ValueMap) {
        for rule in &self.aliases {
            if !map.contains_key(&rule.canonical) {
                if let Some(value) = rule.aliases.iter().find_map(|a| map.get(a)).cloned() {
                    map.insert(rule.canonical.clone(), value);
                }
            }
            if rule.mirror {
                if let Some(value) = map.get(&rule.canonical).cloned() {
                    for alias in &rule.aliases {
                        map.entry(alias.clone()).or_insert_with(|| value.clone());
                    }
                }
            }
        }
    }
}

/// Build the effective inputs for `step`.
///
/// Dependencies that are not completed are skipped. With non-empty rules the
/// static inputs and each dependency's outputs are normalized before merging,
/// the result is normalized again, and missing critical fields are taken
/// from the completed steps in `order`.
pub fn collect_inputs(
    step: &Step,
    steps: &HashMap<NodeId, Step>,
    order: &[NodeId],
    rules: &NormalizationRules,
) -> ValueMap {
    let mut inputs = step.inputs.clone();
    rules.normalize(&mut inputs);

    for dep_id in &step.dependencies {
        let Some(dep) = steps.get(dep_id) else {
            continue;
        };
        if dep.status != StepStatus::Completed {
            continue;
        }

        if rules.is_empty() {
            inputs.extend(dep.outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
        } else {
            let mut outputs = dep.outputs.clone();
            rules.normalize(&mut outputs);
            inputs.extend(outputs);
        }
    }

    if !rules.is_empty() {
        rules.normalize(&mut inputs);
        backfill_critical(&mut inputs, step, steps, order, rules);
    }

    inputs
}

fn backfill_critical(
    inputs: &mut ValueMap,
    step: &Step,
    steps: &HashMap<NodeId, Step>,
    order: &[NodeId],
    rules: &NormalizationRules,
) {
    for field in &rules.critical_fields {
        if inputs.contains_key(field) {
            continue;
        }

        let found = order
            .iter()
            .filter(|id| **id != step.node_id)
            .filter_map(|id| steps.get(id))
            .filter(|s| s.status == StepStatus::Completed)
            .find_map(|s| {
                let mut outputs = s.outputs.clone();
                rules.normalize(&mut outputs);
                outputs.remove(field)
            });

        if let Some(value) = found {
            tracing::debug!(
                "Back-filled '{}' for step '{}' from a completed step",
                field,
                step.node_id
            );
            inputs.insert(field.clone(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagcore::{NodeExecutionResult, Value};

    fn completed(id: &str, outputs: &[(&str, Value)]) -> Step {
        let mut step = Step::new(id, "echo", ValueMap::new());
        step.start().unwrap();
        let mut result = NodeExecutionResult::success(ValueMap::new());
        for (k, v) in outputs {
            result = result.with_output(*k, v.clone());
        }
        step.complete(result).unwrap();
        step
    }

    fn table(steps: Vec<Step>) -> (HashMap<NodeId, Step>, Vec<NodeId>) {
        let order = steps.iter().map(|s| s.node_id.clone()).collect();
        let map = steps.into_iter().map(|s| (s.node_id.clone(), s)).collect();
        (map, order)
    }

    #[test]
    fn merges_dependency_outputs_over_static_inputs() {
        let a = completed("a", &[("x", Value::from(1i64))]);
        let mut config = ValueMap::new();
        config.insert("y".into(), Value::from(2i64));
        let mut b = Step::new("b", "echo", config);
        b.dependencies.push("a".into());
        let (steps, order) = table(vec![a, b.clone()]);

        let inputs = collect_inputs(&b, &steps, &order, &NormalizationRules::default());

        let mut expected = ValueMap::new();
        expected.insert("y".into(), Value::from(2i64));
        expected.insert("x".into(), Value::from(1i64));
        assert_eq!(inputs, expected);
    }

    #[test]
    fn later_dependency_wins_on_key_clash() {
        let first = completed("first", &[("price", Value::from(1i64))]);
        let second = completed("second", &[("price", Value::from(2i64))]);
        let mut target = Step::new("target", "echo", ValueMap::new());
        target.dependencies = vec!["first".into(), "second".into()];
        let (steps, order) = table(vec![first, second, target.clone()]);

        let inputs = collect_inputs(&target, &steps, &order, &NormalizationRules::default());
        assert_eq!(inputs["price"], Value::from(2i64));
    }

    #[test]
    fn incomplete_dependencies_are_skipped() {
        let pending = Step::new("a", "echo", ValueMap::new());
        let mut b = Step::new("b", "echo", ValueMap::new());
        b.dependencies.push("a".into());
        let (steps, order) = table(vec![pending, b.clone()]);

        assert!(collect_inputs(&b, &steps, &order, &NormalizationRules::default()).is_empty());
    }

    #[test]
    fn aliases_resolve_to_canonical_and_mirror() {
        let quote = completed("quote", &[("src", Value::from("ETH"))]);
        let mut swap = Step::new("swap", "echo", ValueMap::new());
        swap.dependencies.push("quote".into());
        let (steps, order) = table(vec![quote, swap.clone()]);

        let inputs = collect_inputs(&swap, &steps, &order, &NormalizationRules::token_swap());
        assert_eq!(inputs["fromToken"].as_str(), Some("ETH"));
        assert_eq!(inputs["from_token"].as_str(), Some("ETH"));
    }

    #[test]
    fn critical_fields_are_backfilled_from_unrelated_steps() {
        let wallet = completed("wallet", &[("address", Value::from("0xabc"))]);
        let quote = completed("quote", &[("toToken", Value::from("USDC"))]);
        let mut swap = Step::new("swap", "echo", ValueMap::new());
        swap.dependencies.push("quote".into());
        let (steps, order) = table(vec![wallet, quote, swap.clone()]);

        let inputs = collect_inputs(&swap, &steps, &order, &NormalizationRules::token_swap());
        assert_eq!(inputs["walletAddress"].as_str(), Some("0xabc"));
        assert_eq!(inputs["toToken"].as_str(), Some("USDC"));
        assert!(!inputs.contains_key("amount"));
    }
}
