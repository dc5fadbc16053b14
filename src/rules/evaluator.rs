//! Rule evaluation
//!
//! Produces one [`RuleResult`] per rule in ascending priority order. A rule
//! whose conditions cannot be evaluated is recorded as not matched with the
//! error attached; it never aborts the batch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{debug, warn};

use super::conditions::{ConditionError, ConditionKind};
use super::fuzzy::{FuzzyConfig, FuzzyMatcher};
use super::models::{Rule, RuleResult};
use super::view::TransactionView;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub fuzzy: FuzzyConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ConditionEvaluator {
    fuzzy: FuzzyMatcher,
}

impl ConditionEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self {
            fuzzy: FuzzyMatcher::new(config.fuzzy),
        }
    }

    /// Evaluate every rule, lowest priority number first.
    ///
    /// Equal priorities keep their input order.
    pub fn evaluate_rules(&self, view: &TransactionView, rules: &[Rule]) -> Vec<RuleResult> {
        let mut ordered: Vec<&Rule> = rules.iter().collect();
        ordered.sort_by_key(|rule| rule.priority);
        ordered
            .into_iter()
            .map(|rule| self.evaluate_rule(view, rule))
            .collect()
    }

    pub fn evaluate_rule(&self, view: &TransactionView, rule: &Rule) -> RuleResult {
        let start = Instant::now();
        let outcome = self.matches(view, &rule.conditions);
        let evaluation_time_us = start.elapsed().as_micros() as u64;

        let (matched, error) = match outcome {
            Ok(matched) => (matched, None),
            Err(e) => {
                warn!(
                    rule_id = %rule.rule_id,
                    rule_name = %rule.name,
                    code = e.code(),
                    error = %e,
                    "Rule evaluation failed, treating as not matched"
                );
                (false, Some(e.to_string()))
            }
        };

        debug!(rule_id = %rule.rule_id, matched, evaluation_time_us, "Rule evaluated");

        RuleResult {
            rule_id: rule.rule_id.to_string(),
            rule_name: rule.name.clone(),
            action: rule.action,
            priority: rule.priority,
            matched,
            conditions: Value::Object(rule.conditions.clone()),
            evaluation_time_us,
            error,
        }
    }

    /// AND over every top-level condition. An empty map matches.
    ///
    /// All keys are resolved before any predicate runs, so an unknown key
    /// fails the rule even when an earlier condition is false.
    pub fn matches(
        &self,
        view: &TransactionView,
        conditions: &Map<String, Value>,
    ) -> Result<bool, ConditionError> {
        let resolved = conditions
            .iter()
            .map(|(tag, value)| {
                ConditionKind::from_tag(tag)
                    .map(|kind| (kind, value))
                    .ok_or_else(|| ConditionError::UnknownCondition(tag.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (kind, value) in resolved {
            if !kind.evaluate(value, view, &self.fuzzy)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleAction, RuleScope};
    use crate::transaction::Transaction;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    fn conditions(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn view(amount: rust_decimal::Decimal) -> TransactionView {
        let mut tx = Transaction::pending("ext-1", Uuid::new_v4(), amount, "USD");
        tx.payment_token = Some("tkn_risky123".into());
        tx.country_code = Some("US".into());
        TransactionView::from_transaction(&tx, Utc::now())
    }

    #[test]
    fn test_results_follow_priority_order() {
        let rules = vec![
            Rule::new("late", RuleAction::Decline, 30, RuleScope::Global, conditions(json!({}))),
            Rule::new("early", RuleAction::Decline, 10, RuleScope::Global, conditions(json!({}))),
            Rule::new("middle", RuleAction::Review, 20, RuleScope::Global, conditions(json!({}))),
        ];
        let results = ConditionEvaluator::default().evaluate_rules(&view(dec!(10)), &rules);

        let names: Vec<&str> = results.iter().map(|r| r.rule_name.as_str()).collect();
        assert_eq!(names, vec!["early", "middle", "late"]);
        assert!(results.iter().all(|r| r.matched));
    }

    #[test]
    fn test_top_level_conditions_are_and_combined() {
        let evaluator = ConditionEvaluator::default();
        let both = conditions(json!({"amountGreaterThan": 100, "countries": ["US"]}));
        let one_fails = conditions(json!({"amountGreaterThan": 100, "countries": ["CA"]}));

        assert!(evaluator.matches(&view(dec!(150)), &both).unwrap());
        assert!(!evaluator.matches(&view(dec!(150)), &one_fails).unwrap());
        assert!(!evaluator.matches(&view(dec!(50)), &both).unwrap());
    }

    #[test]
    fn test_bad_rule_is_isolated() {
        let rules = vec![
            Rule::new(
                "typo",
                RuleAction::Decline,
                1,
                RuleScope::Global,
                conditions(json!({"amountOver": 5})),
            ),
            Rule::new(
                "risky token",
                RuleAction::Decline,
                2,
                RuleScope::Global,
                conditions(json!({"card": {"highRiskTokens": ["tkn_risky123"]}})),
            ),
        ];
        let results = ConditionEvaluator::default().evaluate_rules(&view(dec!(10)), &rules);

        assert_eq!(results.len(), 2);
        assert!(!results[0].matched);
        assert!(results[0].error.as_deref().unwrap().contains("amountOver"));
        assert!(results[1].matched);
        assert_eq!(results[1].rule_id, rules[1].rule_id.to_string());
        assert_eq!(results[1].conditions, json!({"card": {"highRiskTokens": ["tkn_risky123"]}}));
    }

    #[test]
    fn test_unknown_key_fails_even_after_false_condition() {
        let evaluator = ConditionEvaluator::default();
        let c = conditions(json!({"amountGreaterThan": 1000, "zzz": true}));
        assert_eq!(
            evaluator.matches(&view(dec!(10)), &c),
            Err(ConditionError::UnknownCondition("zzz".into()))
        );
    }
}
