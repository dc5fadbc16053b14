//! Condition registry
//!
//! Every supported top-level condition key maps to exactly one pure
//! predicate over the flattened [`TransactionView`]. The set is closed:
//! [`ConditionKind::ALL`] enumerates it and an unknown key is an error.

use chrono::{Datelike, Timelike};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::str::FromStr;
use thiserror::Error;

use super::fuzzy::{FuzzyMatcher, clean_merchant_name};
use super::models::Rule;
use super::view::TransactionView;
use crate::tokenization::is_expired;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    #[error("Unknown condition type: {0}")]
    UnknownCondition(String),

    #[error("Invalid value for {condition}: {reason}")]
    InvalidValue {
        condition: &'static str,
        reason: String,
    },

    #[error("Fingerprint count for a {0}-minute window was not computed")]
    MissingFingerprintCount(u32),
}

impl ConditionError {
    pub fn code(&self) -> &'static str {
        match self {
            ConditionError::UnknownCondition(_) => "UNKNOWN_CONDITION",
            ConditionError::InvalidValue { .. } => "INVALID_CONDITION_VALUE",
            ConditionError::MissingFingerprintCount(_) => "MISSING_FINGERPRINT_COUNT",
        }
    }

    fn invalid(condition: &'static str, reason: impl Into<String>) -> Self {
        ConditionError::InvalidValue {
            condition,
            reason: reason.into(),
        }
    }
}

/// Predicate signature shared by every condition type
pub type Predicate = fn(&Value, &TransactionView, &FuzzyMatcher) -> Result<bool, ConditionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    AmountGreaterThan,
    AmountGreaterThanOrEqual,
    AmountLessThan,
    AmountLessThanOrEqual,
    AmountBetween,
    Currencies,
    MerchantCategories,
    ExcludedMerchantCategories,
    Countries,
    ExcludedCountries,
    PaymentMethods,
    DaysOfWeek,
    HourOfDay,
    MerchantName,
    MerchantNameContains,
    Card,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 16] = [
        ConditionKind::AmountGreaterThan,
        ConditionKind::AmountGreaterThanOrEqual,
        ConditionKind::AmountLessThan,
        ConditionKind::AmountLessThanOrEqual,
        ConditionKind::AmountBetween,
        ConditionKind::Currencies,
        ConditionKind::MerchantCategories,
        ConditionKind::ExcludedMerchantCategories,
        ConditionKind::Countries,
        ConditionKind::ExcludedCountries,
        ConditionKind::PaymentMethods,
        ConditionKind::DaysOfWeek,
        ConditionKind::HourOfDay,
        ConditionKind::MerchantName,
        ConditionKind::MerchantNameContains,
        ConditionKind::Card,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            ConditionKind::AmountGreaterThan => "amountGreaterThan",
            ConditionKind::AmountGreaterThanOrEqual => "amountGreaterThanOrEqual",
            ConditionKind::AmountLessThan => "amountLessThan",
            ConditionKind::AmountLessThanOrEqual => "amountLessThanOrEqual",
            ConditionKind::AmountBetween => "amountBetween",
            ConditionKind::Currencies => "currencies",
            ConditionKind::MerchantCategories => "merchantCategories",
            ConditionKind::ExcludedMerchantCategories => "excludedMerchantCategories",
            ConditionKind::Countries => "countries",
            ConditionKind::ExcludedCountries => "excludedCountries",
            ConditionKind::PaymentMethods => "paymentMethods",
            ConditionKind::DaysOfWeek => "daysOfWeek",
            ConditionKind::HourOfDay => "hourOfDay",
            ConditionKind::MerchantName => "merchantName",
            ConditionKind::MerchantNameContains => "merchantNameContains",
            ConditionKind::Card => "card",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.tag() == tag)
    }

    pub fn predicate(&self) -> Predicate {
        match self {
            ConditionKind::AmountGreaterThan => amount_greater_than,
            ConditionKind::AmountGreaterThanOrEqual => amount_greater_than_or_equal,
            ConditionKind::AmountLessThan => amount_less_than,
            ConditionKind::AmountLessThanOrEqual => amount_less_than_or_equal,
            ConditionKind::AmountBetween => amount_between,
            ConditionKind::Currencies => currencies,
            ConditionKind::MerchantCategories => merchant_categories,
            ConditionKind::ExcludedMerchantCategories => excluded_merchant_categories,
            ConditionKind::Countries => countries,
            ConditionKind::ExcludedCountries => excluded_countries,
            ConditionKind::PaymentMethods => payment_methods,
            ConditionKind::DaysOfWeek => days_of_week,
            ConditionKind::HourOfDay => hour_of_day,
            ConditionKind::MerchantName => merchant_name,
            ConditionKind::MerchantNameContains => merchant_name_contains,
            ConditionKind::Card => card,
        }
    }

    pub fn evaluate(
        &self,
        value: &Value,
        view: &TransactionView,
        fuzzy: &FuzzyMatcher,
    ) -> Result<bool, ConditionError> {
        (self.predicate())(value, view, fuzzy)
    }
}

// ============================================================
// Value helpers
// ============================================================

/// JSON number or numeric string, parsed exactly
fn decimal_value(condition: &'static str, value: &Value) -> Result<Decimal, ConditionError> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => {
            return Err(ConditionError::invalid(
                condition,
                format!("expected a number, got {}", other),
            ));
        }
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| ConditionError::invalid(condition, format!("'{}': {}", text, e)))
}

/// A single string or a list of strings
fn string_list(condition: &'static str, value: &Value) -> Result<Vec<String>, ConditionError> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ConditionError::invalid(condition, "list entries must be strings"))
            })
            .collect(),
        _ => Err(ConditionError::invalid(condition, "expected a string or list of strings")),
    }
}

fn field<'a>(condition: &'static str, value: &'a Value, key: &str) -> Result<&'a Value, ConditionError> {
    value
        .get(key)
        .ok_or_else(|| ConditionError::invalid(condition, format!("missing '{}'", key)))
}

fn in_list(actual: Option<&str>, list: &[String]) -> bool {
    actual.is_some_and(|a| list.iter().any(|v| v.eq_ignore_ascii_case(a)))
}

// ============================================================
// Amount
// ============================================================

fn amount_greater_than(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    Ok(view.amount > decimal_value("amountGreaterThan", v)?)
}

fn amount_greater_than_or_equal(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    Ok(view.amount >= decimal_value("amountGreaterThanOrEqual", v)?)
}

fn amount_less_than(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    Ok(view.amount < decimal_value("amountLessThan", v)?)
}

fn amount_less_than_or_equal(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    Ok(view.amount <= decimal_value("amountLessThanOrEqual", v)?)
}

fn amount_between(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    const TAG: &str = "amountBetween";
    let min = decimal_value(TAG, field(TAG, v, "min")?)?;
    let max = decimal_value(TAG, field(TAG, v, "max")?)?;
    if min > max {
        return Err(ConditionError::invalid(TAG, format!("min {} exceeds max {}", min, max)));
    }
    Ok(min <= view.amount && view.amount <= max)
}

// ============================================================
// Set membership
// ============================================================

fn currencies(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    let list = string_list("currencies", v)?;
    Ok(in_list(Some(view.currency.as_str()), &list))
}

fn merchant_categories(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    let list = string_list("merchantCategories", v)?;
    Ok(in_list(view.merchant_category_code.as_deref(), &list))
}

fn excluded_merchant_categories(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    let list = string_list("excludedMerchantCategories", v)?;
    Ok(!in_list(view.merchant_category_code.as_deref(), &list))
}

fn countries(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    let list = string_list("countries", v)?;
    Ok(in_list(view.country_code.as_deref(), &list))
}

fn excluded_countries(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    let list = string_list("excludedCountries", v)?;
    Ok(!in_list(view.country_code.as_deref(), &list))
}

fn payment_methods(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    let list = string_list("paymentMethods", v)?;
    Ok(in_list(Some(view.payment_method.as_str()), &list))
}

// ============================================================
// Time
// ============================================================

/// 0 = Sunday .. 6 = Saturday, or an English day name / 3-letter prefix
fn parse_weekday(value: &Value) -> Result<u32, ConditionError> {
    const TAG: &str = "daysOfWeek";
    const NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

    match value {
        Value::Number(n) => n
            .as_u64()
            .filter(|d| *d <= 6)
            .map(|d| d as u32)
            .ok_or_else(|| ConditionError::invalid(TAG, format!("day {} out of range 0..=6", n))),
        Value::String(s) => {
            let lower = s.trim().to_ascii_lowercase();
            NAMES
                .iter()
                .position(|name| lower.len() >= 3 && lower.starts_with(name))
                .map(|i| i as u32)
                .ok_or_else(|| ConditionError::invalid(TAG, format!("unknown day '{}'", s)))
        }
        other => Err(ConditionError::invalid(TAG, format!("unexpected day {}", other))),
    }
}

fn days_of_week(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    let days = match v {
        Value::Array(items) => items.iter().map(parse_weekday).collect::<Result<Vec<_>, _>>()?,
        single => vec![parse_weekday(single)?],
    };
    Ok(days.contains(&view.timestamp.weekday().num_days_from_sunday()))
}

fn hour_bound(value: &Value, key: &str) -> Result<u32, ConditionError> {
    const TAG: &str = "hourOfDay";
    field(TAG, value, key)?
        .as_u64()
        .filter(|h| *h <= 24)
        .map(|h| h as u32)
        .ok_or_else(|| ConditionError::invalid(TAG, format!("'{}' must be an hour 0..=24", key)))
}

/// `start <= hour < end`; a window with `start > end` wraps past midnight
fn hour_of_day(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    let start = hour_bound(v, "start")?;
    let end = hour_bound(v, "end")?;
    if start == end {
        return Err(ConditionError::invalid("hourOfDay", "empty window: start equals end"));
    }
    let hour = view.timestamp.hour();
    Ok(if start < end {
        start <= hour && hour < end
    } else {
        hour >= start || hour < end
    })
}

// ============================================================
// Merchant name
// ============================================================

fn merchant_target(condition: &'static str, v: &Value) -> Result<String, ConditionError> {
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| ConditionError::invalid(condition, "expected a string"))
}

/// Enriched names are already canonical, so they compare exactly;
/// raw descriptors go through the fuzzy matcher.
fn merchant_name(v: &Value, view: &TransactionView, fuzzy: &FuzzyMatcher) -> Result<bool, ConditionError> {
    let target = merchant_target("merchantName", v)?;
    if let Some(normalized) = view.normalized_merchant_name.as_deref() {
        return Ok(clean_merchant_name(normalized).eq_ignore_ascii_case(&clean_merchant_name(&target)));
    }
    Ok(view
        .merchant_name
        .as_deref()
        .is_some_and(|name| fuzzy.equals(name, &target).matched))
}

fn merchant_name_contains(v: &Value, view: &TransactionView, fuzzy: &FuzzyMatcher) -> Result<bool, ConditionError> {
    let needle = merchant_target("merchantNameContains", v)?;
    if let Some(normalized) = view.normalized_merchant_name.as_deref() {
        let needle = clean_merchant_name(&needle).to_lowercase();
        return Ok(!needle.is_empty() && clean_merchant_name(normalized).to_lowercase().contains(&needle));
    }
    Ok(view
        .merchant_name
        .as_deref()
        .is_some_and(|name| fuzzy.contains(name, &needle).matched))
}

// ============================================================
// Card block
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    And,
    #[default]
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintFrequency {
    pub max_count: u64,
    pub window_minutes: u32,
}

/// Card sub-conditions, combined with `operator` independently of the
/// outer AND
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CardConditions {
    #[serde(default)]
    pub brands: Option<Vec<String>>,
    #[serde(default)]
    pub high_risk_tokens: Option<Vec<String>>,
    #[serde(default)]
    pub require_valid_expiry: Option<bool>,
    #[serde(default)]
    pub fingerprint_frequency: Option<FingerprintFrequency>,
    #[serde(default)]
    pub operator: LogicalOperator,
}

impl CardConditions {
    pub fn parse(value: &Value) -> Result<Self, ConditionError> {
        serde_json::from_value(value.clone()).map_err(|e| ConditionError::invalid("card", e.to_string()))
    }

    pub fn evaluate(&self, view: &TransactionView) -> Result<bool, ConditionError> {
        let mut checks: Vec<Box<dyn Fn() -> Result<bool, ConditionError> + '_>> = Vec::new();

        if let Some(brands) = &self.brands {
            checks.push(Box::new(move || Ok(in_list(view.card_brand.as_deref(), brands))));
        }
        if let Some(tokens) = &self.high_risk_tokens {
            checks.push(Box::new(move || {
                Ok(view
                    .payment_token
                    .as_deref()
                    .is_some_and(|token| tokens.iter().any(|t| t == token)))
            }));
        }
        if self.require_valid_expiry == Some(true) {
            checks.push(Box::new(move || {
                Ok(match (view.expiry_month, view.expiry_year) {
                    (Some(month), Some(year)) => is_expired(month, year, view.now),
                    _ => true,
                })
            }));
        }
        if let Some(freq) = &self.fingerprint_frequency {
            checks.push(Box::new(move || {
                if view.card_fingerprint.is_none() {
                    return Ok(false);
                }
                let seen = view
                    .fingerprint_counts
                    .get(&freq.window_minutes)
                    .copied()
                    .ok_or(ConditionError::MissingFingerprintCount(freq.window_minutes))?;
                Ok(seen >= freq.max_count)
            }));
        }

        if checks.is_empty() {
            return Ok(false);
        }
        match self.operator {
            LogicalOperator::Or => {
                for check in &checks {
                    if check()? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            LogicalOperator::And => {
                for check in &checks {
                    if !check()? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

fn card(v: &Value, view: &TransactionView, _: &FuzzyMatcher) -> Result<bool, ConditionError> {
    CardConditions::parse(v)?.evaluate(view)
}

/// Fingerprint windows referenced by `card.fingerprintFrequency` across
/// a rule set; the caller counts prior uses for each before evaluation.
pub fn fingerprint_windows<'a>(rules: impl IntoIterator<Item = &'a Rule>) -> BTreeSet<u32> {
    rules
        .into_iter()
        .filter_map(|rule| rule.conditions.get(ConditionKind::Card.tag()))
        .filter_map(|value| CardConditions::parse(value).ok())
        .filter_map(|card| card.fingerprint_frequency)
        .map(|freq| freq.window_minutes)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{RuleAction, RuleScope};
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::HashMap;

    fn at(ts: DateTime<Utc>) -> TransactionView {
        TransactionView {
            amount: dec!(250.00),
            currency: "USD".into(),
            merchant_name: Some("SQ *Joe's Coffee 4821".into()),
            normalized_merchant_name: None,
            merchant_category_code: Some("5814".into()),
            country_code: Some("US".into()),
            payment_method: "card".into(),
            payment_token: Some("tkn_risky123".into()),
            card_brand: Some("visa".into()),
            expiry_month: Some(12),
            expiry_year: Some(2030),
            card_fingerprint: Some("fp_1".into()),
            timestamp: ts,
            now: ts,
            fingerprint_counts: HashMap::new(),
        }
    }

    fn view() -> TransactionView {
        // Wednesday
        at(Utc.with_ymd_and_hms(2025, 6, 18, 14, 30, 0).unwrap())
    }

    fn eval(kind: ConditionKind, value: Value, view: &TransactionView) -> Result<bool, ConditionError> {
        kind.evaluate(&value, view, &FuzzyMatcher::default())
    }

    #[test]
    fn test_registry_tags_round_trip() {
        for kind in ConditionKind::ALL {
            assert_eq!(ConditionKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ConditionKind::from_tag("amountOver"), None);
    }

    #[test]
    fn test_amount_comparisons() {
        let v = view();
        assert!(eval(ConditionKind::AmountGreaterThan, json!(100), &v).unwrap());
        assert!(!eval(ConditionKind::AmountGreaterThan, json!("250.00"), &v).unwrap());
        assert!(eval(ConditionKind::AmountGreaterThanOrEqual, json!("250"), &v).unwrap());
        assert!(eval(ConditionKind::AmountLessThan, json!(250.01), &v).unwrap());
        assert!(eval(ConditionKind::AmountLessThanOrEqual, json!(250), &v).unwrap());
        assert!(eval(ConditionKind::AmountBetween, json!({"min": 200, "max": "300"}), &v).unwrap());
        assert!(!eval(ConditionKind::AmountBetween, json!({"min": 251, "max": 300}), &v).unwrap());
    }

    #[test]
    fn test_malformed_values_are_errors() {
        let v = view();
        assert!(matches!(
            eval(ConditionKind::AmountGreaterThan, json!("lots"), &v),
            Err(ConditionError::InvalidValue { .. })
        ));
        assert!(eval(ConditionKind::AmountBetween, json!({"min": 5}), &v).is_err());
        assert!(eval(ConditionKind::AmountBetween, json!({"min": 9, "max": 5}), &v).is_err());
        assert!(eval(ConditionKind::Currencies, json!(5), &v).is_err());
        assert!(eval(ConditionKind::DaysOfWeek, json!([9]), &v).is_err());
        assert!(eval(ConditionKind::HourOfDay, json!({"start": 3, "end": 3}), &v).is_err());
    }

    #[test]
    fn test_membership() {
        let v = view();
        assert!(eval(ConditionKind::Currencies, json!(["usd", "EUR"]), &v).unwrap());
        assert!(eval(ConditionKind::Currencies, json!("USD"), &v).unwrap());
        assert!(eval(ConditionKind::MerchantCategories, json!(["5814"]), &v).unwrap());
        assert!(!eval(ConditionKind::ExcludedMerchantCategories, json!(["5814"]), &v).unwrap());
        assert!(eval(ConditionKind::Countries, json!(["US"]), &v).unwrap());
        assert!(eval(ConditionKind::ExcludedCountries, json!(["RU", "KP"]), &v).unwrap());
        assert!(eval(ConditionKind::PaymentMethods, json!(["card"]), &v).unwrap());

        let mut unknown_country = view();
        unknown_country.country_code = None;
        assert!(!eval(ConditionKind::Countries, json!(["US"]), &unknown_country).unwrap());
        assert!(eval(ConditionKind::ExcludedCountries, json!(["US"]), &unknown_country).unwrap());
    }

    #[test]
    fn test_days_and_hours() {
        let v = view();
        assert!(eval(ConditionKind::DaysOfWeek, json!([3]), &v).unwrap());
        assert!(eval(ConditionKind::DaysOfWeek, json!(["Wednesday", "sat"]), &v).unwrap());
        assert!(!eval(ConditionKind::DaysOfWeek, json!([0, 6]), &v).unwrap());

        assert!(eval(ConditionKind::HourOfDay, json!({"start": 9, "end": 17}), &v).unwrap());
        assert!(!eval(ConditionKind::HourOfDay, json!({"start": 15, "end": 17}), &v).unwrap());

        let night = at(Utc.with_ymd_and_hms(2025, 6, 18, 2, 0, 0).unwrap());
        let wrap = json!({"start": 22, "end": 6});
        assert!(eval(ConditionKind::HourOfDay, wrap.clone(), &night).unwrap());
        assert!(!eval(ConditionKind::HourOfDay, wrap, &v).unwrap());
    }

    #[test]
    fn test_merchant_name_fuzzy_and_enriched() {
        let v = view();
        assert!(eval(ConditionKind::MerchantName, json!("Joe's Coffee"), &v).unwrap());
        assert!(!eval(ConditionKind::MerchantName, json!("Shell Gas"), &v).unwrap());
        assert!(eval(ConditionKind::MerchantNameContains, json!("coffee"), &v).unwrap());

        let mut enriched = view();
        enriched.normalized_merchant_name = Some("Joe's Coffee".into());
        assert!(eval(ConditionKind::MerchantName, json!("joes coffee"), &enriched).unwrap());
        // exact once enriched: near-misses no longer match
        assert!(!eval(ConditionKind::MerchantName, json!("Joe's Cofee"), &enriched).unwrap());
        assert!(eval(ConditionKind::MerchantNameContains, json!("Coffee"), &enriched).unwrap());
    }

    #[test]
    fn test_card_block_or_and() {
        let v = view();
        let or_block = json!({"brands": ["mastercard"], "highRiskTokens": ["tkn_risky123"]});
        assert!(eval(ConditionKind::Card, or_block, &v).unwrap());

        let and_block = json!({
            "brands": ["mastercard"],
            "highRiskTokens": ["tkn_risky123"],
            "operator": "and"
        });
        assert!(!eval(ConditionKind::Card, and_block, &v).unwrap());

        assert!(!eval(ConditionKind::Card, json!({}), &v).unwrap());
        assert!(eval(ConditionKind::Card, json!({"brand": ["visa"]}), &v).is_err());
    }

    #[test]
    fn test_card_expiry_condition() {
        let june = at(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        let block = json!({"requireValidExpiry": true});

        let mut expired = june.clone();
        expired.expiry_month = Some(5);
        expired.expiry_year = Some(2025);
        assert!(eval(ConditionKind::Card, block.clone(), &expired).unwrap());

        let mut current = june.clone();
        current.expiry_month = Some(6);
        current.expiry_year = Some(2025);
        assert!(!eval(ConditionKind::Card, block.clone(), &current).unwrap());

        let mut missing = june;
        missing.expiry_month = None;
        assert!(eval(ConditionKind::Card, block, &missing).unwrap());
    }

    #[test]
    fn test_fingerprint_frequency_uses_precomputed_counts() {
        let block = json!({"fingerprintFrequency": {"maxCount": 3, "windowMinutes": 30}});

        let busy = view().with_fingerprint_count(30, 3);
        assert!(eval(ConditionKind::Card, block.clone(), &busy).unwrap());

        let quiet = view().with_fingerprint_count(30, 2);
        assert!(!eval(ConditionKind::Card, block.clone(), &quiet).unwrap());

        assert_eq!(
            eval(ConditionKind::Card, block, &view()),
            Err(ConditionError::MissingFingerprintCount(30))
        );
    }

    #[test]
    fn test_fingerprint_windows_collected_from_rules() {
        let mut conditions = serde_json::Map::new();
        conditions.insert(
            "card".into(),
            json!({"fingerprintFrequency": {"maxCount": 2, "windowMinutes": 15}}),
        );
        let rules = vec![
            Rule::new("fp", RuleAction::Review, 1, RuleScope::Global, conditions),
            Rule::new("plain", RuleAction::Decline, 2, RuleScope::Global, serde_json::Map::new()),
        ];
        assert_eq!(fingerprint_windows(&rules).into_iter().collect::<Vec<_>>(), vec![15]);
    }
}
