//! Anomaly detector
//!
//! | Check | Flags when |
//! |---|---|
//! | new payment method | card unseen in history that has prior card use |
//! | amount | z-score above threshold (≥3 history) or above usual range |
//! | merchant category | MCC outside history ∪ usual categories (≥5 history) |
//! | location | country outside usual (stored or ≥10% of history) |
//! | time of day | hour seen in <5% of history (≥10 history) |
//! | velocity | ≥3 card uses in 30 min, or ≥5 account uses in 60 min |
//!
//! History never includes the transaction being decided.

use chrono::{Duration, Timelike};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::stats;
use super::{AnomalyCheck, AnomalyConfig, AnomalyError};
use crate::account::Account;
use crate::rules::{RuleAction, RuleResult};
use crate::store::TransactionStore;
use crate::transaction::{Transaction, TransactionFilter};

/// Anomaly results sort after every stored rule
pub const ANOMALY_PRIORITY: i32 = i32::MAX;

type CheckOutcome = Result<Option<Value>, AnomalyError>;
type HistoryCheck = fn(&AnomalyDetector, &Transaction, &Account, &[Transaction]) -> CheckOutcome;

pub struct AnomalyDetector {
    transactions: Arc<dyn TransactionStore>,
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(transactions: Arc<dyn TransactionStore>, config: AnomalyConfig) -> Self {
        Self {
            transactions,
            config,
        }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Run every check. Never fails; at worst returns no results.
    pub async fn detect(&self, tx: &Transaction, account: &Account) -> Vec<RuleResult> {
        let history = match self
            .transactions
            .find_recent_by_account(
                tx.account_id,
                self.config.history_limit,
                Some(tx.transaction_id),
                Some(tx.created_at),
            )
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(
                    transaction_id = %tx.transaction_id,
                    code = e.code(),
                    error = %e,
                    "History unavailable, anomaly baselines skipped"
                );
                Vec::new()
            }
        };

        let history_checks: [(AnomalyCheck, HistoryCheck); 5] = [
            (AnomalyCheck::NewPaymentMethod, Self::check_new_payment_method),
            (AnomalyCheck::Amount, Self::check_amount),
            (AnomalyCheck::MerchantCategory, Self::check_merchant_category),
            (AnomalyCheck::Location, Self::check_location),
            (AnomalyCheck::TimeOfDay, Self::check_time_of_day),
        ];

        let mut results = Vec::new();
        for (check, run) in history_checks {
            let started = Instant::now();
            let outcome = run(self, tx, account, &history);
            record(&mut results, tx, check, outcome, started);
        }

        let started = Instant::now();
        let outcome = self.check_card_velocity(tx).await;
        record(&mut results, tx, AnomalyCheck::VelocityCard, outcome, started);

        let started = Instant::now();
        let outcome = self.check_account_velocity(tx).await;
        record(&mut results, tx, AnomalyCheck::VelocityAccount, outcome, started);

        debug!(
            transaction_id = %tx.transaction_id,
            history = history.len(),
            flagged = results.iter().filter(|r| r.matched).count(),
            "Anomaly detection complete"
        );
        results
    }

    fn check_new_payment_method(
        &self,
        tx: &Transaction,
        _account: &Account,
        history: &[Transaction],
    ) -> CheckOutcome {
        if tx.card_fingerprint.is_none() && tx.payment_token.is_none() {
            return Ok(None);
        }
        let prior_cards: Vec<&Transaction> = history.iter().filter(|h| h.is_card_payment()).collect();
        if prior_cards.is_empty() {
            return Ok(None);
        }

        let seen = prior_cards.iter().any(|h| {
            let same_fingerprint = tx.card_fingerprint.is_some() && h.card_fingerprint == tx.card_fingerprint;
            let same_token = tx.payment_token.is_some() && h.payment_token == tx.payment_token;
            same_fingerprint || same_token
        });

        Ok((!seen).then(|| json!({ "priorCardTransactions": prior_cards.len() })))
    }

    fn check_amount(&self, tx: &Transaction, account: &Account, history: &[Transaction]) -> CheckOutcome {
        if history.len() >= self.config.min_amount_history {
            let amount = to_f64(tx.amount)?;
            let sample = history
                .iter()
                .map(|h| to_f64(h.amount))
                .collect::<Result<Vec<_>, _>>()?;

            return Ok(stats::z_score(amount, &sample)
                .filter(|z| *z > self.config.z_score_threshold)
                .map(|z| {
                    json!({
                        "zScore": z,
                        "mean": stats::mean(&sample),
                        "stdDev": stats::population_std_dev(&sample),
                        "threshold": self.config.z_score_threshold,
                    })
                }));
        }

        Ok(account
            .baseline
            .usual_amount_range
            .filter(|range| tx.amount > range.max)
            .map(|range| json!({ "usualMax": range.max.to_string(), "amount": tx.amount.to_string() })))
    }

    fn check_merchant_category(
        &self,
        tx: &Transaction,
        account: &Account,
        history: &[Transaction],
    ) -> CheckOutcome {
        if history.len() < self.config.min_category_history {
            return Ok(None);
        }
        let Some(mcc) = tx.effective_merchant_category() else {
            return Ok(None);
        };

        let known: HashSet<&str> = history
            .iter()
            .filter_map(|h| h.effective_merchant_category())
            .chain(account.baseline.usual_merchant_categories.iter().map(String::as_str))
            .collect();

        Ok((!known.contains(mcc)).then(|| json!({ "merchantCategoryCode": mcc, "knownCategories": known.len() })))
    }

    fn check_location(&self, tx: &Transaction, account: &Account, history: &[Transaction]) -> CheckOutcome {
        let Some(country) = tx.effective_country() else {
            return Ok(None);
        };

        let usual: HashSet<String> = if account.baseline.usual_countries.is_empty() {
            self.inferred_usual_countries(history)
        } else {
            account
                .baseline
                .usual_countries
                .iter()
                .map(|c| c.to_ascii_uppercase())
                .collect()
        };
        if usual.is_empty() {
            return Ok(None);
        }

        let country = country.to_ascii_uppercase();
        let mut usual_list: Vec<&String> = usual.iter().collect();
        usual_list.sort();
        Ok((!usual.contains(&country)).then(|| json!({ "country": country, "usualCountries": usual_list })))
    }

    /// Countries making up at least `usual_country_share` of history
    fn inferred_usual_countries(&self, history: &[Transaction]) -> HashSet<String> {
        if history.is_empty() {
            return HashSet::new();
        }
        let mut counts: HashMap<String, usize> = HashMap::new();
        for country in history.iter().filter_map(|h| h.effective_country()) {
            *counts.entry(country.to_ascii_uppercase()).or_default() += 1;
        }
        let total = history.len() as f64;
        counts
            .into_iter()
            .filter(|(_, n)| *n as f64 / total >= self.config.usual_country_share)
            .map(|(country, _)| country)
            .collect()
    }

    fn check_time_of_day(&self, tx: &Transaction, _account: &Account, history: &[Transaction]) -> CheckOutcome {
        if history.len() < self.config.min_time_history {
            return Ok(None);
        }
        let hour = tx.created_at.hour();
        let same_hour = history.iter().filter(|h| h.created_at.hour() == hour).count();
        let share = same_hour as f64 / history.len() as f64;

        Ok((share < self.config.rare_hour_share).then(|| json!({ "hour": hour, "share": share })))
    }

    async fn check_card_velocity(&self, tx: &Transaction) -> CheckOutcome {
        let Some(fingerprint) = tx.card_fingerprint.clone() else {
            return Ok(None);
        };
        let window = self.config.card_velocity_window_minutes;
        let filter = TransactionFilter {
            card_fingerprint: Some(fingerprint),
            exclude_transaction_id: Some(tx.transaction_id),
            ..Default::default()
        }
        .window_ending_at(tx.created_at, Duration::minutes(window));
        let count = self.transactions.count(&filter).await?;
        Ok((count >= self.config.card_velocity_count).then(|| {
            json!({ "count": count, "windowMinutes": window, "threshold": self.config.card_velocity_count })
        }))
    }

    async fn check_account_velocity(&self, tx: &Transaction) -> CheckOutcome {
        let window = self.config.account_velocity_window_minutes;
        let filter = TransactionFilter {
            account_id: Some(tx.account_id),
            exclude_transaction_id: Some(tx.transaction_id),
            ..Default::default()
        }
        .window_ending_at(tx.created_at, Duration::minutes(window));
        let count = self.transactions.count(&filter).await?;
        Ok((count >= self.config.account_velocity_count).then(|| {
            json!({ "count": count, "windowMinutes": window, "threshold": self.config.account_velocity_count })
        }))
    }
}

fn to_f64(amount: Decimal) -> Result<f64, AnomalyError> {
    amount
        .to_f64()
        .ok_or_else(|| AnomalyError::AmountOutOfRange(amount.to_string()))
}

fn record(
    results: &mut Vec<RuleResult>,
    tx: &Transaction,
    check: AnomalyCheck,
    outcome: CheckOutcome,
    started: Instant,
) {
    let evaluation_time_us = started.elapsed().as_micros() as u64;
    let result = |matched: bool, conditions: Value, error: Option<String>| RuleResult {
        rule_id: check.rule_id(),
        rule_name: check.description().to_string(),
        action: RuleAction::Review,
        priority: ANOMALY_PRIORITY,
        matched,
        conditions,
        evaluation_time_us,
        error,
    };

    match outcome {
        Ok(Some(evidence)) => {
            debug!(transaction_id = %tx.transaction_id, check = check.as_str(), "Anomaly flagged");
            results.push(result(true, evidence, None));
        }
        Ok(None) => {}
        Err(e) => {
            warn!(
                transaction_id = %tx.transaction_id,
                check = check.as_str(),
                code = e.code(),
                error = %e,
                "Anomaly check failed, treating as not matched"
            );
            results.push(result(false, Value::Null, Some(e.to_string())));
        }
    }
}
