//! Flattened, read-only view of a transaction for condition evaluation
//!
//! Everything a predicate may look at is copied in here up front,
//! including store-derived counts, so the evaluator never performs I/O.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::transaction::Transaction;

#[derive(Debug, Clone)]
pub struct TransactionView {
    pub amount: Decimal,
    pub currency: String,
    pub merchant_name: Option<String>,
    /// Canonical name from enrichment; disables fuzzy matching when set
    pub normalized_merchant_name: Option<String>,
    pub merchant_category_code: Option<String>,
    pub country_code: Option<String>,
    pub payment_method: String,
    pub payment_token: Option<String>,
    pub card_brand: Option<String>,
    pub expiry_month: Option<u32>,
    pub expiry_year: Option<i32>,
    pub card_fingerprint: Option<String>,
    /// Transaction time (weekday / hour predicates)
    pub timestamp: DateTime<Utc>,
    /// Evaluation time (card expiry)
    pub now: DateTime<Utc>,
    /// Prior uses of the card fingerprint, keyed by window length in minutes
    pub fingerprint_counts: HashMap<u32, u64>,
}

impl TransactionView {
    /// Flatten a transaction, preferring its own fields over enriched ones
    pub fn from_transaction(tx: &Transaction, now: DateTime<Utc>) -> Self {
        Self {
            amount: tx.amount,
            currency: tx.currency.clone(),
            merchant_name: tx.merchant_name.clone(),
            normalized_merchant_name: tx
                .enriched_data
                .as_ref()
                .and_then(|e| e.normalized_merchant_name.clone()),
            merchant_category_code: tx.effective_merchant_category().map(str::to_string),
            country_code: tx.effective_country().map(str::to_string),
            payment_method: tx.payment_method.clone(),
            payment_token: tx.payment_token.clone(),
            card_brand: tx.card_brand.clone(),
            expiry_month: tx.expiry_month,
            expiry_year: tx.expiry_year,
            card_fingerprint: tx.card_fingerprint.clone(),
            timestamp: tx.created_at,
            now,
            fingerprint_counts: HashMap::new(),
        }
    }

    pub fn with_fingerprint_count(mut self, window_minutes: u32, count: u64) -> Self {
        self.fingerprint_counts.insert(window_minutes, count);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::EnrichedData;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_enrichment_fills_gaps_only() {
        let mut tx = Transaction::pending("e", Uuid::new_v4(), dec!(12.5), "USD");
        tx.merchant_category_code = Some("5411".into());
        tx.enriched_data = Some(EnrichedData {
            normalized_merchant_name: Some("Whole Foods".into()),
            merchant_category_code: Some("5999".into()),
            merchant_country: Some("US".into()),
            merchant_risk_score: None,
            source: "test".into(),
        });

        let view = TransactionView::from_transaction(&tx, Utc::now());
        assert_eq!(view.merchant_category_code.as_deref(), Some("5411"));
        assert_eq!(view.country_code.as_deref(), Some("US"));
        assert_eq!(view.normalized_merchant_name.as_deref(), Some("Whole Foods"));
    }
}
