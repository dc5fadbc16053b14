//! Transaction record and status state machine
//!
//! ```text
//! PENDING ──▶ APPROVED
//!    │
//!    ├──────▶ DECLINED
//!    │
//!    └──────▶ FAILED
//! ```
//!
//! Every terminal status is final. The only later mutation allowed is the
//! retention redaction of card fields, which never touches `status`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::enrichment::EnrichedData;
use crate::rules::RuleResult;

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Declined,
    Failed,
}

impl TransactionStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Approved => "approved",
            TransactionStatus::Declined => "declined",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "approved" => Ok(TransactionStatus::Approved),
            "declined" => Ok(TransactionStatus::Declined),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransactionError {
    #[error("Transaction {0} already has terminal status {1}")]
    AlreadyTerminal(Uuid, TransactionStatus),

    #[error("Cannot finalize transaction into non-terminal status")]
    NotTerminal,
}

/// Unit of decisioning.
///
/// Card data is only ever held in tokenized form: token, brand, last 4,
/// expiry and a one-way fingerprint. The PAN never reaches this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub external_id: String,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub merchant_name: Option<String>,
    pub merchant_id: Option<String>,
    pub merchant_category_code: Option<String>,
    pub location: Option<String>,
    pub country_code: Option<String>,
    pub payment_method: String,
    pub payment_token: Option<String>,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub expiry_month: Option<u32>,
    pub expiry_year: Option<i32>,
    pub card_fingerprint: Option<String>,
    /// Sanitized caller metadata
    pub metadata: Value,
    pub enriched_data: Option<EnrichedData>,
    pub status: TransactionStatus,
    pub decline_reason: Option<String>,
    pub applied_rules: Vec<RuleResult>,
    pub processing_time_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// New pending transaction with no merchant or card details
    pub fn pending(
        external_id: impl Into<String>,
        account_id: Uuid,
        amount: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            transaction_id: Uuid::new_v4(),
            external_id: external_id.into(),
            account_id,
            amount,
            currency: currency.into(),
            merchant_name: None,
            merchant_id: None,
            merchant_category_code: None,
            location: None,
            country_code: None,
            payment_method: "card".to_string(),
            payment_token: None,
            card_brand: None,
            card_last4: None,
            expiry_month: None,
            expiry_year: None,
            card_fingerprint: None,
            metadata: Value::Object(Default::default()),
            enriched_data: None,
            status: TransactionStatus::Pending,
            decline_reason: None,
            applied_rules: Vec::new(),
            processing_time_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_card_payment(&self) -> bool {
        self.payment_method.eq_ignore_ascii_case("card")
    }

    /// MCC as submitted, else as enriched
    pub fn effective_merchant_category(&self) -> Option<&str> {
        self.merchant_category_code.as_deref().or_else(|| {
            self.enriched_data
                .as_ref()
                .and_then(|e| e.merchant_category_code.as_deref())
        })
    }

    /// Country as submitted, else the enriched merchant country
    pub fn effective_country(&self) -> Option<&str> {
        self.country_code.as_deref().or_else(|| {
            self.enriched_data
                .as_ref()
                .and_then(|e| e.merchant_country.as_deref())
        })
    }

    /// Move a pending transaction into its terminal status.
    ///
    /// Rejects the transition if a terminal status has already been set.
    pub fn finalize(
        &mut self,
        status: TransactionStatus,
        decline_reason: Option<String>,
        processing_time_ms: u64,
    ) -> Result<(), TransactionError> {
        if self.status.is_terminal() {
            return Err(TransactionError::AlreadyTerminal(
                self.transaction_id,
                self.status,
            ));
        }
        if !status.is_terminal() {
            return Err(TransactionError::NotTerminal);
        }

        self.status = status;
        self.decline_reason = decline_reason;
        self.processing_time_ms = Some(processing_time_ms);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Null out card fields after the retention window. Status is untouched.
    pub fn redact_card_fields(&mut self) {
        self.payment_token = None;
        self.card_last4 = None;
        self.expiry_month = None;
        self.expiry_year = None;
        self.card_fingerprint = None;
        self.updated_at = Utc::now();
    }
}

/// Filter for velocity counting
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_id: Option<Uuid>,
    pub card_fingerprint: Option<String>,
    /// Only transactions created at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only transactions created at or before this instant
    pub until: Option<DateTime<Utc>>,
    /// Transaction being decided, left out of its own count
    pub exclude_transaction_id: Option<Uuid>,
}

impl TransactionFilter {
    /// Bound the filter to `[end - window, end]`
    pub fn window_ending_at(self, end: DateTime<Utc>, window: chrono::Duration) -> Self {
        Self {
            since: Some(end - window),
            until: Some(end),
            ..self
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        if self
            .account_id
            .is_some_and(|account_id| tx.account_id != account_id)
        {
            return false;
        }
        if let Some(fp) = &self.card_fingerprint
            && tx.card_fingerprint.as_deref() != Some(fp.as_str())
        {
            return false;
        }
        if self.since.is_some_and(|since| tx.created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| tx.created_at > until) {
            return false;
        }
        if self.exclude_transaction_id == Some(tx.transaction_id) {
            return false;
        }
        true
    }
}
