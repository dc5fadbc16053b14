//! Behavioral anomaly detection
//!
//! Six independent checks over an account's recent history. Every check
//! is fail-soft: a failure is recorded as a non-matching result and the
//! remaining checks still run.

pub mod detector;
pub mod stats;

pub use detector::AnomalyDetector;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Detector thresholds, fixed at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Transactions loaded as the behavioral baseline
    pub history_limit: usize,
    pub z_score_threshold: f64,
    pub min_amount_history: usize,
    pub min_category_history: usize,
    pub min_time_history: usize,
    /// Minimum share of history for a country to count as usual
    pub usual_country_share: f64,
    /// An hour-of-day below this share of history is unusual
    pub rare_hour_share: f64,
    pub card_velocity_count: u64,
    pub card_velocity_window_minutes: i64,
    pub account_velocity_count: u64,
    pub account_velocity_window_minutes: i64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            z_score_threshold: 3.0,
            min_amount_history: 3,
            min_category_history: 5,
            min_time_history: 10,
            usual_country_share: 0.10,
            rare_hour_share: 0.05,
            card_velocity_count: 3,
            card_velocity_window_minutes: 30,
            account_velocity_count: 5,
            account_velocity_window_minutes: 60,
        }
    }
}

#[derive(Error, Debug)]
pub enum AnomalyError {
    #[error("Transaction history unavailable: {0}")]
    History(#[from] StoreError),

    #[error("Amount {0} cannot be represented for statistics")]
    AmountOutOfRange(String),
}

impl AnomalyError {
    pub fn code(&self) -> &'static str {
        match self {
            AnomalyError::History(_) => "HISTORY_UNAVAILABLE",
            AnomalyError::AmountOutOfRange(_) => "AMOUNT_OUT_OF_RANGE",
        }
    }
}

/// Identifies one detector check in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnomalyCheck {
    NewPaymentMethod,
    Amount,
    MerchantCategory,
    Location,
    TimeOfDay,
    VelocityCard,
    VelocityAccount,
}

impl AnomalyCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyCheck::NewPaymentMethod => "new_payment_method",
            AnomalyCheck::Amount => "amount",
            AnomalyCheck::MerchantCategory => "merchant_category",
            AnomalyCheck::Location => "location",
            AnomalyCheck::TimeOfDay => "time_of_day",
            AnomalyCheck::VelocityCard => "velocity_card",
            AnomalyCheck::VelocityAccount => "velocity_account",
        }
    }

    /// `anomaly:<check>`
    pub fn rule_id(&self) -> String {
        format!("anomaly:{}", self.as_str())
    }

    pub fn description(&self) -> &'static str {
        match self {
            AnomalyCheck::NewPaymentMethod => "New payment method",
            AnomalyCheck::Amount => "Unusual amount",
            AnomalyCheck::MerchantCategory => "New merchant category",
            AnomalyCheck::Location => "Unusual location",
            AnomalyCheck::TimeOfDay => "Unusual time of day",
            AnomalyCheck::VelocityCard => "Card velocity",
            AnomalyCheck::VelocityAccount => "Account velocity",
        }
    }
}
