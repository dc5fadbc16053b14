//! Data models for authorization accounts

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Blocked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
            AccountStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "inactive" => Ok(AccountStatus::Inactive),
            "blocked" => Ok(AccountStatus::Blocked),
            other => Err(format!("unknown account status: {}", other)),
        }
    }
}

/// Just-in-time sweep configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepConfig {
    pub is_sweep_enabled: bool,
    pub sweep_account_id: Option<Uuid>,
}

/// Inclusive amount band considered normal for the account
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl AmountRange {
    pub fn contains(&self, amount: Decimal) -> bool {
        amount >= self.min && amount <= self.max
    }
}

/// Learned behavior used by the anomaly detector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorBaseline {
    #[serde(default)]
    pub usual_countries: Vec<String>,
    #[serde(default)]
    pub usual_merchant_categories: Vec<String>,
    #[serde(default)]
    pub usual_amount_range: Option<AmountRange>,
}

/// Account record
///
/// Balance only changes inside the fund transfer coordinator's locked
/// unit of work and never goes negative as a result of a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub account_id: Uuid,
    pub account_number: String,
    pub alias: Option<String>,
    pub balance: Decimal,
    pub currency: String,
    pub status: AccountStatus,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub baseline: BehaviorBaseline,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create an active account with an empty baseline
    pub fn new(account_number: impl Into<String>, balance: Decimal, currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            account_id: Uuid::new_v4(),
            account_number: account_number.into(),
            alias: None,
            balance,
            currency: currency.into(),
            status: AccountStatus::Active,
            sweep: SweepConfig::default(),
            baseline: BehaviorBaseline::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn has_sufficient_funds(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Account to sweep from, if sweeping is configured and enabled
    pub fn sweep_source(&self) -> Option<Uuid> {
        if self.sweep.is_sweep_enabled {
            self.sweep.sweep_account_id
        } else {
            None
        }
    }
}
