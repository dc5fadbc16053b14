//! Storage contracts consumed by the authorization core
//!
//! Records are independent and joined by id lookup: accounts, rules and
//! transactions never hold references to one another.
//!
//! Two implementations ship with the crate:
//! - PostgreSQL repositories (`account::repository`, `rules::repository`,
//!   `transaction::repository`)
//! - in-memory stores ([`memory`]) used by tests and local runs, seeded
//!   from [`fixtures`]

pub mod fixtures;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::account::Account;
use crate::rules::Rule;
use crate::transaction::{Transaction, TransactionFilter};

pub use fixtures::{FixtureError, Fixtures};
pub use memory::{InMemoryAccountStore, InMemoryRuleStore, InMemoryTransactionStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Account {0} is not locked in this unit of work")]
    NotLocked(Uuid),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::Serialization(_) => "SERIALIZATION_ERROR",
            StoreError::Corrupt(_) => "CORRUPT_RECORD",
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::NotLocked(_) => "NOT_LOCKED",
        }
    }
}

/// Store handles shared by the authorization pipeline
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub rules: Arc<dyn RuleStore>,
    pub transactions: Arc<dyn TransactionStore>,
}

/// Account storage
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Lookup by prefixed alias (e.g. `acct_payroll`)
    async fn find_by_alias(&self, alias: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_account_number(
        &self,
        account_number: &str,
    ) -> Result<Option<Account>, StoreError>;

    /// Insert or replace an account record
    async fn save(&self, account: &Account) -> Result<(), StoreError>;

    /// Open a unit of work for a balance transfer.
    ///
    /// Dropping the unit without committing discards every staged change
    /// and releases its locks.
    async fn begin_transfer(&self) -> Result<Box<dyn TransferUnit>, StoreError>;
}

/// Exclusive-write unit of work over account balances
#[async_trait]
pub trait TransferUnit: Send {
    /// Take the row lock for `account_id` and read the locked row.
    ///
    /// Blocks while another unit holds the same row. Callers locking more
    /// than one account must do so in a canonical order.
    async fn lock_account(&mut self, account_id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Stage a new balance for an account locked by this unit
    async fn set_balance(&mut self, account_id: Uuid, balance: Decimal) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Rule storage (read-only from the core's perspective)
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Active rules bound to one account
    async fn find_active_by_account(&self, account_id: Uuid) -> Result<Vec<Rule>, StoreError>;

    /// Active global rules ordered by ascending priority
    async fn find_active_global(&self) -> Result<Vec<Rule>, StoreError>;
}

/// Transaction storage
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn create(&self, transaction: &Transaction) -> Result<(), StoreError>;

    async fn save(&self, transaction: &Transaction) -> Result<(), StoreError>;

    async fn find_by_id(&self, transaction_id: Uuid) -> Result<Option<Transaction>, StoreError>;

    /// Count transactions matching a filter (velocity checks)
    async fn count(&self, filter: &TransactionFilter) -> Result<u64, StoreError>;

    /// Most recent transactions for an account created at or before
    /// `until`, newest first
    async fn find_recent_by_account(
        &self,
        account_id: Uuid,
        limit: usize,
        exclude_transaction_id: Option<Uuid>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>, StoreError>;
}
