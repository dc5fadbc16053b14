//! PostgreSQL account repository
//!
//! Balance transfers run inside one database transaction per
//! [`PgTransferUnit`]; rows are locked with `SELECT ... FOR UPDATE`.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres};
use std::collections::HashSet;
use uuid::Uuid;

use super::models::{Account, AccountStatus, AmountRange, BehaviorBaseline, SweepConfig};
use crate::db::SafeRow;
use crate::store::{AccountStore, StoreError, TransferUnit};

const ACCOUNT_COLUMNS: &str = "account_id, account_number, alias, balance, currency, status, \
     is_sweep_enabled, sweep_account_id, usual_countries, usual_merchant_categories, \
     usual_amount_min, usual_amount_max, created_at, updated_at";

pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE {} = $1",
            ACCOUNT_COLUMNS, column
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let account_id: Uuid = row.get_required("account_id")?;
    let status: String = row.get_required("status")?;
    let usual_min: Option<Decimal> = row.get_required("usual_amount_min")?;
    let usual_max: Option<Decimal> = row.get_required("usual_amount_max")?;
    let currency: String = row.get_required("currency")?;

    Ok(Account {
        account_id,
        account_number: row.get_required("account_number")?,
        alias: row.get_required("alias")?,
        balance: row.get_required("balance")?,
        currency: currency.trim().to_string(),
        status: status
            .parse::<AccountStatus>()
            .map_err(|e| StoreError::Corrupt(format!("account {}: {}", account_id, e)))?,
        sweep: SweepConfig {
            is_sweep_enabled: row.get_required("is_sweep_enabled")?,
            sweep_account_id: row.get_required("sweep_account_id")?,
        },
        baseline: BehaviorBaseline {
            usual_countries: row.get_required("usual_countries")?,
            usual_merchant_categories: row.get_required("usual_merchant_categories")?,
            usual_amount_range: match (usual_min, usual_max) {
                (Some(min), Some(max)) => Some(AmountRange { min, max }),
                _ => None,
            },
        },
        created_at: row.get_required("created_at")?,
        updated_at: row.get_required("updated_at")?,
    })
}

#[async_trait]
impl AccountStore for PgAccountRepository {
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE account_id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Account>, StoreError> {
        self.find_one("alias", alias).await
    }

    async fn find_by_account_number(
        &self,
        account_number: &str,
    ) -> Result<Option<Account>, StoreError> {
        self.find_one("account_number", account_number).await
    }

    async fn save(&self, account: &Account) -> Result<(), StoreError> {
        let range = account.baseline.usual_amount_range;
        sqlx::query(
            r#"INSERT INTO accounts (account_id, account_number, alias, balance, currency, status,
                                     is_sweep_enabled, sweep_account_id, usual_countries,
                                     usual_merchant_categories, usual_amount_min, usual_amount_max,
                                     created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
               ON CONFLICT (account_id) DO UPDATE SET
                   account_number = EXCLUDED.account_number,
                   alias = EXCLUDED.alias,
                   balance = EXCLUDED.balance,
                   currency = EXCLUDED.currency,
                   status = EXCLUDED.status,
                   is_sweep_enabled = EXCLUDED.is_sweep_enabled,
                   sweep_account_id = EXCLUDED.sweep_account_id,
                   usual_countries = EXCLUDED.usual_countries,
                   usual_merchant_categories = EXCLUDED.usual_merchant_categories,
                   usual_amount_min = EXCLUDED.usual_amount_min,
                   usual_amount_max = EXCLUDED.usual_amount_max,
                   updated_at = EXCLUDED.updated_at"#,
        )
        .bind(account.account_id)
        .bind(&account.account_number)
        .bind(&account.alias)
        .bind(account.balance)
        .bind(&account.currency)
        .bind(account.status.as_str())
        .bind(account.sweep.is_sweep_enabled)
        .bind(account.sweep.sweep_account_id)
        .bind(&account.baseline.usual_countries)
        .bind(&account.baseline.usual_merchant_categories)
        .bind(range.map(|r| r.min))
        .bind(range.map(|r| r.max))
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn begin_transfer(&self) -> Result<Box<dyn TransferUnit>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransferUnit {
            tx,
            locked: HashSet::new(),
        }))
    }
}

/// One database transaction. Dropping it without `commit` rolls back.
pub struct PgTransferUnit {
    tx: sqlx::Transaction<'static, Postgres>,
    locked: HashSet<Uuid>,
}

#[async_trait]
impl TransferUnit for PgTransferUnit {
    async fn lock_account(&mut self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE account_id = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let account = row.as_ref().map(account_from_row).transpose()?;
        if account.is_some() {
            self.locked.insert(account_id);
        }
        Ok(account)
    }

    async fn set_balance(&mut self, account_id: Uuid, balance: Decimal) -> Result<(), StoreError> {
        if !self.locked.contains(&account_id) {
            return Err(StoreError::NotLocked(account_id));
        }
        sqlx::query("UPDATE accounts SET balance = $1, updated_at = NOW() WHERE account_id = $2")
            .bind(balance)
            .bind(account_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
