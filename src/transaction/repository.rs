//! PostgreSQL transaction repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use super::models::{Transaction, TransactionFilter, TransactionStatus};
use crate::db::SafeRow;
use crate::store::{StoreError, TransactionStore};

const TRANSACTION_COLUMNS: &str = "transaction_id, external_id, account_id, amount, currency, \
     merchant_name, merchant_id, merchant_category_code, location, country_code, payment_method, \
     payment_token, card_brand, card_last4, expiry_month, expiry_year, card_fingerprint, metadata, \
     enriched_data, status, decline_reason, applied_rules, processing_time_ms, created_at, updated_at";

pub struct PgTransactionRepository {
    pool: PgPool,
}

impl PgTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction, StoreError> {
    let transaction_id: Uuid = row.get_required("transaction_id")?;
    let status: String = row.get_required("status")?;
    let currency: String = row.get_required("currency")?;
    let expiry_month: Option<i32> = row.get_required("expiry_month")?;
    let processing_time_ms: Option<i64> = row.get_required("processing_time_ms")?;
    let enriched_data: Option<Value> = row.get_required("enriched_data")?;
    let applied_rules: Value = row.get_required("applied_rules")?;

    Ok(Transaction {
        transaction_id,
        external_id: row.get_required("external_id")?,
        account_id: row.get_required("account_id")?,
        amount: row.get_required("amount")?,
        currency: currency.trim().to_string(),
        merchant_name: row.get_required("merchant_name")?,
        merchant_id: row.get_required("merchant_id")?,
        merchant_category_code: row.get_required("merchant_category_code")?,
        location: row.get_required("location")?,
        country_code: row.get_required("country_code")?,
        payment_method: row.get_required("payment_method")?,
        payment_token: row.get_required("payment_token")?,
        card_brand: row.get_required("card_brand")?,
        card_last4: row.get_required("card_last4")?,
        expiry_month: expiry_month.and_then(|m| u32::try_from(m).ok()),
        expiry_year: row.get_required("expiry_year")?,
        card_fingerprint: row.get_required("card_fingerprint")?,
        metadata: row.get_required("metadata")?,
        enriched_data: enriched_data.map(serde_json::from_value).transpose()?,
        status: status
            .parse::<TransactionStatus>()
            .map_err(|e| StoreError::Corrupt(format!("transaction {}: {}", transaction_id, e)))?,
        decline_reason: row.get_required("decline_reason")?,
        applied_rules: serde_json::from_value(applied_rules)?,
        processing_time_ms: processing_time_ms.and_then(|ms| u64::try_from(ms).ok()),
        created_at: row.get_required("created_at")?,
        updated_at: row.get_required("updated_at")?,
    })
}

#[async_trait]
impl TransactionStore for PgTransactionRepository {
    async fn create(&self, tx: &Transaction) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO transactions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, \
             $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)",
            TRANSACTION_COLUMNS
        ))
        .bind(tx.transaction_id)
        .bind(&tx.external_id)
        .bind(tx.account_id)
        .bind(tx.amount)
        .bind(&tx.currency)
        .bind(&tx.merchant_name)
        .bind(&tx.merchant_id)
        .bind(&tx.merchant_category_code)
        .bind(&tx.location)
        .bind(&tx.country_code)
        .bind(&tx.payment_method)
        .bind(&tx.payment_token)
        .bind(&tx.card_brand)
        .bind(&tx.card_last4)
        .bind(tx.expiry_month.map(|m| m as i32))
        .bind(tx.expiry_year)
        .bind(&tx.card_fingerprint)
        .bind(&tx.metadata)
        .bind(tx.enriched_data.as_ref().map(serde_json::to_value).transpose()?)
        .bind(tx.status.as_str())
        .bind(&tx.decline_reason)
        .bind(serde_json::to_value(&tx.applied_rules)?)
        .bind(tx.processing_time_ms.map(|ms| ms as i64))
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save(&self, tx: &Transaction) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE transactions SET
                   merchant_name = $2, merchant_category_code = $3, country_code = $4,
                   payment_token = $5, card_brand = $6, card_last4 = $7,
                   expiry_month = $8, expiry_year = $9, card_fingerprint = $10,
                   metadata = $11, enriched_data = $12, status = $13, decline_reason = $14,
                   applied_rules = $15, processing_time_ms = $16, updated_at = $17
               WHERE transaction_id = $1"#,
        )
        .bind(tx.transaction_id)
        .bind(&tx.merchant_name)
        .bind(&tx.merchant_category_code)
        .bind(&tx.country_code)
        .bind(&tx.payment_token)
        .bind(&tx.card_brand)
        .bind(&tx.card_last4)
        .bind(tx.expiry_month.map(|m| m as i32))
        .bind(tx.expiry_year)
        .bind(&tx.card_fingerprint)
        .bind(&tx.metadata)
        .bind(tx.enriched_data.as_ref().map(serde_json::to_value).transpose()?)
        .bind(tx.status.as_str())
        .bind(&tx.decline_reason)
        .bind(serde_json::to_value(&tx.applied_rules)?)
        .bind(tx.processing_time_ms.map(|ms| ms as i64))
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(tx.transaction_id.to_string()));
        }
        Ok(())
    }

    async fn find_by_id(&self, transaction_id: Uuid) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE transaction_id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn count(&self, filter: &TransactionFilter) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM transactions
               WHERE ($1::uuid IS NULL OR account_id = $1)
                 AND ($2::text IS NULL OR card_fingerprint = $2)
                 AND ($3::timestamptz IS NULL OR created_at >= $3)
                 AND ($4::uuid IS NULL OR transaction_id <> $4)
                 AND ($5::timestamptz IS NULL OR created_at <= $5)"#,
        )
        .bind(filter.account_id)
        .bind(&filter.card_fingerprint)
        .bind(filter.since)
        .bind(filter.exclude_transaction_id)
        .bind(filter.until)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn find_recent_by_account(
        &self,
        account_id: Uuid,
        limit: usize,
        exclude_transaction_id: Option<Uuid>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions
             WHERE account_id = $1 AND ($2::uuid IS NULL OR transaction_id <> $2)
               AND ($4::timestamptz IS NULL OR created_at <= $4)
             ORDER BY created_at DESC
             LIMIT $3",
            TRANSACTION_COLUMNS
        ))
        .bind(account_id)
        .bind(exclude_transaction_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, PgAccountRepository};
    use crate::db::Database;
    use crate::store::AccountStore;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;

    async fn setup() -> (PgTransactionRepository, Account) {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let db = Database::connect(&url).await.expect("Failed to connect");
        db.apply_schema().await.expect("schema");

        let account = Account::new(format!("PG-TX-{}", Uuid::new_v4()), dec!(100), "USD");
        PgAccountRepository::new(db.pool().clone())
            .save(&account)
            .await
            .unwrap();
        (PgTransactionRepository::new(db.pool().clone()), account)
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_create_finalize_and_reload() {
        let (repo, account) = setup().await;
        let mut tx = Transaction::pending("ext-pg-1", account.account_id, dec!(12.34), "USD");
        tx.metadata = json!({"orderRef": "A-1"});
        repo.create(&tx).await.unwrap();

        tx.finalize(TransactionStatus::Declined, Some("insufficient_funds".into()), 7)
            .unwrap();
        repo.save(&tx).await.unwrap();

        let loaded = repo.find_by_id(tx.transaction_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TransactionStatus::Declined);
        assert_eq!(loaded.decline_reason.as_deref(), Some("insufficient_funds"));
        assert_eq!(loaded.amount, dec!(12.34));
        assert_eq!(loaded.metadata, json!({"orderRef": "A-1"}));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_velocity_count_and_recent_history() {
        let (repo, account) = setup().await;
        let fingerprint = format!("fp-{}", Uuid::new_v4());

        let mut ids = Vec::new();
        for minutes_ago in [5, 10, 90] {
            let mut tx = Transaction::pending("ext", account.account_id, dec!(5), "USD");
            tx.card_fingerprint = Some(fingerprint.clone());
            tx.created_at = Utc::now() - Duration::minutes(minutes_ago);
            repo.create(&tx).await.unwrap();
            ids.push(tx.transaction_id);
        }

        let filter = TransactionFilter {
            card_fingerprint: Some(fingerprint.clone()),
            since: Some(Utc::now() - Duration::minutes(30)),
            exclude_transaction_id: Some(ids[0]),
            ..Default::default()
        };
        assert_eq!(repo.count(&filter).await.unwrap(), 1);

        // Window ending 8 minutes ago: only the 10-minute-old one is inside
        let anchored = TransactionFilter {
            card_fingerprint: Some(fingerprint.clone()),
            ..Default::default()
        }
        .window_ending_at(Utc::now() - Duration::minutes(8), Duration::minutes(30));
        assert_eq!(repo.count(&anchored).await.unwrap(), 1);

        let recent = repo
            .find_recent_by_account(account.account_id, 2, None, None)
            .await
            .unwrap();
        assert_eq!(
            recent.iter().map(|t| t.transaction_id).collect::<Vec<_>>(),
            vec![ids[0], ids[1]]
        );

        let before = repo
            .find_recent_by_account(
                account.account_id,
                5,
                None,
                Some(Utc::now() - Duration::minutes(8)),
            )
            .await
            .unwrap();
        assert_eq!(
            before.iter().map(|t| t.transaction_id).collect::<Vec<_>>(),
            vec![ids[1], ids[2]]
        );
    }
}
