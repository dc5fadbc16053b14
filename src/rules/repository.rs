//! PostgreSQL rule repository

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use super::models::{Rule, RuleAction, RuleScope};
use crate::db::SafeRow;
use crate::store::{RuleStore, StoreError};

const RULE_COLUMNS: &str =
    "rule_id, name, action, priority, account_id, conditions, is_active, created_at, updated_at";

pub struct PgRuleRepository {
    pool: PgPool,
}

impl PgRuleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace a rule
    pub async fn upsert(&self, rule: &Rule) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO rules (rule_id, name, action, priority, account_id, conditions,
                                  is_active, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               ON CONFLICT (rule_id) DO UPDATE SET
                   name = EXCLUDED.name,
                   action = EXCLUDED.action,
                   priority = EXCLUDED.priority,
                   account_id = EXCLUDED.account_id,
                   conditions = EXCLUDED.conditions,
                   is_active = EXCLUDED.is_active,
                   updated_at = EXCLUDED.updated_at"#,
        )
        .bind(rule.rule_id)
        .bind(&rule.name)
        .bind(rule.action.as_str())
        .bind(rule.priority)
        .bind(rule.scope.account_id())
        .bind(Value::Object(rule.conditions.clone()))
        .bind(rule.is_active)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn rule_from_row(row: &PgRow) -> Result<Rule, StoreError> {
    let rule_id: Uuid = row.get_required("rule_id")?;
    let action: String = row.get_required("action")?;
    let conditions: Value = row.get_required("conditions")?;
    let account_id: Option<Uuid> = row.get_required("account_id")?;

    let conditions = match conditions {
        Value::Object(map) => map,
        other => {
            return Err(StoreError::Corrupt(format!(
                "rule {} conditions must be an object, got {}",
                rule_id, other
            )));
        }
    };

    Ok(Rule {
        rule_id,
        name: row.get_required("name")?,
        action: action
            .parse::<RuleAction>()
            .map_err(|e| StoreError::Corrupt(format!("rule {}: {}", rule_id, e)))?,
        priority: row.get_required("priority")?,
        scope: RuleScope::from_account_id(account_id),
        conditions,
        is_active: row.get_required("is_active")?,
        created_at: row.get_required("created_at")?,
        updated_at: row.get_required("updated_at")?,
    })
}

#[async_trait]
impl RuleStore for PgRuleRepository {
    async fn find_active_by_account(&self, account_id: Uuid) -> Result<Vec<Rule>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM rules WHERE account_id = $1 AND is_active ORDER BY priority ASC",
            RULE_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(rule_from_row).collect()
    }

    async fn find_active_global(&self) -> Result<Vec<Rule>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM rules WHERE account_id IS NULL AND is_active ORDER BY priority ASC",
            RULE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(rule_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::account::repository::PgAccountRepository;
    use crate::db::Database;
    use crate::store::AccountStore;
    use rust_decimal_macros::dec;
    use serde_json::json;

    async fn connect() -> Database {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let db = Database::connect(&url).await.expect("Failed to connect");
        db.apply_schema().await.expect("schema");
        db
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_account_and_global_rules_are_separated() {
        let db = connect().await;
        let accounts = PgAccountRepository::new(db.pool().clone());
        let repo = PgRuleRepository::new(db.pool().clone());

        let account = Account::new(format!("PG-RULES-{}", Uuid::new_v4()), dec!(10), "USD");
        accounts.save(&account).await.unwrap();

        let mut conditions = serde_json::Map::new();
        conditions.insert("amountGreaterThan".into(), json!(100));
        let scoped = Rule::new(
            "big spend",
            RuleAction::Review,
            5,
            RuleScope::Account(account.account_id),
            conditions,
        );
        let mut inactive = scoped.clone();
        inactive.rule_id = Uuid::new_v4();
        inactive.is_active = false;
        repo.upsert(&scoped).await.unwrap();
        repo.upsert(&inactive).await.unwrap();

        let found = repo.find_active_by_account(account.account_id).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule_id, scoped.rule_id);
        assert_eq!(found[0].conditions, scoped.conditions);

        let global = repo.find_active_global().await.unwrap();
        assert!(global.iter().all(|r| r.scope == RuleScope::Global));
        assert!(global.windows(2).all(|w| w[0].priority <= w[1].priority));
    }
}
