//! In-memory stores
//!
//! Row locks are per-account `tokio::sync::Mutex`es held as owned guards
//! by a transfer unit until commit or drop, mirroring `SELECT ... FOR UPDATE`
//! semantics: readers see the last committed balance, writers queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{AccountStore, RuleStore, StoreError, TransactionStore, TransferUnit};
use crate::account::Account;
use crate::rules::{Rule, RuleScope};
use crate::transaction::{Transaction, TransactionFilter};

// ============================================================================
// Accounts
// ============================================================================

#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<DashMap<Uuid, Account>>,
    row_locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        for account in accounts {
            store.accounts.insert(account.account_id, account);
        }
        store
    }

    /// Committed balance, if the account exists
    pub fn balance_of(&self, account_id: Uuid) -> Option<Decimal> {
        self.accounts.get(&account_id).map(|a| a.balance)
    }

    fn row_lock(&self, account_id: Uuid) -> Arc<Mutex<()>> {
        self.row_locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_id(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&account_id).map(|a| a.clone()))
    }

    async fn find_by_alias(&self, alias: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .iter()
            .find(|a| a.alias.as_deref() == Some(alias))
            .map(|a| a.clone()))
    }

    async fn find_by_account_number(
        &self,
        account_number: &str,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .accounts
            .iter()
            .find(|a| a.account_number == account_number)
            .map(|a| a.clone()))
    }

    async fn save(&self, account: &Account) -> Result<(), StoreError> {
        self.accounts.insert(account.account_id, account.clone());
        Ok(())
    }

    async fn begin_transfer(&self) -> Result<Box<dyn TransferUnit>, StoreError> {
        Ok(Box::new(InMemoryTransferUnit {
            store: self.clone(),
            guards: HashMap::new(),
            staged: HashMap::new(),
        }))
    }
}

struct InMemoryTransferUnit {
    store: InMemoryAccountStore,
    guards: HashMap<Uuid, OwnedMutexGuard<()>>,
    staged: HashMap<Uuid, Decimal>,
}

#[async_trait]
impl TransferUnit for InMemoryTransferUnit {
    async fn lock_account(&mut self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        if !self.guards.contains_key(&account_id) {
            // Clone the lock out of the map before awaiting; no shard guard
            // may be held across the await.
            let lock = self.store.row_lock(account_id);
            let guard = lock.lock_owned().await;
            self.guards.insert(account_id, guard);
        }

        let mut account = match self.store.accounts.get(&account_id) {
            Some(a) => a.clone(),
            None => {
                self.guards.remove(&account_id);
                return Ok(None);
            }
        };
        if let Some(balance) = self.staged.get(&account_id) {
            account.balance = *balance;
        }
        Ok(Some(account))
    }

    async fn set_balance(&mut self, account_id: Uuid, balance: Decimal) -> Result<(), StoreError> {
        if !self.guards.contains_key(&account_id) {
            return Err(StoreError::NotLocked(account_id));
        }
        self.staged.insert(account_id, balance);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let now = Utc::now();
        for (account_id, balance) in &self.staged {
            let mut account = self
                .store
                .accounts
                .get_mut(account_id)
                .ok_or_else(|| StoreError::NotFound(account_id.to_string()))?;
            account.balance = *balance;
            account.updated_at = now;
        }
        // Guards release on drop, after every staged balance is visible.
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// Rules
// ============================================================================

#[derive(Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<Vec<Rule>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self {
            rules: RwLock::new(rules.into_iter().collect()),
        }
    }

    pub fn insert(&self, rule: Rule) {
        if let Ok(mut rules) = self.rules.write() {
            rules.push(rule);
        }
    }

    fn select(&self, pred: impl Fn(&Rule) -> bool) -> Result<Vec<Rule>, StoreError> {
        let rules = self
            .rules
            .read()
            .map_err(|_| StoreError::Corrupt("rule store lock poisoned".into()))?;
        let mut selected: Vec<Rule> = rules
            .iter()
            .filter(|r| r.is_active && pred(r))
            .cloned()
            .collect();
        selected.sort_by_key(|r| r.priority);
        Ok(selected)
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn find_active_by_account(&self, account_id: Uuid) -> Result<Vec<Rule>, StoreError> {
        self.select(|r| r.scope == RuleScope::Account(account_id))
    }

    async fn find_active_global(&self) -> Result<Vec<Rule>, StoreError> {
        self.select(|r| r.scope == RuleScope::Global)
    }
}

// ============================================================================
// Transactions
// ============================================================================

#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<DashMap<Uuid, Transaction>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Seed history directly, bypassing the pending-first lifecycle
    pub fn insert(&self, transaction: Transaction) {
        self.transactions
            .insert(transaction.transaction_id, transaction);
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn create(&self, transaction: &Transaction) -> Result<(), StoreError> {
        self.transactions
            .insert(transaction.transaction_id, transaction.clone());
        Ok(())
    }

    async fn save(&self, transaction: &Transaction) -> Result<(), StoreError> {
        match self.transactions.get_mut(&transaction.transaction_id) {
            Some(mut existing) => {
                *existing = transaction.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(transaction.transaction_id.to_string())),
        }
    }

    async fn find_by_id(&self, transaction_id: Uuid) -> Result<Option<Transaction>, StoreError> {
        Ok(self.transactions.get(&transaction_id).map(|t| t.clone()))
    }

    async fn count(&self, filter: &TransactionFilter) -> Result<u64, StoreError> {
        Ok(self
            .transactions
            .iter()
            .filter(|t| filter.matches(t.value()))
            .count() as u64)
    }

    async fn find_recent_by_account(
        &self,
        account_id: Uuid,
        limit: usize,
        exclude_transaction_id: Option<Uuid>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut recent: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| {
                t.account_id == account_id
                    && Some(t.transaction_id) != exclude_transaction_id
                    && until.is_none_or(|until| t.created_at <= until)
            })
            .map(|t| t.clone())
            .collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleAction;
    use rust_decimal_macros::dec;
    use serde_json::Map;
    use std::time::Duration;

    #[tokio::test]
    async fn test_account_lookups() {
        let mut account = Account::new("ACC-001", dec!(50), "USD");
        account.alias = Some("acct_main".into());
        let id = account.account_id;
        let store = InMemoryAccountStore::with_accounts([account]);

        assert!(store.find_by_id(id).await.unwrap().is_some());
        assert!(store.find_by_alias("acct_main").await.unwrap().is_some());
        assert!(store.find_by_account_number("ACC-001").await.unwrap().is_some());
        assert!(store.find_by_account_number("ACC-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uncommitted_unit_leaves_balance() {
        let account = Account::new("ACC-001", dec!(50), "USD");
        let id = account.account_id;
        let store = InMemoryAccountStore::with_accounts([account]);

        {
            let mut unit = store.begin_transfer().await.unwrap();
            unit.lock_account(id).await.unwrap();
            unit.set_balance(id, dec!(0)).await.unwrap();
            // dropped without commit
        }
        assert_eq!(store.balance_of(id), Some(dec!(50)));

        let mut unit = store.begin_transfer().await.unwrap();
        unit.lock_account(id).await.unwrap();
        unit.set_balance(id, dec!(20)).await.unwrap();
        unit.commit().await.unwrap();
        assert_eq!(store.balance_of(id), Some(dec!(20)));
    }

    #[tokio::test]
    async fn test_set_balance_requires_lock() {
        let account = Account::new("ACC-001", dec!(50), "USD");
        let id = account.account_id;
        let store = InMemoryAccountStore::with_accounts([account]);

        let mut unit = store.begin_transfer().await.unwrap();
        let err = unit.set_balance(id, dec!(1)).await.unwrap_err();
        assert_eq!(err.code(), "NOT_LOCKED");
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_unit() {
        let account = Account::new("ACC-001", dec!(50), "USD");
        let id = account.account_id;
        let store = InMemoryAccountStore::with_accounts([account]);

        let mut first = store.begin_transfer().await.unwrap();
        first.lock_account(id).await.unwrap();

        let mut second = store.begin_transfer().await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), second.lock_account(id)).await;
        assert!(blocked.is_err(), "second unit must wait for the row lock");

        first.rollback().await.unwrap();
        let acquired =
            tokio::time::timeout(Duration::from_millis(50), second.lock_account(id)).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn test_rule_store_filters_and_orders() {
        let account_id = Uuid::new_v4();
        let mut inactive = Rule::new("off", RuleAction::Decline, 1, RuleScope::Global, Map::new());
        inactive.is_active = false;
        let store = InMemoryRuleStore::with_rules([
            Rule::new("g20", RuleAction::Decline, 20, RuleScope::Global, Map::new()),
            Rule::new("g10", RuleAction::Review, 10, RuleScope::Global, Map::new()),
            Rule::new("a5", RuleAction::Sweep, 5, RuleScope::Account(account_id), Map::new()),
            inactive,
        ]);

        let global = store.find_active_global().await.unwrap();
        let names: Vec<_> = global.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["g10", "g20"]);

        let scoped = store.find_active_by_account(account_id).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].name, "a5");
    }

    #[tokio::test]
    async fn test_recent_by_account_newest_first() {
        let account_id = Uuid::new_v4();
        let store = InMemoryTransactionStore::new();
        let now = Utc::now();
        for minutes in [30, 10, 20] {
            let mut t = Transaction::pending("e", account_id, dec!(1), "USD");
            t.created_at = now - chrono::Duration::minutes(minutes);
            store.insert(t);
        }

        let recent = store.find_recent_by_account(account_id, 2, None, None).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].created_at > recent[1].created_at);

        let bounded = store
            .find_recent_by_account(account_id, 5, None, Some(now - chrono::Duration::minutes(15)))
            .await
            .unwrap();
        assert_eq!(bounded.len(), 2);
        assert!(bounded.iter().all(|t| t.created_at <= now - chrono::Duration::minutes(15)));
    }

    #[tokio::test]
    async fn test_save_requires_existing_record() {
        let store = InMemoryTransactionStore::new();
        let t = Transaction::pending("e", Uuid::new_v4(), dec!(1), "USD");
        assert!(store.save(&t).await.is_err());
        store.create(&t).await.unwrap();
        assert!(store.save(&t).await.is_ok());
    }
}
