//! Seed data for running on in-memory stores
//!
//! ```json
//! {
//!   "accounts": [ { "accountId": "...", "accountNumber": "...", ... } ],
//!   "rules": [ { "ruleId": "...", "name": "...", "scope": {"type": "global"}, ... } ],
//!   "merchants": { "Joe's Coffee": { "merchantCategoryCode": "5814", "source": "directory" } }
//! }
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use thiserror::Error;

use super::{InMemoryAccountStore, InMemoryRuleStore, InMemoryTransactionStore, Stores};
use crate::account::Account;
use crate::enrichment::{DirectoryEnrichmentProvider, EnrichedData};
use crate::rules::Rule;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Failed to read fixtures {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse fixtures {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FixtureError {
    pub fn code(&self) -> &'static str {
        match self {
            FixtureError::Read { .. } => "FIXTURE_READ_ERROR",
            FixtureError::Parse { .. } => "FIXTURE_PARSE_ERROR",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    pub accounts: Vec<Account>,
    pub rules: Vec<Rule>,
    /// Enrichment directory keyed by raw merchant name
    pub merchants: BTreeMap<String, EnrichedData>,
}

impl Fixtures {
    pub fn load(path: &str) -> Result<Self, FixtureError> {
        let content = fs::read_to_string(path).map_err(|source| FixtureError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&content).map_err(|source| FixtureError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Fresh in-memory stores seeded with the accounts and rules
    pub fn stores(&self) -> Stores {
        Stores {
            accounts: Arc::new(InMemoryAccountStore::with_accounts(self.accounts.clone())),
            rules: Arc::new(InMemoryRuleStore::with_rules(self.rules.clone())),
            transactions: Arc::new(InMemoryTransactionStore::new()),
        }
    }

    pub fn enrichment_provider(&self) -> DirectoryEnrichmentProvider {
        self.merchants
            .iter()
            .fold(DirectoryEnrichmentProvider::new(), |provider, (name, data)| {
                provider.with_merchant(name, data.clone())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::resolve_account;
    use crate::rules::{RuleAction, RuleScope};
    use crate::store::RuleStore;

    const DEV_FIXTURES: &str = include_str!("../../config/fixtures.dev.json");

    #[tokio::test]
    async fn test_shipped_fixtures_seed_stores() {
        let fixtures = Fixtures::from_json(DEV_FIXTURES).unwrap();
        assert_eq!(fixtures.accounts.len(), 2);
        assert!(fixtures.rules.iter().all(|r| r.is_active));
        assert_eq!(fixtures.enrichment_provider().len(), fixtures.merchants.len());

        let stores = fixtures.stores();
        let checking = resolve_account(stores.accounts.as_ref(), "acct_checking")
            .await
            .unwrap()
            .unwrap();
        assert!(checking.sweep.is_sweep_enabled);

        let scoped = stores
            .rules
            .find_active_by_account(checking.account_id)
            .await
            .unwrap();
        assert!(scoped.iter().any(|r| r.action == RuleAction::Sweep));
        let global = stores.rules.find_active_global().await.unwrap();
        assert!(global.iter().all(|r| r.scope == RuleScope::Global));
    }

    #[test]
    fn test_missing_sections_default_empty() {
        let fixtures = Fixtures::from_json("{}").unwrap();
        assert!(fixtures.accounts.is_empty());
        assert!(fixtures.rules.is_empty());
        assert!(fixtures.enrichment_provider().is_empty());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = Fixtures::load("config/does-not-exist.json").unwrap_err();
        assert_eq!(err.code(), "FIXTURE_READ_ERROR");
    }
}
