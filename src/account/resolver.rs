//! Account identifier resolution
//!
//! Callers may name an account three ways. Forms are tried in order and a
//! miss falls through to the next applicable one:
//! 1. canonical UUID → `find_by_id`
//! 2. `acct_`-prefixed alias → `find_by_alias`
//! 3. anything else → `find_by_account_number`

use tracing::debug;
use uuid::Uuid;

use super::models::Account;
use crate::store::{AccountStore, StoreError};

pub const ALIAS_PREFIX: &str = "acct_";

pub async fn resolve_account(
    store: &dyn AccountStore,
    identifier: &str,
) -> Result<Option<Account>, StoreError> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Ok(None);
    }

    if let Ok(id) = Uuid::parse_str(identifier)
        && let Some(account) = store.find_by_id(id).await?
    {
        debug!(account_id = %id, "Resolved account by id");
        return Ok(Some(account));
    }

    if identifier.starts_with(ALIAS_PREFIX)
        && let Some(account) = store.find_by_alias(identifier).await?
    {
        debug!(account_id = %account.account_id, "Resolved account by alias");
        return Ok(Some(account));
    }

    let found = store.find_by_account_number(identifier).await?;
    if let Some(account) = &found {
        debug!(account_id = %account.account_id, "Resolved account by number");
    }
    Ok(found)
}
