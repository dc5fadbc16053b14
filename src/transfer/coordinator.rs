//! Fund Transfer Coordinator
//!
//! Moves balance between two accounts inside one unit of work:
//!
//! ```text
//! validate → begin → lock(min id) → lock(max id) → check → set both → commit
//!                        │                            │
//!                        └──────── any error ─────────┴──▶ rollback
//! ```
//!
//! Locks are always taken in ascending account-id order, so two opposite
//! transfers over the same pair cannot deadlock. No retries happen here.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::TransferError;
use crate::store::{AccountStore, TransferUnit};

pub struct FundTransferCoordinator {
    accounts: Arc<dyn AccountStore>,
}

impl FundTransferCoordinator {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    /// Transfer `amount` and report success. Failures are logged, never raised.
    pub async fn transfer(&self, from: Uuid, to: Uuid, amount: Decimal) -> bool {
        match self.try_transfer(from, to, amount).await {
            Ok(()) => {
                info!(from = %from, to = %to, amount = %amount, "Transfer committed");
                true
            }
            Err(e) => {
                warn!(
                    from = %from,
                    to = %to,
                    amount = %amount,
                    code = e.code(),
                    error = %e,
                    "Transfer aborted"
                );
                false
            }
        }
    }

    pub async fn try_transfer(&self, from: Uuid, to: Uuid, amount: Decimal) -> Result<(), TransferError> {
        // === Validation ===
        if amount <= Decimal::ZERO {
            return Err(TransferError::InvalidAmount);
        }
        if from == to {
            return Err(TransferError::SameAccount);
        }

        let mut unit = self.accounts.begin_transfer().await?;
        match apply(unit.as_mut(), from, to, amount).await {
            Ok(()) => {
                unit.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = unit.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed; unit dropped");
                }
                Err(e)
            }
        }
    }
}

async fn apply(
    unit: &mut dyn TransferUnit,
    from: Uuid,
    to: Uuid,
    amount: Decimal,
) -> Result<(), TransferError> {
    let (first, second) = if from < to { (from, to) } else { (to, from) };
    let first_row = unit.lock_account(first).await?;
    let second_row = unit.lock_account(second).await?;
    debug!(first = %first, second = %second, "Rows locked");

    let (source, target) = if first == from {
        (first_row, second_row)
    } else {
        (second_row, first_row)
    };
    let source = source.ok_or(TransferError::SourceAccountNotFound)?;
    let target = target.ok_or(TransferError::TargetAccountNotFound)?;

    if !source.currency.eq_ignore_ascii_case(&target.currency) {
        return Err(TransferError::CurrencyMismatch {
            from: source.currency,
            to: target.currency,
        });
    }
    if !source.has_sufficient_funds(amount) {
        return Err(TransferError::InsufficientBalance);
    }

    let new_source = source.balance - amount;
    let new_target = target
        .balance
        .checked_add(amount)
        .ok_or(TransferError::Overflow)?;

    unit.set_balance(from, new_source).await?;
    unit.set_balance(to, new_target).await?;
    Ok(())
}
