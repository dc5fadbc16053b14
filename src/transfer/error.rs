//! Transfer Error Types

use thiserror::Error;

use crate::store::StoreError;

/// Transfer error types
///
/// Every variant aborts the unit of work; no balance changes survive.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Source and target account cannot be the same")]
    SameAccount,

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Amount would cause overflow")]
    Overflow,

    // === Account Errors ===
    #[error("Source account not found")]
    SourceAccountNotFound,

    #[error("Target account not found")]
    TargetAccountNotFound,

    #[error("Currency mismatch: {from} -> {to}")]
    CurrencyMismatch { from: String, to: String },

    #[error("Insufficient balance")]
    InsufficientBalance,

    // === System Errors ===
    #[error("Storage error: {0}")]
    Storage(String),
}

impl TransferError {
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::SameAccount => "SAME_ACCOUNT",
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::Overflow => "OVERFLOW",
            TransferError::SourceAccountNotFound => "SOURCE_ACCOUNT_NOT_FOUND",
            TransferError::TargetAccountNotFound => "TARGET_ACCOUNT_NOT_FOUND",
            TransferError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            TransferError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            TransferError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<StoreError> for TransferError {
    fn from(e: StoreError) -> Self {
        TransferError::Storage(e.to_string())
    }
}
