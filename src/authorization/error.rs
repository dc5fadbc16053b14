//! Authorization error types

use thiserror::Error;
use uuid::Uuid;

use super::types::ReasonCode;
use crate::account::AccountStatus;
use crate::store::StoreError;
use crate::tokenization::CryptoError;
use crate::transaction::TransactionError;

/// Errors inside the authorization pipeline.
///
/// None of these escape `authorize`; each maps to a decline reason.
#[derive(Error, Debug)]
pub enum AuthorizeError {
    // === Business declines ===
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account {0} is {1}")]
    AccountInactive(Uuid, AccountStatus),

    #[error("Invalid card: {0}")]
    InvalidCard(#[from] CryptoError),

    // === System errors ===
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Transaction state error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Pipeline panicked: {0}")]
    Panicked(String),
}

impl AuthorizeError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthorizeError::InvalidRequest(_) => "INVALID_REQUEST",
            AuthorizeError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            AuthorizeError::AccountInactive(..) => "ACCOUNT_INACTIVE",
            AuthorizeError::InvalidCard(_) => "INVALID_CARD",
            AuthorizeError::Store(e) => e.code(),
            AuthorizeError::Transaction(_) => "TRANSACTION_STATE_ERROR",
            AuthorizeError::Panicked(_) => "PANICKED",
        }
    }

    pub fn reason_code(&self) -> ReasonCode {
        match self {
            AuthorizeError::InvalidRequest(_) => ReasonCode::InvalidRequest,
            AuthorizeError::AccountNotFound(_) => ReasonCode::AccountNotFound,
            AuthorizeError::AccountInactive(..) => ReasonCode::AccountInactive,
            AuthorizeError::InvalidCard(_) => ReasonCode::InvalidCard,
            AuthorizeError::Store(_)
            | AuthorizeError::Transaction(_)
            | AuthorizeError::Panicked(_) => ReasonCode::SystemError,
        }
    }

    /// Normal decline outcome rather than a fault
    pub fn is_business_decline(&self) -> bool {
        self.reason_code() != ReasonCode::SystemError
    }
}
