//! Card-data protection errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CryptoError {
    #[error("Card number failed validation")]
    InvalidCardNumber,

    #[error("Encryption key not configured: {0}")]
    MissingKey(String),

    #[error("Encryption key invalid: {0}")]
    InvalidKey(String),

    #[error("Malformed ciphertext envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),
}

impl CryptoError {
    pub fn code(&self) -> &'static str {
        match self {
            CryptoError::InvalidCardNumber => "INVALID_CARD_NUMBER",
            CryptoError::MissingKey(_) => "MISSING_KEY",
            CryptoError::InvalidKey(_) => "INVALID_KEY",
            CryptoError::MalformedEnvelope(_) => "MALFORMED_ENVELOPE",
            CryptoError::Decryption(_) => "DECRYPTION_FAILED",
        }
    }
}
