//! Card data protection
//!
//! Raw card numbers stop here: callers get back a random token, last-4,
//! brand and a one-way fingerprint, and the PAN itself is dropped.

pub mod card;
pub mod cipher;
pub mod error;
pub mod sanitize;

pub use card::{CardBrand, CardNumber, TokenizedCard, is_expired, is_valid_pan, luhn_valid, mask_pan};
pub use cipher::{EncryptionKey, SecretCipher};
pub use error::CryptoError;
pub use sanitize::sanitize;

use serde_json::Value;

/// Tokenization plus at-rest encryption with a configured key
#[derive(Debug, Clone)]
pub struct TokenizationService {
    cipher: SecretCipher,
}

impl TokenizationService {
    pub fn new(key: EncryptionKey) -> Self {
        Self {
            cipher: SecretCipher::new(key),
        }
    }

    /// Build from the key held in `var`. Fails if the variable is unset.
    pub fn from_env(var: &str) -> Result<Self, CryptoError> {
        Ok(Self::new(EncryptionKey::from_env(var)?))
    }

    pub fn tokenize_card(
        &self,
        raw_pan: &str,
        expiry_month: u32,
        expiry_year: i32,
    ) -> Result<TokenizedCard, CryptoError> {
        card::tokenize(raw_pan, expiry_month, expiry_year)
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        self.cipher.encrypt(plaintext)
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        self.cipher.decrypt(envelope)
    }

    pub fn sanitize(&self, value: &Value) -> Value {
        sanitize::sanitize(value)
    }
}
