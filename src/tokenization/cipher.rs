//! Symmetric encryption for sensitive fields at rest
//!
//! AES-256-CBC with PKCS#7 padding and a fresh random IV per message.
//! Envelope format: `hex(iv):hex(ciphertext)`.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use rand::RngCore;
use std::fmt;

use super::error::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;

/// 256-bit key. Never printed.
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex key
    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(value.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("not hex: {}", e)))?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            CryptoError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, b.len()))
        })?;
        Ok(Self(key))
    }

    /// Read the key from an environment variable.
    ///
    /// A missing variable is an error; there is no fallback key.
    pub fn from_env(var: &str) -> Result<Self, CryptoError> {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => Self::from_hex(&value),
            _ => Err(CryptoError::MissingKey(var.to_string())),
        }
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct SecretCipher {
    key: EncryptionKey,
}

impl SecretCipher {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.0.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        format!("{}:{}", hex::encode(iv), hex::encode(ciphertext))
    }

    /// Decrypt an envelope produced by [`SecretCipher::encrypt`].
    ///
    /// Any structural problem is an error; nothing is returned on a
    /// partial success.
    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        let (iv_hex, ct_hex) = envelope
            .split_once(':')
            .ok_or_else(|| CryptoError::MalformedEnvelope("missing ':' separator".into()))?;

        let iv: [u8; IV_LEN] = hex::decode(iv_hex)
            .map_err(|e| CryptoError::MalformedEnvelope(format!("iv: {}", e)))?
            .try_into()
            .map_err(|_| CryptoError::MalformedEnvelope(format!("iv must be {} bytes", IV_LEN)))?;

        let ciphertext = hex::decode(ct_hex)
            .map_err(|e| CryptoError::MalformedEnvelope(format!("ciphertext: {}", e)))?;
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CryptoError::MalformedEnvelope(format!(
                "ciphertext length {} is not a positive multiple of {}",
                ciphertext.len(),
                BLOCK_LEN
            )));
        }

        let plaintext = Aes256CbcDec::new(&self.key.0.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CryptoError::Decryption("bad padding".into()))?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption("plaintext is not UTF-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::new(EncryptionKey::new([7u8; KEY_LEN]))
    }

    #[test]
    fn test_encrypt_decrypt() {
        let c = cipher();
        let envelope = c.encrypt("4242424242424242");
        assert!(!envelope.contains("4242424242424242"));
        assert_eq!(c.decrypt(&envelope).unwrap(), "4242424242424242");
    }

    #[test]
    fn test_fresh_iv_per_message() {
        let c = cipher();
        assert_ne!(c.encrypt("same"), c.encrypt("same"));
    }

    #[test]
    fn test_malformed_envelopes_fail_closed() {
        let c = cipher();
        assert!(matches!(c.decrypt("deadbeef"), Err(CryptoError::MalformedEnvelope(_))));
        assert!(matches!(c.decrypt("zz:00"), Err(CryptoError::MalformedEnvelope(_))));
        assert!(matches!(c.decrypt("0011:00112233445566778899aabbccddeeff"), Err(CryptoError::MalformedEnvelope(_))));

        let envelope = c.encrypt("secret");
        let truncated = &envelope[..envelope.len() - 2];
        assert!(matches!(c.decrypt(truncated), Err(CryptoError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_wrong_key_does_not_return_plaintext() {
        let envelope = cipher().encrypt("secret value");
        let other = SecretCipher::new(EncryptionKey::new([9u8; KEY_LEN]));
        assert_ne!(other.decrypt(&envelope).ok().as_deref(), Some("secret value"));
    }

    #[test]
    fn test_key_parsing() {
        assert!(EncryptionKey::from_hex(&"ab".repeat(32)).is_ok());
        assert!(matches!(EncryptionKey::from_hex("abcd"), Err(CryptoError::InvalidKey(_))));
        assert!(matches!(EncryptionKey::from_hex("not-hex"), Err(CryptoError::InvalidKey(_))));
        assert!(matches!(
            EncryptionKey::from_env("CARDGATE_TEST_KEY_THAT_IS_NEVER_SET"),
            Err(CryptoError::MissingKey(_))
        ));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = EncryptionKey::new([1u8; KEY_LEN]);
        assert_eq!(format!("{:?}", key), "EncryptionKey(<redacted>)");
    }
}
