//! PAN validation, tokenization, fingerprinting and masking

use chrono::{DateTime, Datelike, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

use super::error::CryptoError;

const MIN_PAN_LEN: usize = 13;
const MAX_PAN_LEN: usize = 19;
const BIN_LEN: usize = 6;
const LAST4_LEN: usize = 4;

/// A validated primary account number.
///
/// Only lives for the duration of tokenization; `Debug`/`Display` print the
/// masked form so the digits cannot leak through logs.
#[derive(Clone, PartialEq, Eq)]
pub struct CardNumber(String);

impl CardNumber {
    /// Validate a PAN (spaces and dashes are ignored)
    pub fn parse(raw: &str) -> Result<Self, CryptoError> {
        let digits = normalize_pan(raw);
        if is_valid_pan(&digits) {
            Ok(Self(digits))
        } else {
            Err(CryptoError::InvalidCardNumber)
        }
    }

    pub fn bin(&self) -> &str {
        &self.0[..BIN_LEN]
    }

    pub fn last4(&self) -> &str {
        &self.0[self.0.len() - LAST4_LEN..]
    }

    pub fn masked(&self) -> String {
        mask_pan(&self.0)
    }

    pub fn brand(&self) -> Option<CardBrand> {
        CardBrand::detect(&self.0)
    }
}

impl fmt::Debug for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardNumber({})", self.masked())
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Card network, derived from the BIN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
    Discover,
    Jcb,
    DinersClub,
    UnionPay,
}

impl CardBrand {
    pub fn detect(pan: &str) -> Option<Self> {
        let prefix = |n: usize| pan.get(..n).and_then(|p| p.parse::<u32>().ok());

        match (prefix(1), prefix(2), prefix(3), prefix(4)) {
            (Some(4), ..) => Some(CardBrand::Visa),
            (_, Some(34 | 37), ..) => Some(CardBrand::Amex),
            (_, Some(51..=55), ..) => Some(CardBrand::Mastercard),
            (_, _, _, Some(2221..=2720)) => Some(CardBrand::Mastercard),
            (_, _, _, Some(6011)) | (_, Some(65), ..) => Some(CardBrand::Discover),
            (_, _, Some(644..=649), _) => Some(CardBrand::Discover),
            (_, _, _, Some(3528..=3589)) => Some(CardBrand::Jcb),
            (_, Some(36 | 38), ..) | (_, _, Some(300..=305), _) => Some(CardBrand::DinersClub),
            (_, Some(62), ..) => Some(CardBrand::UnionPay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardBrand::Visa => "visa",
            CardBrand::Mastercard => "mastercard",
            CardBrand::Amex => "amex",
            CardBrand::Discover => "discover",
            CardBrand::Jcb => "jcb",
            CardBrand::DinersClub => "diners",
            CardBrand::UnionPay => "unionpay",
        }
    }
}

impl fmt::Display for CardBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip the separators people type into card fields
pub fn normalize_pan(raw: &str) -> String {
    raw.chars().filter(|c| !matches!(c, ' ' | '-')).collect()
}

/// 13–19 ASCII digits passing the Luhn checksum
pub fn is_valid_pan(pan: &str) -> bool {
    (MIN_PAN_LEN..=MAX_PAN_LEN).contains(&pan.len())
        && pan.bytes().all(|b| b.is_ascii_digit())
        && luhn_valid(pan)
}

/// Luhn (mod 10) checksum over an all-digit string
pub fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, b) in digits.bytes().rev().enumerate() {
        if !b.is_ascii_digit() {
            return false;
        }
        let mut d = u32::from(b - b'0');
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    !digits.is_empty() && sum % 10 == 0
}

/// Display form: first 6 and last 4 digits kept, the rest masked
pub fn mask_pan(pan: &str) -> String {
    let len = pan.chars().count();
    if len <= BIN_LEN + LAST4_LEN {
        return "*".repeat(len);
    }
    let head: String = pan.chars().take(BIN_LEN).collect();
    let tail: String = pan.chars().skip(len - LAST4_LEN).collect();
    format!("{}{}{}", head, "*".repeat(len - BIN_LEN - LAST4_LEN), tail)
}

/// One-way card identifier: SHA-256 over BIN + last 4 + expiry.
///
/// Correlates repeat use of a card without retaining enough to rebuild
/// the PAN.
pub fn fingerprint(card: &CardNumber, expiry_month: u32, expiry_year: i32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(card.bin().as_bytes());
    hasher.update(card.last4().as_bytes());
    hasher.update(format!("{:02}", expiry_month).as_bytes());
    hasher.update(normalize_expiry_year(expiry_year).to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Opaque random token. The token→PAN mapping belongs to an external vault.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("tok_{}", hex::encode(bytes))
}

/// Two-digit years are taken as 20YY
pub fn normalize_expiry_year(year: i32) -> i32 {
    if (0..100).contains(&year) {
        2000 + year
    } else {
        year
    }
}

/// A card is expired when its expiry month is strictly before the current
/// calendar month. Out-of-range months count as expired.
pub fn is_expired(expiry_month: u32, expiry_year: i32, now: DateTime<Utc>) -> bool {
    if !(1..=12).contains(&expiry_month) {
        return true;
    }
    let expiry = (normalize_expiry_year(expiry_year), expiry_month);
    expiry < (now.year(), now.month())
}

/// Result of tokenizing a card
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedCard {
    pub token: String,
    pub last4: String,
    pub masked: String,
    pub brand: Option<CardBrand>,
    pub fingerprint: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
}

/// Validate and tokenize a raw PAN. The PAN itself is not retained.
pub fn tokenize(raw_pan: &str, expiry_month: u32, expiry_year: i32) -> Result<TokenizedCard, CryptoError> {
    let card = CardNumber::parse(raw_pan)?;
    Ok(TokenizedCard {
        token: generate_token(),
        last4: card.last4().to_string(),
        masked: card.masked(),
        brand: card.brand(),
        fingerprint: fingerprint(&card, expiry_month, expiry_year),
        expiry_month,
        expiry_year: normalize_expiry_year(expiry_year),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn june_2025() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_luhn() {
        assert!(is_valid_pan("4242424242424242"));
        assert!(!is_valid_pan("4242424242424241"));
        assert!(is_valid_pan("378282246310005"));
        assert!(!is_valid_pan("424242424242"), "too short");
        assert!(!is_valid_pan("42424242424242424242"), "too long");
        assert!(!is_valid_pan("4242a42424242424"));
    }

    #[test]
    fn test_parse_ignores_separators() {
        let card = CardNumber::parse("4242 4242-4242 4242").unwrap();
        assert_eq!(card.bin(), "424242");
        assert_eq!(card.last4(), "4242");
        assert_eq!(CardNumber::parse("4242424242424241"), Err(CryptoError::InvalidCardNumber));
    }

    #[test]
    fn test_debug_is_masked() {
        let card = CardNumber::parse("4242424242424242").unwrap();
        let shown = format!("{:?} {}", card, card);
        assert!(!shown.contains("4242424242424242"));
        assert!(shown.contains("424242******4242"));
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask_pan("4242424242424242"), "424242******4242");
        assert_eq!(mask_pan("378282246310005"), "378282*****0005");
        assert_eq!(mask_pan("1234"), "****");
    }

    #[test]
    fn test_brand_detection() {
        assert_eq!(CardBrand::detect("4242424242424242"), Some(CardBrand::Visa));
        assert_eq!(CardBrand::detect("5555555555554444"), Some(CardBrand::Mastercard));
        assert_eq!(CardBrand::detect("2223003122003222"), Some(CardBrand::Mastercard));
        assert_eq!(CardBrand::detect("378282246310005"), Some(CardBrand::Amex));
        assert_eq!(CardBrand::detect("6011111111111117"), Some(CardBrand::Discover));
        assert_eq!(CardBrand::detect("3566002020360505"), Some(CardBrand::Jcb));
        assert_eq!(CardBrand::detect("9999999999999995"), None);
    }

    #[test]
    fn test_fingerprint_is_stable_and_expiry_sensitive() {
        let card = CardNumber::parse("4242424242424242").unwrap();
        let a = fingerprint(&card, 12, 2030);
        let b = fingerprint(&card, 12, 30);
        let c = fingerprint(&card, 11, 2030);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(!a.contains("4242424242424242"));
    }

    #[test]
    fn test_tokens_are_random_and_opaque() {
        let a = tokenize("4242424242424242", 12, 2030).unwrap();
        let b = tokenize("4242424242424242", 12, 2030).unwrap();
        assert_ne!(a.token, b.token);
        assert!(a.token.starts_with("tok_"));
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.last4, "4242");
        assert_eq!(a.brand, Some(CardBrand::Visa));
    }

    #[test]
    fn test_expiry_against_current_month() {
        let now = june_2025();
        assert!(is_expired(5, 2025, now));
        assert!(!is_expired(6, 2025, now));
        assert!(!is_expired(12, 2025, now));
        assert!(is_expired(12, 2024, now));
        assert!(!is_expired(1, 26, now));
        assert!(is_expired(13, 2030, now));
    }
}
