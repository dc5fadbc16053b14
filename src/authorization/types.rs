//! Authorization request and response types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::tokenization::{mask_pan, sanitize};

/// Metadata keys whose truthy presence counts as step-up evidence
pub const STEP_UP_EVIDENCE_KEYS: [&str; 3] =
    ["threeDsAuthenticated", "additionalAuthToken", "otpVerified"];

// ============================================================================
// Request
// ============================================================================

/// Incoming authorization request.
///
/// `card_number` and `cvv` are only accepted from a trusted boundary. They
/// are consumed by tokenization and never stored; `Debug` masks the PAN
/// and hides the CVV.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    /// Caller's transaction reference
    #[serde(default)]
    pub external_id: Option<String>,
    /// Account UUID, `acct_` alias, or account number
    pub account_id: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub merchant_category_code: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    #[serde(default)]
    pub payment_token: Option<String>,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub cvv: Option<String>,
    #[serde(default)]
    pub card_brand: Option<String>,
    #[serde(default)]
    pub card_last4: Option<String>,
    #[serde(default)]
    pub expiry_month: Option<u32>,
    #[serde(default)]
    pub expiry_year: Option<i32>,
    /// Fingerprint computed upstream for pre-tokenized cards
    #[serde(default)]
    pub card_fingerprint: Option<String>,
    /// Transaction time; defaults to receipt time
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Value,
}

fn default_payment_method() -> String {
    "card".to_string()
}

impl AuthorizationRequest {
    /// Minimal card request against an account identifier
    pub fn new(account_id: impl Into<String>, amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            external_id: None,
            account_id: account_id.into(),
            amount,
            currency: currency.into(),
            merchant_name: None,
            merchant_id: None,
            merchant_category_code: None,
            location: None,
            country_code: None,
            payment_method: default_payment_method(),
            payment_token: None,
            card_number: None,
            cvv: None,
            card_brand: None,
            card_last4: None,
            expiry_month: None,
            expiry_year: None,
            card_fingerprint: None,
            timestamp: None,
            metadata: Value::Null,
        }
    }

    pub fn is_card_payment(&self) -> bool {
        self.payment_method.eq_ignore_ascii_case("card")
    }

    /// Whether the caller supplied additional-authentication evidence
    pub fn has_step_up_evidence(&self) -> bool {
        let Some(metadata) = self.metadata.as_object() else {
            return false;
        };
        STEP_UP_EVIDENCE_KEYS
            .iter()
            .filter_map(|key| metadata.get(*key))
            .any(|value| match value {
                Value::Bool(b) => *b,
                Value::String(s) => !s.trim().is_empty(),
                _ => false,
            })
    }
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("external_id", &self.external_id)
            .field("account_id", &self.account_id)
            .field("amount", &self.amount)
            .field("currency", &self.currency)
            .field("merchant_name", &self.merchant_name)
            .field("merchant_category_code", &self.merchant_category_code)
            .field("country_code", &self.country_code)
            .field("payment_method", &self.payment_method)
            .field("payment_token", &self.payment_token)
            .field("card_number", &self.card_number.as_deref().map(mask_pan))
            .field("cvv", &self.cvv.as_ref().map(|_| "[REDACTED]"))
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .field("metadata", &sanitize(&self.metadata))
            .finish()
    }
}

// ============================================================================
// Response
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Decline,
}

/// Why a request was declined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReasonCode {
    AccountNotFound,
    AccountInactive,
    InsufficientFunds,
    /// Matched decline rule, by rule id
    Rule(String),
    AdditionalAuthRequired,
    InvalidCard,
    InvalidRequest,
    SystemError,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasonCode::AccountNotFound => f.write_str("account_not_found"),
            ReasonCode::AccountInactive => f.write_str("account_inactive"),
            ReasonCode::InsufficientFunds => f.write_str("insufficient_funds"),
            ReasonCode::Rule(rule_id) => write!(f, "rule_{}", rule_id),
            ReasonCode::AdditionalAuthRequired => f.write_str("additional_auth_required"),
            ReasonCode::InvalidCard => f.write_str("invalid_card"),
            ReasonCode::InvalidRequest => f.write_str("invalid_request"),
            ReasonCode::SystemError => f.write_str("system_error"),
        }
    }
}

impl Serialize for ReasonCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResponse {
    pub decision: Decision,
    pub transaction_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<ReasonCode>,
    /// Rule that decided the outcome, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_rule_id: Option<String>,
    pub processing_time_ms: u64,
}

impl AuthorizationResponse {
    pub fn is_approved(&self) -> bool {
        self.decision == Decision::Approve
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_request_deserializes_camel_case_with_defaults() {
        let request: AuthorizationRequest = serde_json::from_value(json!({
            "accountId": "acct_main",
            "amount": "42.50",
            "currency": "USD",
            "merchantName": "Joe's Coffee",
            "paymentToken": "tkn_abc"
        }))
        .unwrap();

        assert_eq!(request.account_id, "acct_main");
        assert_eq!(request.amount, dec!(42.50));
        assert_eq!(request.payment_method, "card");
        assert_eq!(request.payment_token.as_deref(), Some("tkn_abc"));
        assert!(request.metadata.is_null());
    }

    #[test]
    fn test_debug_never_prints_pan_or_cvv() {
        let mut request = AuthorizationRequest::new("acct_main", dec!(1), "USD");
        request.card_number = Some("4242424242424242".into());
        request.cvv = Some("123".into());
        request.metadata = json!({"cvv": "123"});

        let printed = format!("{:?}", request);
        assert!(!printed.contains("4242424242424242"));
        assert!(printed.contains("424242******4242"));
        assert!(!printed.contains("123"));
    }

    #[test]
    fn test_step_up_evidence() {
        let mut request = AuthorizationRequest::new("a", dec!(1), "USD");
        assert!(!request.has_step_up_evidence());

        request.metadata = json!({"threeDsAuthenticated": false, "otpVerified": ""});
        assert!(!request.has_step_up_evidence());

        request.metadata = json!({"additionalAuthToken": "otp-991"});
        assert!(request.has_step_up_evidence());

        request.metadata = json!({"threeDsAuthenticated": true});
        assert!(request.has_step_up_evidence());
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(ReasonCode::AccountNotFound.to_string(), "account_not_found");
        assert_eq!(ReasonCode::Rule("r-1".into()).to_string(), "rule_r-1");
        assert_eq!(
            ReasonCode::AdditionalAuthRequired.to_string(),
            "additional_auth_required"
        );
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let response = AuthorizationResponse {
            decision: Decision::Decline,
            transaction_id: Uuid::nil(),
            account_id: None,
            reason_code: Some(ReasonCode::InsufficientFunds),
            triggered_rule_id: None,
            processing_time_ms: 7,
        };
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["decision"], "decline");
        assert_eq!(value["reasonCode"], "insufficient_funds");
        assert_eq!(value["processingTimeMs"], 7);
        assert!(value.get("accountId").is_none());
        assert!(!response.is_approved());
    }
}
