//! Recursive PCI scrubbing of caller-supplied JSON
//!
//! - card number fields: PAN-shaped values masked, anything else redacted
//! - CVV / track / PIN / cardholder fields: redacted outright
//! - PAN-shaped values anywhere else: masked in place
//!
//! The output is a fixed point: sanitizing it again changes nothing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::card::{is_valid_pan, mask_pan, normalize_pan};

pub const REDACTED: &str = "[REDACTED]";

static PAN_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{13,19}\b").expect("valid regex"));

static MASKED_PAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{6}\*+\d{4}$").expect("valid regex"));

const CARD_NUMBER_KEYS: &[&str] = &["cardnumber", "pan", "primaryaccountnumber"];

const REDACT_KEYS: &[&str] = &[
    "cvv",
    "cvv2",
    "cvc",
    "cvc2",
    "securitycode",
    "track1",
    "track2",
    "trackdata",
    "magstripe",
    "pin",
    "pinblock",
    "cardholdername",
    "cardholder",
    "nameoncard",
];

/// `card_number`, `Card-Number` and `cardNumber` all compare equal
fn canonical_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sanitize_object(map)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        Value::String(s) => Value::String(mask_pans_in_text(s)),
        Value::Number(n) => {
            let digits = n.to_string();
            if is_valid_pan(&digits) {
                Value::String(mask_pan(&digits))
            } else {
                value.clone()
            }
        }
        Value::Null | Value::Bool(_) => value.clone(),
    }
}

fn sanitize_object(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let canonical = canonical_key(key);
            let cleaned = if CARD_NUMBER_KEYS.contains(&canonical.as_str()) {
                sanitize_card_number(value)
            } else if REDACT_KEYS.contains(&canonical.as_str()) {
                redact(value)
            } else {
                sanitize(value)
            };
            (key.clone(), cleaned)
        })
        .collect()
}

fn sanitize_card_number(value: &Value) -> Value {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Null => return Value::Null,
        _ => return Value::String(REDACTED.into()),
    };

    if MASKED_PAN.is_match(&raw) {
        return Value::String(raw);
    }
    let digits = normalize_pan(&raw);
    if is_valid_pan(&digits) {
        Value::String(mask_pan(&digits))
    } else {
        Value::String(REDACTED.into())
    }
}

fn redact(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        _ => Value::String(REDACTED.into()),
    }
}

fn mask_pans_in_text(text: &str) -> String {
    PAN_RUN
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let run = &caps[0];
            if is_valid_pan(run) {
                mask_pan(run)
            } else {
                run.to_string()
            }
        })
        .into_owned()
}
