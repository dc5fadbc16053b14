//! Fuzzy merchant-name matching
//!
//! Descriptors from card networks are noisy: `SQ *JOE'S COFFEE 4821` and
//! `Joe's Coffee Inc` name the same merchant. Both sides are cleaned first,
//! then three independent similarity scores in [0, 1] are blended:
//!
//! | Score | Source | Default weight |
//! |---|---|---|
//! | edit distance | normalized Levenshtein | 0.4 |
//! | Jaro-Winkler | prefix-weighted transpositions | 0.4 |
//! | phonetic | per-word Soundex codes | 0.2 |

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PROCESSOR_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?:SQ|TST|PAYPAL|PP|SP|GOOGLE|IC|PY|WPY|CKO|ZTL)\s*\*\s*|AMZN\s+MKTP(?:\s+[A-Z]{2})?\s*\*?\s*)",
    )
    .expect("static regex")
});

static TRAILING_LOCATION_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\s+(?:store|no\.?|#)\s*\d+|\s*#\d+|\s+\d+)\s*$").expect("static regex")
});

static COMPANY_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)[\s,]+(?:inc|llc|ltd|limited|corp|corporation|co|company|gmbh|plc|pty|sa)\.?\s*$",
    )
    .expect("static regex")
});

/// Matcher thresholds and blend weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Minimum blended confidence for an equality match
    pub threshold: f64,
    /// Substring checks accept `threshold * substring_factor`
    pub substring_factor: f64,
    /// Cleaned strings shorter than this only match exactly
    pub min_length: usize,
    pub edit_weight: f64,
    pub jaro_winkler_weight: f64,
    pub phonetic_weight: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            substring_factor: 0.8,
            min_length: 3,
            edit_weight: 0.4,
            jaro_winkler_weight: 0.4,
            phonetic_weight: 0.2,
        }
    }
}

impl FuzzyConfig {
    pub fn substring_threshold(&self) -> f64 {
        self.threshold * self.substring_factor
    }
}

/// Individual and blended similarity scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScore {
    pub edit: f64,
    pub jaro_winkler: f64,
    pub phonetic: f64,
    pub confidence: f64,
}

/// Result of a merchant comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MerchantMatch {
    pub matched: bool,
    pub confidence: f64,
}

/// Normalize a merchant descriptor.
///
/// Strips processor prefixes, trailing store/location numbers and company
/// suffixes, drops punctuation and title-cases what remains.
pub fn clean_merchant_name(raw: &str) -> String {
    let mut name = PROCESSOR_PREFIX.replace(raw.trim(), "").into_owned();

    loop {
        let before = name.len();
        name = TRAILING_LOCATION_CODE.replace(&name, "").into_owned();
        name = COMPANY_SUFFIX.replace(&name, "").into_owned();
        if name.len() == before {
            break;
        }
    }

    let alnum: String = name
        .chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    alnum
        .split_whitespace()
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// American Soundex code (letter + 3 digits); `None` for words without letters
pub fn soundex(word: &str) -> Option<String> {
    let mut letters = word
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase());

    let first = letters.next()?;
    let mut code = String::with_capacity(4);
    code.push(first);
    let mut last = soundex_digit(first);

    for c in letters {
        let digit = soundex_digit(c);
        if let Some(d) = digit
            && digit != last
        {
            code.push(d);
            if code.len() == 4 {
                break;
            }
        }
        // H and W do not separate letters with the same code; vowels do.
        if !matches!(c, 'H' | 'W') {
            last = digit;
        }
    }

    while code.len() < 4 {
        code.push('0');
    }
    Some(code)
}

fn soundex_digit(c: char) -> Option<char> {
    match c {
        'B' | 'F' | 'P' | 'V' => Some('1'),
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
        'D' | 'T' => Some('3'),
        'L' => Some('4'),
        'M' | 'N' => Some('5'),
        'R' => Some('6'),
        _ => None,
    }
}

fn phonetic_key(name: &str) -> String {
    name.split_whitespace()
        .filter_map(soundex)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Blended fuzzy matcher
#[derive(Debug, Clone, Default)]
pub struct FuzzyMatcher {
    config: FuzzyConfig,
}

impl FuzzyMatcher {
    pub fn new(config: FuzzyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FuzzyConfig {
        &self.config
    }

    /// Score two already-cleaned names
    pub fn score(&self, a: &str, b: &str) -> MatchScore {
        let a = a.to_lowercase();
        let b = b.to_lowercase();

        let edit = strsim::normalized_levenshtein(&a, &b);
        let jaro_winkler = strsim::jaro_winkler(&a, &b);
        let (pa, pb) = (phonetic_key(&a), phonetic_key(&b));
        let phonetic = if pa.is_empty() || pb.is_empty() {
            0.0
        } else {
            strsim::normalized_levenshtein(&pa, &pb)
        };

        let confidence = self.config.edit_weight * edit
            + self.config.jaro_winkler_weight * jaro_winkler
            + self.config.phonetic_weight * phonetic;

        MatchScore {
            edit,
            jaro_winkler,
            phonetic,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Equality check between a raw descriptor and a target name
    pub fn equals(&self, candidate: &str, target: &str) -> MerchantMatch {
        let a = clean_merchant_name(candidate);
        let b = clean_merchant_name(target);

        if self.too_short(&a) || self.too_short(&b) {
            let exact = !a.is_empty() && a.eq_ignore_ascii_case(&b);
            return MerchantMatch {
                matched: exact,
                confidence: if exact { 1.0 } else { 0.0 },
            };
        }

        let confidence = self.score(&a, &b).confidence;
        MerchantMatch {
            matched: confidence >= self.config.threshold,
            confidence,
        }
    }

    /// Substring-style check: does `haystack` mention `needle`?
    pub fn contains(&self, haystack: &str, needle: &str) -> MerchantMatch {
        let hay = clean_merchant_name(haystack).to_lowercase();
        let needle = clean_merchant_name(needle).to_lowercase();

        if needle.is_empty() {
            return MerchantMatch {
                matched: false,
                confidence: 0.0,
            };
        }
        if hay.contains(&needle) {
            return MerchantMatch {
                matched: true,
                confidence: 1.0,
            };
        }
        if self.too_short(&needle) || self.too_short(&hay) {
            return MerchantMatch {
                matched: false,
                confidence: 0.0,
            };
        }

        let hay_words: Vec<&str> = hay.split_whitespace().collect();
        let width = needle.split_whitespace().count().max(1);

        let mut best = self.score(&hay, &needle).confidence;
        if hay_words.len() > width {
            for window in hay_words.windows(width) {
                let candidate = window.join(" ");
                best = best.max(self.score(&candidate, &needle).confidence);
            }
        }

        MerchantMatch {
            matched: best >= self.config.substring_threshold(),
            confidence: best,
        }
    }

    fn too_short(&self, cleaned: &str) -> bool {
        cleaned.chars().filter(|c| !c.is_whitespace()).count() < self.config.min_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_prefix_and_store_number() {
        assert_eq!(clean_merchant_name("SQ *Joe's Coffee 4821"), "Joes Coffee");
        assert_eq!(clean_merchant_name("Joe's Coffee"), "Joes Coffee");
        assert_eq!(clean_merchant_name("TST* BLUE BOTTLE #12"), "Blue Bottle");
        assert_eq!(clean_merchant_name("PAYPAL *NETFLIX.COM"), "Netflix Com");
    }

    #[test]
    fn test_clean_strips_company_suffixes() {
        assert_eq!(clean_merchant_name("Acme Widgets, Inc."), "Acme Widgets");
        assert_eq!(clean_merchant_name("ACME WIDGETS LLC STORE 7"), "Acme Widgets");
        assert_eq!(clean_merchant_name("Globex Corporation"), "Globex");
    }

    #[test]
    fn test_soundex_reference_codes() {
        assert_eq!(soundex("Robert").as_deref(), Some("R163"));
        assert_eq!(soundex("Rupert").as_deref(), Some("R163"));
        assert_eq!(soundex("Tymczak").as_deref(), Some("T522"));
        assert_eq!(soundex("Ashcraft").as_deref(), Some("A261"));
        assert_eq!(soundex("Pfister").as_deref(), Some("P236"));
        assert_eq!(soundex("Lee").as_deref(), Some("L000"));
        assert_eq!(soundex("4821"), None);
    }

    #[test]
    fn test_square_descriptor_matches_clean_name() {
        let matcher = FuzzyMatcher::default();
        let m = matcher.equals("SQ *Joe's Coffee 4821", "Joe's Coffee");
        assert!(m.matched);
        assert!(m.confidence >= 0.7);
    }

    #[test]
    fn test_typo_still_matches() {
        let matcher = FuzzyMatcher::default();
        let m = matcher.equals("Starbuks Coffee", "Starbucks Coffee");
        assert!(m.matched, "confidence was {}", m.confidence);
    }

    #[test]
    fn test_different_merchants_do_not_match() {
        let matcher = FuzzyMatcher::default();
        let m = matcher.equals("Home Depot", "Whole Foods Market");
        assert!(!m.matched, "confidence was {}", m.confidence);
    }

    #[test]
    fn test_short_strings_are_exact_only() {
        let matcher = FuzzyMatcher::default();
        assert!(matcher.equals("BP", "bp").matched);
        assert!(!matcher.equals("BP", "BQ").matched);
        assert!(!matcher.equals("AB", "ABC Corp").matched);
    }

    #[test]
    fn test_contains_exact_and_fuzzy() {
        let matcher = FuzzyMatcher::default();
        assert!(matcher.contains("AMZN MKTP US*Amazon Prime", "amazon").matched);

        let fuzzy = matcher.contains("Wallmart Supercenter 0042", "Walmart");
        assert!(fuzzy.matched, "confidence was {}", fuzzy.confidence);
        assert!(fuzzy.confidence < 1.0);

        assert!(!matcher.contains("Shell Oil", "Costco").matched);
    }

    #[test]
    fn test_scores_are_bounded() {
        let matcher = FuzzyMatcher::default();
        let s = matcher.score("abc", "xyz");
        for v in [s.edit, s.jaro_winkler, s.phonetic, s.confidence] {
            assert!((0.0..=1.0).contains(&v));
        }
        let same = matcher.score("Joes Coffee", "Joes Coffee");
        assert!((same.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_substring_threshold() {
        let cfg = FuzzyConfig::default();
        assert!((cfg.substring_threshold() - 0.56).abs() < 1e-9);
    }
}
