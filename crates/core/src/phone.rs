//! Phone number normalization and deduplication.
//!
//! Normalization is a pure function: raw input plus an optional default
//! country yields an E.164 string or nothing. Numbers that already carry a
//! `+` prefix are taken as international; national-format numbers are
//! resolved through a dialing-prefix table and require a default country.

use std::collections::HashSet;

/// E.164 allows at most 15 digits after the `+`.
const MAX_E164_DIGITS: usize = 15;
/// Shortest assignable international number we accept.
const MIN_E164_DIGITS: usize = 7;

/// ISO 3166-1 alpha-2 → country dialing prefix, for the markets the service
/// operates in.
const DIAL_PREFIXES: &[(&str, &str)] = &[
    ("AE", "971"),
    ("AU", "61"),
    ("BD", "880"),
    ("BR", "55"),
    ("CN", "86"),
    ("DE", "49"),
    ("EG", "20"),
    ("ES", "34"),
    ("FR", "33"),
    ("GB", "44"),
    ("ID", "62"),
    ("IN", "91"),
    ("IT", "39"),
    ("JP", "81"),
    ("KR", "82"),
    ("MX", "52"),
    ("MY", "60"),
    ("NG", "234"),
    ("NL", "31"),
    ("PH", "63"),
    ("PK", "92"),
    ("RU", "7"),
    ("SA", "966"),
    ("SG", "65"),
    ("TH", "66"),
    ("TR", "90"),
    ("US", "1"),
    ("VN", "84"),
];

fn dial_prefix(country: &str) -> Option<&'static str> {
    let upper = country.to_ascii_uppercase();
    DIAL_PREFIXES
        .iter()
        .find(|(cc, _)| *cc == upper)
        .map(|(_, prefix)| *prefix)
}

/// Normalizes a raw number to E.164 (`+` and up to 15 digits).
///
/// Returns `None` for anything that cannot be resolved to a plausible
/// international number: too short, too long, or national format without a
/// known default country.
pub fn normalize(raw: &str, default_country: Option<&str>) -> Option<String> {
    let has_plus = raw.trim_start().starts_with('+');
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() {
        return None;
    }

    let e164_digits = if has_plus {
        digits
    } else {
        let prefix = default_country.and_then(dial_prefix)?;
        // National format: drop the trunk zero before prepending the prefix.
        let national = digits.trim_start_matches('0');
        if national.is_empty() {
            return None;
        }
        format!("{prefix}{national}")
    };

    if e164_digits.len() < MIN_E164_DIGITS
        || e164_digits.len() > MAX_E164_DIGITS
        || e164_digits.starts_with('0')
    {
        return None;
    }

    Some(format!("+{e164_digits}"))
}

/// Result of normalizing and deduplicating a raw number list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedBatch {
    /// Unique E.164 numbers, in first-seen order.
    pub unique: Vec<String>,
    /// Count of inputs that failed normalization.
    pub invalid_count: u64,
    /// raw inputs minus unique normalized outputs minus invalids.
    pub duplicates_count: u64,
}

/// Normalizes every raw number and deduplicates by normalized value.
/// Idempotent: feeding the unique output back in yields the same set.
pub fn normalize_and_dedupe(numbers: &[String], default_country: Option<&str>) -> NormalizedBatch {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut invalid = 0u64;
    let mut duplicates = 0u64;

    for raw in numbers {
        match normalize(raw, default_country) {
            Some(e164) => {
                if seen.insert(e164.clone()) {
                    unique.push(e164);
                } else {
                    duplicates += 1;
                }
            }
            None => invalid += 1,
        }
    }

    NormalizedBatch {
        unique,
        invalid_count: invalid,
        duplicates_count: duplicates,
    }
}
