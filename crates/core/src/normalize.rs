//! Field normalization applied to whatever the extraction service returns.
//!
//! The extractor is asked to normalize values itself, but its output is
//! free-form JSON; these functions make the final values canonical so the
//! validator and the rater only ever see one spelling per value.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::domain::quote_request::{Gender, PremiumMode, Product, NO_TABLE_RATING};

/// Bare amounts below this are read as thousands ("500" means $500,000).
const SHORTHAND_THOUSANDS_CEILING: u64 = 1_000;

const STATE_NAMES: &[(&str, &str)] = &[
    ("alabama", "AL"),
    ("alaska", "AK"),
    ("arizona", "AZ"),
    ("arkansas", "AR"),
    ("california", "CA"),
    ("colorado", "CO"),
    ("connecticut", "CT"),
    ("delaware", "DE"),
    ("district of columbia", "DC"),
    ("washington dc", "DC"),
    ("washington d.c.", "DC"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("hawaii", "HI"),
    ("idaho", "ID"),
    ("illinois", "IL"),
    ("indiana", "IN"),
    ("iowa", "IA"),
    ("kansas", "KS"),
    ("kentucky", "KY"),
    ("louisiana", "LA"),
    ("maine", "ME"),
    ("maryland", "MD"),
    ("massachusetts", "MA"),
    ("michigan", "MI"),
    ("minnesota", "MN"),
    ("mississippi", "MS"),
    ("missouri", "MO"),
    ("montana", "MT"),
    ("nebraska", "NE"),
    ("nevada", "NV"),
    ("new hampshire", "NH"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("new york", "NY"),
    ("north carolina", "NC"),
    ("north dakota", "ND"),
    ("ohio", "OH"),
    ("oklahoma", "OK"),
    ("oregon", "OR"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south carolina", "SC"),
    ("south dakota", "SD"),
    ("tennessee", "TN"),
    ("texas", "TX"),
    ("utah", "UT"),
    ("vermont", "VT"),
    ("virginia", "VA"),
    ("washington", "WA"),
    ("west virginia", "WV"),
    ("wisconsin", "WI"),
    ("wyoming", "WY"),
];

/// Maps a state name or code to its upper-case two-letter form. Unknown
/// values are passed through upper-cased so validation can reject them.
pub fn state_code(raw: &str) -> Option<String> {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() {
        return None;
    }

    if collapsed.len() == 2 && collapsed.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Some(collapsed.to_ascii_uppercase());
    }

    let lowered = collapsed.to_ascii_lowercase();
    STATE_NAMES
        .iter()
        .find(|(name, _)| *name == lowered)
        .map(|(_, code)| (*code).to_string())
        .or_else(|| Some(collapsed.to_ascii_uppercase()))
}

pub fn face_amount(raw: &str) -> Option<u64> {
    let mut text = raw.trim().to_ascii_lowercase().replace([',', '$', '_'], "");
    for unit in ["dollars", "dollar", "usd"] {
        if let Some(stripped) = text.trim_end().strip_suffix(unit) {
            text = stripped.to_string();
        }
    }
    let compact: String = text.chars().filter(|ch| !ch.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    let suffixes: [(&str, u64); 6] = [
        ("million", 1_000_000),
        ("mil", 1_000_000),
        ("mm", 1_000_000),
        ("m", 1_000_000),
        ("thousand", 1_000),
        ("k", 1_000),
    ];

    let (number, multiplier) = suffixes
        .iter()
        .find_map(|(suffix, multiplier)| {
            compact.strip_suffix(suffix).map(|number| (number, Some(*multiplier)))
        })
        .unwrap_or((compact.as_str(), None));

    let amount = Decimal::from_str(number).ok()?;
    if amount.is_sign_negative() {
        return None;
    }

    let scaled = match multiplier {
        Some(multiplier) => amount.checked_mul(Decimal::from(multiplier))?,
        None if amount < Decimal::from(SHORTHAND_THOUSANDS_CEILING) => {
            amount.checked_mul(Decimal::from(1_000u64))?
        }
        None => amount,
    };

    scaled.round().to_u64()
}

/// First whole number in the text. Negative numbers are not ages; numbers too
/// large for `u32` saturate so validation reports them as out of range.
pub fn age(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    let start = trimmed.find(|ch: char| ch.is_ascii_digit())?;
    if trimmed[..start].trim_end().ends_with('-') {
        return None;
    }

    let digits: String = trimmed[start..].chars().take_while(char::is_ascii_digit).collect();
    Some(digits.parse().unwrap_or(u32::MAX))
}

pub fn gender(raw: &str) -> Option<Gender> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "male" | "m" | "man" | "men" => Some(Gender::Male),
        "female" | "f" | "woman" | "women" => Some(Gender::Female),
        _ => None,
    }
}

/// Table ratings never select a product; anything that is not the
/// guaranteed UL product is Flex Term.
pub fn product(raw: &str) -> Product {
    let lowered = raw.to_ascii_lowercase();
    if lowered.contains("guarantee") || lowered.contains("gul") {
        Product::GuaranteePlusGul
    } else {
        Product::FlexTerm
    }
}

pub fn mode(raw: &str) -> PremiumMode {
    let lowered: String = raw
        .to_ascii_lowercase()
        .chars()
        .filter(|ch| ch.is_ascii_alphabetic())
        .collect();

    match lowered.as_str() {
        "semiannual" | "semiannually" | "biannual" | "twiceayear" => PremiumMode::SemiAnnual,
        "quarterly" | "quarter" => PremiumMode::Quarterly,
        "monthly" | "month" => PremiumMode::Monthly,
        _ => PremiumMode::Annual,
    }
}

/// Produces `Table <letter>` from phrases like "table c", "Table 3" or a
/// bare letter; everything else is `None`.
pub fn table_rating(raw: &str) -> String {
    let lowered = collapse_whitespace(raw).to_ascii_lowercase();
    let candidate = match lowered.find("table") {
        Some(index) => lowered[index + "table".len()..].trim().to_string(),
        None if lowered.len() == 1 => lowered,
        None => return NO_TABLE_RATING.to_string(),
    };

    let token = candidate.split_whitespace().next().unwrap_or_default();
    if let Ok(number) = token.parse::<u8>() {
        if (1..=16).contains(&number) {
            let letter = char::from(b'A' + number - 1);
            return format!("Table {letter}");
        }
        return NO_TABLE_RATING.to_string();
    }

    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_ascii_alphabetic() => {
            format!("Table {}", letter.to_ascii_uppercase())
        }
        _ => NO_TABLE_RATING.to_string(),
    }
}

/// First non-negative number in the text, zero when none is stated.
pub fn flat_extra(raw: &str) -> Decimal {
    raw.split(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .map(|token| token.trim_matches('.'))
        .find(|token| !token.is_empty())
        .and_then(|token| Decimal::from_str(token).ok())
        .unwrap_or(Decimal::ZERO)
}

pub fn recipient(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches(|ch| ch == '<' || ch == '>');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
