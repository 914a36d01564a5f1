//! Field normalization shared by extraction post-processing, duplicate
//! matching and the reference store.
//!
//! Names: trim, collapse internal whitespace, Unicode lowercase. Diacritics
//! are preserved, so "Çelik" and "Celik" are different keys.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::models::ExtractionRecord;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static ID_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-./]").expect("valid regex"));

/// Accepted printed date layouts with a four-digit year, most specific
/// first. Month names match in any case ("14 MAR 1991", "14 March 1991").
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d.%m.%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y%m%d",
    "%d %b %Y",
    "%d %B %Y",
];

/// Machine-readable zone layout: YYMMDD.
const MRZ_DATE_FORMAT: &str = "%y%m%d";

/// Normalize a personal name for matching.
pub fn normalize_name(raw: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(raw.trim(), " ");
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.to_lowercase())
}

/// Normalize an identity number: drop separators, uppercase.
pub fn normalize_id_number(raw: &str) -> Option<String> {
    let stripped = ID_SEPARATORS.replace_all(raw.trim(), "");
    if stripped.is_empty() {
        return None;
    }
    Some(stripped.to_uppercase())
}

/// Match key for the name+birth_date rule. Requires both names.
pub fn name_key(family_name: Option<&str>, given_name: Option<&str>) -> Option<String> {
    let family = normalize_name(family_name?)?;
    let given = normalize_name(given_name?)?;
    Some(format!("{family}|{given}"))
}

/// Parse a date as printed on a document, including the six-digit MRZ
/// form. Two-digit years resolve to 1970..=2069.
pub fn parse_document_date(raw: &str) -> Option<NaiveDate> {
    parse_printed(raw).map(|(date, _)| date)
}

/// Parse a birth date. A two-digit year that would put the birth in the
/// future belongs to the previous century.
pub fn parse_birth_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let (date, two_digit_year) = parse_printed(raw)?;
    if two_digit_year && date > today {
        return date.with_year(date.year() - 100);
    }
    Some(date)
}

fn parse_printed(raw: &str) -> Option<(NaiveDate, bool)> {
    let collapsed = WHITESPACE.replace_all(raw.trim(), " ");
    if collapsed.is_empty() {
        return None;
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&collapsed, fmt).ok())
    {
        return Some((date, false));
    }
    if collapsed.len() == 6 && collapsed.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(&collapsed, MRZ_DATE_FORMAT)
            .ok()
            .map(|date| (date, true));
    }
    None
}

/// Match key for the birth date half of the name+birth_date rule: the ISO
/// date when one was parsed, else the printed text with whitespace
/// collapsed and letters uppercased.
pub fn birth_date_key(parsed: Option<NaiveDate>, printed: Option<&str>) -> Option<String> {
    if let Some(date) = parsed {
        return Some(date.to_string());
    }
    let collapsed = WHITESPACE.replace_all(printed?.trim(), " ");
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.to_uppercase())
}

/// Warning attached to documents past their expiry date.
pub const EXPIRED_WARNING: &str = "document expired";

/// Post-process one provider record: expired documents are flagged invalid.
pub fn apply_document_checks(record: &mut ExtractionRecord, today: NaiveDate) {
    let expired = record
        .expiry_date
        .as_deref()
        .and_then(parse_document_date)
        .is_some_and(|expiry| expiry < today);
    if expired {
        record.is_valid = false;
        if !record.warnings.iter().any(|w| w == EXPIRED_WARNING) {
            record.warnings.push(EXPIRED_WARNING.to_string());
        }
    }
}
