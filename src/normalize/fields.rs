//! Value-level cleaning shared by every source shape

use lazy_static::lazy_static;
use regex::Regex;
use time::{Date, Month, OffsetDateTime};

lazy_static! {
    // 2021-03-04, 2021/3/4, optionally followed by a time component
    static ref DELIMITED_DATE: Regex =
        Regex::new(r"^(\d{4})[-/](\d{1,2})[-/](\d{1,2})(?:[ T].*)?$").unwrap();

    // 20210304
    static ref COMPACT_DATE: Regex = Regex::new(r"^(\d{4})(\d{2})(\d{2})$").unwrap();

    // 2021, or 2021.0 from spreadsheet exports
    static ref YEAR_ONLY: Regex = Regex::new(r"^(\d{4})(?:\.0+)?$").unwrap();

    // 2000 - 2004: first year of a range
    static ref YEAR_RANGE: Regex = Regex::new(r"^(\d{4})\s*-\s*\d{4}$").unwrap();
}

/// Earliest publication year accepted
pub const MIN_YEAR: i32 = 1800;

/// Tokens that exporters write for a missing value
const MISSING_TOKENS: &[&str] = &["nan", "none", "null", "na", "n/a"];

const TRUE_TOKENS: &[&str] = &["true", "t", "1", "1.0", "y", "yes"];

/// Trim a raw value, mapping empty strings and missing-value tokens to `None`
pub fn clean_text(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() || MISSING_TOKENS.contains(&trimmed.to_lowercase().as_str()) {
        return None;
    }
    Some(trimmed.to_string())
}

/// Hard cut to at most `max_chars` characters, on a character boundary, no ellipsis
pub fn truncate_chars(value: String, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => value[..byte_idx].to_string(),
        None => value,
    }
}

/// `clean_text` followed by the destination length limit, if any
pub fn clean_limited(value: Option<&str>, max_chars: Option<usize>) -> Option<String> {
    let cleaned = clean_text(value)?;
    Some(match max_chars {
        Some(max) => truncate_chars(cleaned, max),
        None => cleaned,
    })
}

/// Interpret a boolean-like indicator value. Unknown tokens are false.
pub fn parse_flag(value: Option<&str>) -> bool {
    match value {
        Some(v) => TRUE_TOKENS.contains(&v.trim().to_lowercase().as_str()),
        None => false,
    }
}

/// Like `parse_flag`, but `None` when the value is missing, so optional
/// indicators can distinguish "not assessed" from "false"
pub fn parse_optional_flag(value: Option<&str>) -> Option<bool> {
    clean_text(value).map(|v| parse_flag(Some(&v)))
}

pub fn current_year() -> i32 {
    OffsetDateTime::now_utc().year()
}

fn year_in_range(year: i32) -> Option<i32> {
    if (MIN_YEAR..=current_year() + 1).contains(&year) {
        Some(year)
    } else {
        None
    }
}

/// A publication date as far as it could be recovered from the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationDate {
    pub year: i32,
    /// `YYYY-MM-DD` when the full calendar date was valid
    pub iso_date: Option<String>,
}

fn calendar_date(year: i32, month: &str, day: &str) -> Option<String> {
    let month: u8 = month.parse().ok()?;
    let day: u8 = day.parse().ok()?;
    let date = Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()?;
    Some(format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    ))
}

/// Parse `YYYY-MM-DD`, `YYYYMMDD`, `YYYY` (and a `YYYY - YYYY` range).
///
/// The year must fall within [1800, current year + 1]; anything else yields
/// `None` rather than an error.
pub fn parse_date(value: Option<&str>) -> Option<PublicationDate> {
    let value = clean_text(value)?;

    if let Some(caps) = DELIMITED_DATE
        .captures(&value)
        .or_else(|| COMPACT_DATE.captures(&value))
    {
        let year = year_in_range(caps[1].parse().ok()?)?;
        return Some(PublicationDate {
            year,
            iso_date: calendar_date(year, &caps[2], &caps[3]),
        });
    }

    let caps = YEAR_ONLY
        .captures(&value)
        .or_else(|| YEAR_RANGE.captures(&value))?;
    let year = year_in_range(caps[1].parse().ok()?)?;
    Some(PublicationDate {
        year,
        iso_date: None,
    })
}

pub fn parse_year(value: Option<&str>) -> Option<i32> {
    parse_date(value).map(|d| d.year)
}

/// Normalise an ISSN to `NNNN-NNNC`; `None` if it does not have eight significant characters
pub fn normalize_issn(value: &str) -> Option<String> {
    let compact: String = value
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X')
        .collect();

    if compact.len() == 8 {
        Some(format!("{}-{}", &compact[..4], &compact[4..]))
    } else {
        None
    }
}

/// Split a field that may carry several ISSNs (`;`, `,` or whitespace separated)
pub fn split_issns(value: Option<&str>) -> Vec<String> {
    let mut issns: Vec<String> = Vec::new();
    let Some(value) = value else {
        return issns;
    };
    for part in value.split(|c: char| c == ';' || c == ',' || c.is_whitespace()) {
        if let Some(issn) = normalize_issn(part) {
            if !issns.contains(&issn) {
                issns.push(issn);
            }
        }
    }
    issns
}

/// Split a `;`-delimited subject-term field into an ordered, de-duplicated list
pub fn split_subject_terms(value: Option<&str>) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let Some(value) = value else {
        return terms;
    };
    for term in value.split(';') {
        if let Some(term) = clean_text(Some(term)) {
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
    }
    terms
}

/// Case- and whitespace-insensitive form of a journal title used as a lookup key
pub fn normalize_title(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
