//! Stable per-paper keys.
//!
//! A row's key is chosen by identifier priority: an explicit key column,
//! then PMCID, PMID, DOI, and finally a hash of title, journal and year.
//! The same inputs always produce the same key, so re-ingesting a file maps
//! every row onto the record it created before.

use crate::common::RejectReason;
use crate::normalize::{normalize_title, PaperRecord};
use sha2::{Digest, Sha256};

const DOI_HASH_LEN: usize = 8;
const FALLBACK_HASH_LEN: usize = 16;

fn hex_digest(input: &str, len: usize) -> String {
    let digest = format!("{:x}", Sha256::digest(input.as_bytes()));
    digest[..len].to_string()
}

/// `PMC` followed by the numeric part, whatever prefix casing the source used
pub fn pmcid_key(pmcid: &str) -> Option<String> {
    let trimmed = pmcid.trim();
    let body = match trimmed.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("PMC") => &trimmed[3..],
        _ => trimmed,
    };
    let body = body.trim();
    if body.is_empty() {
        None
    } else {
        Some(format!("PMC{}", body))
    }
}

pub fn pmid_key(pmid: &str) -> Option<String> {
    let trimmed = pmid.trim();
    let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("PMID{}", trimmed))
    }
}

/// DOIs are case-insensitive, so the hash is taken over the lowercased form
pub fn doi_key(doi: &str) -> Option<String> {
    let normalized = doi.trim().to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(format!("DOI{}", hex_digest(&normalized, DOI_HASH_LEN)))
    }
}

/// Last resort for rows with a title but no identifiers
pub fn fallback_key(title: &str, journal: Option<&str>, year: Option<i32>) -> Option<String> {
    let title = normalize_title(title);
    if title.is_empty() {
        return None;
    }
    let journal = journal.map(normalize_title).unwrap_or_default();
    let year = year.map(|y| y.to_string()).unwrap_or_default();
    let material = format!("{}|{}|{}", title, journal, year);
    Some(format!("HASH{}", hex_digest(&material, FALLBACK_HASH_LEN)))
}

/// Derive the stable key for a normalised paper
pub fn resolve_key(record: &PaperRecord) -> Result<String, RejectReason> {
    if let Some(key) = record.unique_key.as_deref().map(str::trim) {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    record
        .pmcid
        .as_deref()
        .and_then(pmcid_key)
        .or_else(|| record.pmid.as_deref().and_then(pmid_key))
        .or_else(|| record.doi.as_deref().and_then(doi_key))
        .or_else(|| {
            record.title.as_deref().and_then(|title| {
                fallback_key(title, record.journal_title.as_deref(), record.pub_year)
            })
        })
        .ok_or(RejectReason::NoIdentifier)
}
