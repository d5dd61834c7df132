use serde::{Deserialize, Serialize};
use std::fmt;

/// Statistics from loading a journal directory file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalImportStats {
    pub rows_read: usize,
    pub rows_malformed: usize,
    pub rows_rejected: usize,
    pub journals_merged: usize,
    pub created: usize,
    pub updated: usize,
}

/// Statistics from re-linking stored papers against the journal directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelinkStats {
    pub papers_scanned: usize,
    pub matched: usize,
    pub changed: usize,
    pub unmatched: usize,
}

/// Why a row was dropped rather than written
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Every mapped column was empty
    EmptyRow,
    /// No stable paper key could be derived
    NoIdentifier,
    /// Directory row with neither an NLM id, an ISSN nor a title
    NoJournalIdentity,
    /// Journal linkage was required but no directory entry matched
    JournalNotMatched,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::EmptyRow => "empty_row",
            RejectReason::NoIdentifier => "no_identifier",
            RejectReason::NoJournalIdentity => "no_journal_identity",
            RejectReason::JournalNotMatched => "journal_not_matched",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            RejectReason::EmptyRow => "row has no values in any mapped column",
            RejectReason::NoIdentifier => "row has no PMCID, PMID, DOI or title to key on",
            RejectReason::NoJournalIdentity => "directory row has no NLM id, ISSN or title",
            RejectReason::JournalNotMatched => "journal could not be matched in the directory",
        };
        f.write_str(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_codes_are_stable() {
        assert_eq!(RejectReason::NoIdentifier.code(), "no_identifier");
        assert_eq!(
            serde_json::to_string(&RejectReason::JournalNotMatched).unwrap(),
            "\"journal_not_matched\""
        );
    }

    #[test]
    fn test_reject_reason_ordering_groups_by_variant() {
        let mut reasons = vec![
            RejectReason::JournalNotMatched,
            RejectReason::EmptyRow,
            RejectReason::NoIdentifier,
        ];
        reasons.sort();
        assert_eq!(reasons[0], RejectReason::EmptyRow);
        assert_eq!(reasons[2], RejectReason::JournalNotMatched);
    }
}
