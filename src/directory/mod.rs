pub mod builder;
pub mod linker;

pub use builder::*;
pub use linker::*;

use crate::normalize::{normalize_issn, normalize_title, JournalRow};
use std::collections::HashMap;

/// One journal in the reference directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalEntry {
    /// Store row id; 0 until persisted
    pub id: i64,
    /// Identity the directory was de-duplicated on (`nlm:`, `issn:` or `title:` prefixed)
    pub journal_key: String,
    pub nlm_id: Option<String>,
    pub title_abbreviation: Option<String>,
    pub title_full: Option<String>,
    pub publisher: Option<String>,
    pub country: Option<String>,
    pub issn_electronic: Option<String>,
    pub issn_print: Option<String>,
    pub issn_linking: Option<String>,
    /// Broad subject terms in source order, without duplicates
    pub subject_terms: Vec<String>,
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}

/// Append terms not already present, keeping the existing order first
pub fn merge_terms(existing: &mut Vec<String>, new_terms: impl IntoIterator<Item = String>) {
    for term in new_terms {
        if !existing.contains(&term) {
            existing.push(term);
        }
    }
}

impl JournalEntry {
    pub fn from_row(journal_key: String, row: JournalRow) -> Self {
        Self {
            id: 0,
            journal_key,
            nlm_id: row.nlm_id,
            title_abbreviation: row.title_abbreviation,
            title_full: row.title_full,
            publisher: row.publisher,
            country: row.country,
            issn_electronic: row.issn_electronic,
            issn_print: row.issn_print,
            issn_linking: row.issn_linking,
            subject_terms: row.subject_terms,
        }
    }

    /// Fold a duplicate directory row into this entry: fields already set
    /// keep their first-seen value, subject terms are unioned
    pub fn absorb(&mut self, row: JournalRow) {
        fill(&mut self.nlm_id, row.nlm_id);
        fill(&mut self.title_abbreviation, row.title_abbreviation);
        fill(&mut self.title_full, row.title_full);
        fill(&mut self.publisher, row.publisher);
        fill(&mut self.country, row.country);
        fill(&mut self.issn_electronic, row.issn_electronic);
        fill(&mut self.issn_print, row.issn_print);
        fill(&mut self.issn_linking, row.issn_linking);
        merge_terms(&mut self.subject_terms, row.subject_terms);
    }

    /// Category assigned to papers linked to this journal
    pub fn primary_subject(&self) -> Option<&str> {
        self.subject_terms.first().map(String::as_str)
    }

    pub fn subject_terms_joined(&self) -> Option<String> {
        if self.subject_terms.is_empty() {
            None
        } else {
            Some(self.subject_terms.join(";"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IssnKind {
    Electronic,
    Print,
    Linking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TitleKind {
    Full,
    Abbreviated,
}

/// In-memory journal directory indexed for linkage.
///
/// Built once per run and only read afterwards, so it can be shared across
/// worker threads.
#[derive(Debug, Default)]
pub struct JournalDirectory {
    entries: Vec<JournalEntry>,
    by_issn: HashMap<String, Vec<(IssnKind, usize)>>,
    by_title: HashMap<String, Vec<(TitleKind, usize)>>,
    full_titles: Vec<Option<String>>,
}

impl JournalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index entries in the given order; earlier entries win ties
    pub fn from_entries(entries: Vec<JournalEntry>) -> Self {
        let mut directory = Self {
            entries: Vec::with_capacity(entries.len()),
            by_issn: HashMap::with_capacity(entries.len() * 2),
            by_title: HashMap::with_capacity(entries.len() * 2),
            full_titles: Vec::with_capacity(entries.len()),
        };
        for entry in entries {
            directory.insert(entry);
        }
        directory
    }

    pub fn insert(&mut self, entry: JournalEntry) {
        let idx = self.entries.len();

        for (kind, issn) in [
            (IssnKind::Electronic, &entry.issn_electronic),
            (IssnKind::Print, &entry.issn_print),
            (IssnKind::Linking, &entry.issn_linking),
        ] {
            if let Some(issn) = issn {
                let key = normalize_issn(issn).unwrap_or_else(|| issn.clone());
                self.by_issn.entry(key).or_default().push((kind, idx));
            }
        }

        let full = entry
            .title_full
            .as_deref()
            .map(normalize_title)
            .filter(|t| !t.is_empty());
        if let Some(title) = &full {
            self.by_title
                .entry(title.clone())
                .or_default()
                .push((TitleKind::Full, idx));
        }
        if let Some(abbrev) = entry
            .title_abbreviation
            .as_deref()
            .map(normalize_title)
            .filter(|t| !t.is_empty())
        {
            self.by_title
                .entry(abbrev)
                .or_default()
                .push((TitleKind::Abbreviated, idx));
        }

        self.full_titles.push(full);
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct ISSNs indexed
    pub fn issn_count(&self) -> usize {
        self.by_issn.len()
    }
}
