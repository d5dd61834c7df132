use anyhow::{bail, Result};
use log::{info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use super::JournalEntry;
use crate::common::{format_elapsed, JournalImportStats};
use crate::normalize::{JournalMapping, JournalRow, SourceFormat};
use crate::reader::{BatchReader, ReaderOptions};

/// Accumulates directory rows, merging rows that share an identity key.
/// Entries come out in the order their key was first seen.
#[derive(Debug, Default)]
pub struct DirectoryMerger {
    order: Vec<String>,
    entries: HashMap<String, JournalEntry>,
}

impl DirectoryMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the row started a new entry, false if it was merged
    pub fn add(&mut self, row: JournalRow) -> bool {
        let Some(key) = row.identity_key() else {
            return false;
        };
        match self.entries.get_mut(&key) {
            Some(existing) => {
                existing.absorb(row);
                false
            }
            None => {
                self.order.push(key.clone());
                self.entries
                    .insert(key.clone(), JournalEntry::from_row(key, row));
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn into_entries(mut self) -> Vec<JournalEntry> {
        self.order
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .collect()
    }
}

/// Read a journal directory file into de-duplicated entries (not yet persisted)
pub fn load_directory_file(
    path: &Path,
    options: ReaderOptions,
) -> Result<(Vec<JournalEntry>, JournalImportStats)> {
    info!("Loading journal directory from: {}", path.display());
    let start = Instant::now();

    let reader = BatchReader::open(path, options)?;
    match SourceFormat::detect(reader.headers()) {
        Ok(SourceFormat::Directory) => {}
        Ok(other) => bail!(
            "{} looks like a {} export, not a journal directory",
            path.display(),
            other
        ),
        Err(_) => warn!("Directory header has no subject-term column; subject terms will be empty"),
    }
    let mapping = JournalMapping::new(reader.headers())?;

    let mut merger = DirectoryMerger::new();
    let mut stats = JournalImportStats::default();

    for batch in reader {
        let batch = batch?;
        stats.rows_read += batch.rows_consumed as usize;
        stats.rows_malformed += batch.malformed as usize;

        for row in &batch.rows {
            match mapping.normalize(row) {
                Ok(journal) => {
                    if !merger.add(journal) {
                        stats.journals_merged += 1;
                    }
                }
                Err(reason) => {
                    stats.rows_rejected += 1;
                    warn!("Skipping directory row {}: {}", row.row_number(), reason);
                }
            }
        }

        info!(
            "  Processed {} rows, {} journals so far...",
            stats.rows_read,
            merger.len()
        );
    }

    let entries = merger.into_entries();
    info!(
        "Loaded {} journals from {} rows in {}",
        entries.len(),
        stats.rows_read,
        format_elapsed(start.elapsed())
    );
    if stats.rows_malformed > 0 || stats.rows_rejected > 0 {
        info!(
            "  ({} malformed rows, {} rows without identity)",
            stats.rows_malformed, stats.rows_rejected
        );
    }

    Ok((entries, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_directory_merges_duplicates() {
        let file = write_csv(
            "nlm_id,title_abbreviation,title_full,issn_print,issn_electronic,broad_subject_terms\n\
             A1,J Dent Res,Journal of Dental Research,0022-0345,,Dentistry\n\
             B2,Oral Dis,Oral Diseases,1354-523X,,Dentistry;Medicine\n\
             A1,J Dent Res,Journal of Dental Research,0022-0345,1544-0591,Medicine\n\
             ,,,,,\n",
        );

        let (entries, stats) = load_directory_file(file.path(), ReaderOptions::default()).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].nlm_id.as_deref(), Some("A1"));
        assert_eq!(entries[0].issn_electronic.as_deref(), Some("1544-0591"));
        assert_eq!(
            entries[0].subject_terms,
            vec!["Dentistry".to_string(), "Medicine".to_string()]
        );
        assert_eq!(entries[1].journal_key, "nlm:B2");
        assert_eq!(stats.rows_read, 4);
        assert_eq!(stats.journals_merged, 1);
        assert_eq!(stats.rows_rejected, 1);
    }

    #[test]
    fn test_load_directory_rejects_paper_exports() {
        let file = write_csv("pmid,coi_text,title,pubYear\n1,x,y,2020\n");
        let err = load_directory_file(file.path(), ReaderOptions::default()).unwrap_err();
        assert!(err.to_string().contains("not a journal directory"));
    }

    #[test]
    fn test_load_directory_requires_issn_column() {
        let file = write_csv("nlm_id,title_full,broad_subject_terms\nA1,X,Y\n");
        assert!(load_directory_file(file.path(), ReaderOptions::default()).is_err());
    }

    #[test]
    fn test_merger_preserves_first_seen_order() {
        let mut merger = DirectoryMerger::new();
        for title in ["Zeta", "Alpha", "Zeta", "Mid"] {
            merger.add(JournalRow {
                title_full: Some(title.to_string()),
                ..Default::default()
            });
        }
        let titles: Vec<_> = merger
            .into_entries()
            .into_iter()
            .map(|e| e.title_full.unwrap())
            .collect();
        assert_eq!(titles, vec!["Zeta", "Alpha", "Mid"]);
    }
}
