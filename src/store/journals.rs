use anyhow::Result;
use rusqlite::{named_params, OptionalExtension, Row};

use super::Store;
use crate::directory::{merge_terms, JournalEntry};
use crate::normalize::split_subject_terms;

/// Created/updated tallies from a directory upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub created: usize,
    pub updated: usize,
}

const INSERT_JOURNAL: &str = "
    INSERT INTO journals (
        journal_key, nlm_id, title_abbreviation, title_full, publisher, country,
        issn_electronic, issn_print, issn_linking, broad_subject_terms, subject_term_count
    ) VALUES (
        :journal_key, :nlm_id, :title_abbreviation, :title_full, :publisher, :country,
        :issn_electronic, :issn_print, :issn_linking, :broad_subject_terms, :subject_term_count
    )";

// Fields missing from the new row keep their stored value
const UPDATE_JOURNAL: &str = "
    UPDATE journals SET
        nlm_id = COALESCE(:nlm_id, nlm_id),
        title_abbreviation = COALESCE(:title_abbreviation, title_abbreviation),
        title_full = COALESCE(:title_full, title_full),
        publisher = COALESCE(:publisher, publisher),
        country = COALESCE(:country, country),
        issn_electronic = COALESCE(:issn_electronic, issn_electronic),
        issn_print = COALESCE(:issn_print, issn_print),
        issn_linking = COALESCE(:issn_linking, issn_linking),
        broad_subject_terms = :broad_subject_terms,
        subject_term_count = :subject_term_count
    WHERE id = :id";

fn journal_from_row(row: &Row) -> rusqlite::Result<JournalEntry> {
    let terms: Option<String> = row.get("broad_subject_terms")?;
    Ok(JournalEntry {
        id: row.get("id")?,
        journal_key: row.get("journal_key")?,
        nlm_id: row.get("nlm_id")?,
        title_abbreviation: row.get("title_abbreviation")?,
        title_full: row.get("title_full")?,
        publisher: row.get("publisher")?,
        country: row.get("country")?,
        issn_electronic: row.get("issn_electronic")?,
        issn_print: row.get("issn_print")?,
        issn_linking: row.get("issn_linking")?,
        subject_terms: split_subject_terms(terms.as_deref()),
    })
}

impl Store {
    /// Insert new journals and update known ones in a single transaction.
    ///
    /// A reload unions subject terms: terms already stored keep their
    /// position and new terms are appended.
    pub fn upsert_journals(&mut self, entries: &[JournalEntry]) -> Result<UpsertCounts> {
        let tx = self.conn.transaction()?;
        let mut counts = UpsertCounts::default();
        {
            let mut lookup = tx.prepare_cached(
                "SELECT id, broad_subject_terms FROM journals WHERE journal_key = ?1",
            )?;
            let mut insert = tx.prepare_cached(INSERT_JOURNAL)?;
            let mut update = tx.prepare_cached(UPDATE_JOURNAL)?;

            for entry in entries {
                let existing: Option<(i64, Option<String>)> = lookup
                    .query_row([&entry.journal_key], |row| Ok((row.get(0)?, row.get(1)?)))
                    .optional()?;

                match existing {
                    Some((id, stored_terms)) => {
                        let mut terms = split_subject_terms(stored_terms.as_deref());
                        merge_terms(&mut terms, entry.subject_terms.iter().cloned());
                        let joined = if terms.is_empty() {
                            None
                        } else {
                            Some(terms.join(";"))
                        };
                        update.execute(named_params! {
                            ":id": id,
                            ":nlm_id": entry.nlm_id,
                            ":title_abbreviation": entry.title_abbreviation,
                            ":title_full": entry.title_full,
                            ":publisher": entry.publisher,
                            ":country": entry.country,
                            ":issn_electronic": entry.issn_electronic,
                            ":issn_print": entry.issn_print,
                            ":issn_linking": entry.issn_linking,
                            ":broad_subject_terms": joined,
                            ":subject_term_count": terms.len() as i64,
                        })?;
                        counts.updated += 1;
                    }
                    None => {
                        insert.execute(named_params! {
                            ":journal_key": entry.journal_key,
                            ":nlm_id": entry.nlm_id,
                            ":title_abbreviation": entry.title_abbreviation,
                            ":title_full": entry.title_full,
                            ":publisher": entry.publisher,
                            ":country": entry.country,
                            ":issn_electronic": entry.issn_electronic,
                            ":issn_print": entry.issn_print,
                            ":issn_linking": entry.issn_linking,
                            ":broad_subject_terms": entry.subject_terms_joined(),
                            ":subject_term_count": entry.subject_terms.len() as i64,
                        })?;
                        counts.created += 1;
                    }
                }
            }
        }
        tx.commit()?;
        Ok(counts)
    }

    /// Every stored journal in insertion order, with store ids
    pub fn load_journals(&self) -> Result<Vec<JournalEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, journal_key, nlm_id, title_abbreviation, title_full, publisher, country,
                    issn_electronic, issn_print, issn_linking, broad_subject_terms
             FROM journals ORDER BY id",
        )?;
        let journals = stmt
            .query_map([], journal_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(journals)
    }

    pub fn count_journals(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM journals", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn journal(key: &str, title: &str, terms: &[&str]) -> JournalEntry {
        JournalEntry {
            journal_key: key.to_string(),
            title_full: Some(title.to_string()),
            issn_print: Some("0022-0345".to_string()),
            subject_terms: terms.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_and_load() {
        let mut store = Store::open_in_memory().unwrap();
        let counts = store
            .upsert_journals(&[
                journal("nlm:1", "Journal of Dental Research", &["Dentistry"]),
                journal("nlm:2", "Oral Diseases", &[]),
            ])
            .unwrap();
        assert_eq!(counts, UpsertCounts { created: 2, updated: 0 });

        let loaded = store.load_journals().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded[0].id > 0);
        assert_eq!(loaded[0].title_full.as_deref(), Some("Journal of Dental Research"));
        assert_eq!(loaded[0].subject_terms, vec!["Dentistry".to_string()]);
        assert!(loaded[1].subject_terms.is_empty());
    }

    #[test]
    fn test_reload_merges_subject_terms_and_keeps_id() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .upsert_journals(&[journal("nlm:1", "J", &["Dentistry", "Medicine"])])
            .unwrap();
        let first_id = store.load_journals().unwrap()[0].id;

        let mut reload = journal("nlm:1", "J", &["Medicine", "Surgery"]);
        reload.publisher = Some("Sage".to_string());
        reload.issn_print = None;
        let counts = store.upsert_journals(&[reload]).unwrap();
        assert_eq!(counts, UpsertCounts { created: 0, updated: 1 });

        let loaded = store.load_journals().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, first_id);
        assert_eq!(
            loaded[0].subject_terms,
            vec!["Dentistry".to_string(), "Medicine".to_string(), "Surgery".to_string()]
        );
        assert_eq!(loaded[0].publisher.as_deref(), Some("Sage"));
        // a missing value does not erase the stored one
        assert_eq!(loaded[0].issn_print.as_deref(), Some("0022-0345"));

        let count: i64 = store
            .connection()
            .query_row("SELECT subject_term_count FROM journals", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }
}
