//! Aggregate views over the stored corpus.
//!
//! A paper belongs to every broad subject term of its linked journal, so
//! category totals can add up to more than the number of papers. Papers
//! without a journal (or whose journal has no terms) are reported as
//! `Unclassified`.

use anyhow::Result;
use std::collections::BTreeMap;

use super::Store;
use crate::common::percent;
use crate::normalize::split_subject_terms;
use crate::score::round_one_decimal;

pub const UNCLASSIFIED: &str = "Unclassified";

/// Papers, average score and indicator prevalence for one category or year
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub label: String,
    pub papers: u64,
    pub avg_score: f64,
    pub avg_percentage: f64,
    pub coi_pct: f64,
    pub funding_pct: f64,
    pub registration_pct: f64,
    pub open_data_pct: f64,
    pub open_code_pct: f64,
    pub open_access_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusStats {
    pub papers: u64,
    pub linked_papers: u64,
    pub journals: u64,
    pub avg_percentage: f64,
}

impl CorpusStats {
    pub fn link_rate(&self) -> f64 {
        percent(self.linked_papers as usize, self.papers as usize)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    papers: u64,
    score_sum: f64,
    pct_sum: f64,
    coi: u64,
    funding: u64,
    registration: u64,
    open_data: u64,
    open_code: u64,
    open_access: u64,
}

impl Accumulator {
    fn add(&mut self, other: &Accumulator) {
        self.papers += other.papers;
        self.score_sum += other.score_sum;
        self.pct_sum += other.pct_sum;
        self.coi += other.coi;
        self.funding += other.funding;
        self.registration += other.registration;
        self.open_data += other.open_data;
        self.open_code += other.open_code;
        self.open_access += other.open_access;
    }

    fn finish(&self, label: String) -> GroupStats {
        let n = self.papers as usize;
        let avg = |sum: f64| {
            if n == 0 {
                0.0
            } else {
                sum / n as f64
            }
        };
        let share = |count: u64| round_one_decimal(percent(count as usize, n));
        GroupStats {
            label,
            papers: self.papers,
            avg_score: (avg(self.score_sum) * 100.0).round() / 100.0,
            avg_percentage: round_one_decimal(avg(self.pct_sum)),
            coi_pct: share(self.coi),
            funding_pct: share(self.funding),
            registration_pct: share(self.registration),
            open_data_pct: share(self.open_data),
            open_code_pct: share(self.open_code),
            open_access_pct: share(self.open_access),
        }
    }
}

const AGGREGATES: &str = "
    COUNT(*), SUM(p.transparency_score), SUM(p.transparency_score_pct),
    SUM(p.is_coi_pred), SUM(p.is_fund_pred), SUM(p.is_register_pred),
    SUM(p.is_open_data), SUM(p.is_open_code), SUM(p.is_open_access)";

fn accumulator_from(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Accumulator> {
    let count = |idx: usize| -> rusqlite::Result<u64> {
        Ok(row.get::<_, Option<i64>>(offset + idx)?.unwrap_or(0) as u64)
    };
    Ok(Accumulator {
        papers: count(0)?,
        score_sum: row.get::<_, Option<f64>>(offset + 1)?.unwrap_or(0.0),
        pct_sum: row.get::<_, Option<f64>>(offset + 2)?.unwrap_or(0.0),
        coi: count(3)?,
        funding: count(4)?,
        registration: count(5)?,
        open_data: count(6)?,
        open_code: count(7)?,
        open_access: count(8)?,
    })
}

fn sorted_by_size(groups: BTreeMap<String, Accumulator>) -> Vec<GroupStats> {
    let mut stats: Vec<GroupStats> = groups
        .into_iter()
        .map(|(label, acc)| acc.finish(label))
        .collect();
    stats.sort_by(|a, b| b.papers.cmp(&a.papers).then_with(|| a.label.cmp(&b.label)));
    stats
}

impl Store {
    /// Per-subject-term statistics, largest categories first
    pub fn category_stats(&self) -> Result<Vec<GroupStats>> {
        let sql = format!(
            "SELECT j.broad_subject_terms, {}
             FROM papers p LEFT JOIN journals j ON p.journal_id = j.id
             GROUP BY j.broad_subject_terms",
            AGGREGATES
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let terms: Option<String> = row.get(0)?;
            let acc = accumulator_from(row, 1)?;
            let terms = split_subject_terms(terms.as_deref());
            if terms.is_empty() {
                groups.entry(UNCLASSIFIED.to_string()).or_default().add(&acc);
            } else {
                for term in terms {
                    groups.entry(term).or_default().add(&acc);
                }
            }
        }
        Ok(sorted_by_size(groups))
    }

    /// Per-publication-year statistics in year order; papers without a year are omitted
    pub fn year_stats(&self) -> Result<Vec<GroupStats>> {
        let sql = format!(
            "SELECT p.pub_year, {}
             FROM papers p WHERE p.pub_year IS NOT NULL
             GROUP BY p.pub_year ORDER BY p.pub_year",
            AGGREGATES
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let stats = stmt
            .query_map([], |row| {
                let year: i64 = row.get(0)?;
                Ok(accumulator_from(row, 1)?.finish(year.to_string()))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stats)
    }

    pub fn corpus_stats(&self) -> Result<CorpusStats> {
        let (papers, linked, avg): (i64, i64, Option<f64>) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(journal_id), AVG(transparency_score_pct) FROM papers",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(CorpusStats {
            papers: papers as u64,
            linked_papers: linked as u64,
            journals: self.count_journals()?,
            avg_percentage: round_one_decimal(avg.unwrap_or(0.0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::JournalEntry;
    use crate::store::papers::tests::paper;
    use crate::store::WriteMode;

    fn seeded_store() -> Store {
        let mut store = Store::open_in_memory().unwrap();
        store
            .upsert_journals(&[
                JournalEntry {
                    journal_key: "nlm:1".into(),
                    title_full: Some("Dental".into()),
                    subject_terms: vec!["Dentistry".into(), "Medicine".into()],
                    ..Default::default()
                },
                JournalEntry {
                    journal_key: "nlm:2".into(),
                    title_full: Some("Med".into()),
                    subject_terms: vec!["Medicine".into()],
                    ..Default::default()
                },
            ])
            .unwrap();
        let ids: Vec<i64> = store.load_journals().unwrap().iter().map(|j| j.id).collect();

        let mut a = paper("PMID1", "A");
        a.journal_id = Some(ids[0]);
        let mut b = paper("PMID2", "B");
        b.journal_id = Some(ids[1]);
        b.record.indicators.open_data = false;
        b.score = crate::score::compute_score(&b.record.indicators);
        b.record.pub_year = Some(2020);
        let c = paper("PMID3", "C");

        store.write_papers(&[a, b, c], WriteMode::CreateOnly).unwrap();
        store
    }

    #[test]
    fn test_category_stats_counts_every_term() {
        let store = seeded_store();
        let stats = store.category_stats().unwrap();

        let labels: Vec<&str> = stats.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Medicine", "Dentistry", "Unclassified"]);

        let medicine = &stats[0];
        assert_eq!(medicine.papers, 2);
        assert_eq!(medicine.open_data_pct, 50.0);
        assert_eq!(medicine.coi_pct, 100.0);
        assert_eq!(medicine.avg_percentage, 30.0);
        assert_eq!(medicine.avg_score, 1.5);

        assert_eq!(stats[1].papers, 1);
        assert_eq!(stats[2].papers, 1);
    }

    #[test]
    fn test_year_stats() {
        let store = seeded_store();
        let stats = store.year_stats().unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].label, "2020");
        assert_eq!(stats[0].papers, 1);
        assert_eq!(stats[1].label, "2021");
        assert_eq!(stats[1].papers, 2);
    }

    #[test]
    fn test_corpus_stats() {
        let store = seeded_store();
        let corpus = store.corpus_stats().unwrap();
        assert_eq!(corpus.papers, 3);
        assert_eq!(corpus.linked_papers, 2);
        assert_eq!(corpus.journals, 2);
        assert_eq!(round_one_decimal(corpus.link_rate()), 66.7);
    }

    #[test]
    fn test_empty_store_stats() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.category_stats().unwrap().is_empty());
        assert_eq!(store.corpus_stats().unwrap().avg_percentage, 0.0);
    }
}
