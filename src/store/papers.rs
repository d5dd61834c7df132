use anyhow::Result;
use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{params, OptionalExtension, Row};

use super::{BatchCounts, Store, WriteMode};
use crate::normalize::{PaperRecord, SourceFormat};
use crate::score::TransparencyScore;

/// A keyed, linked and scored paper ready to persist
#[derive(Debug, Clone, PartialEq)]
pub struct PaperRow {
    pub key: String,
    pub record: PaperRecord,
    pub journal_id: Option<i64>,
    /// Primary subject term of the linked journal
    pub category: Option<String>,
    pub score: TransparencyScore,
}

/// A paper as read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPaper {
    pub id: i64,
    pub unique_key: String,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub journal_title: Option<String>,
    pub journal_issn: Option<String>,
    pub pub_year: Option<i32>,
    pub is_coi_pred: bool,
    pub is_fund_pred: bool,
    pub is_register_pred: bool,
    pub is_open_data: bool,
    pub is_open_code: bool,
    pub is_replication: Option<bool>,
    pub is_novelty: Option<bool>,
    pub transparency_score: u32,
    pub transparency_score_pct: f64,
    pub journal_id: Option<i64>,
    pub broad_subject_category: Option<String>,
    pub assessment_tool: String,
    pub source_format: String,
}

/// The fields relinking needs from a stored paper
#[derive(Debug, Clone, PartialEq)]
pub struct LinkCandidate {
    pub id: i64,
    pub journal_title: Option<String>,
    pub journal_issn: Option<String>,
    /// Every normalised ISSN of the source row, `;`-joined
    pub journal_issns: Option<String>,
    pub journal_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkUpdate {
    pub id: i64,
    pub journal_id: Option<i64>,
    pub category: Option<String>,
}

impl ToSql for SourceFormat {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

const PAPER_COLUMNS: &[&str] = &[
    "unique_key",
    "pmid",
    "pmcid",
    "doi",
    "title",
    "author_string",
    "journal_title",
    "journal_issn",
    "journal_issns",
    "pub_year",
    "first_publication_date",
    "journal_volume",
    "issue",
    "page_info",
    "pub_type",
    "is_open_access",
    "is_coi_pred",
    "is_fund_pred",
    "is_register_pred",
    "is_open_data",
    "is_open_code",
    "is_replication",
    "is_novelty",
    "coi_text",
    "fund_text",
    "register_text",
    "open_data_category",
    "open_data_statements",
    "open_code_statements",
    "transparency_score",
    "transparency_score_pct",
    "journal_id",
    "broad_subject_category",
    "assessment_tool",
    "source_format",
];

fn insert_sql() -> String {
    let placeholders: Vec<String> = PAPER_COLUMNS.iter().map(|c| format!(":{}", c)).collect();
    format!(
        "INSERT INTO papers ({}) VALUES ({})",
        PAPER_COLUMNS.join(", "),
        placeholders.join(", ")
    )
}

/// Full overwrite of everything except the row id
fn update_sql() -> String {
    let assignments: Vec<String> = PAPER_COLUMNS
        .iter()
        .filter(|c| **c != "unique_key")
        .map(|c| format!("{} = :{}", c, c))
        .collect();
    format!(
        "UPDATE papers SET {} WHERE unique_key = :unique_key",
        assignments.join(", ")
    )
}

/// Named parameters for one paper, in `PAPER_COLUMNS` order
fn bind_paper<'a>(
    paper: &'a PaperRow,
    issns: &'a Option<String>,
) -> [(&'static str, &'a dyn ToSql); 35] {
    let r = &paper.record;
    [
        (":unique_key", &paper.key),
        (":pmid", &r.pmid),
        (":pmcid", &r.pmcid),
        (":doi", &r.doi),
        (":title", &r.title),
        (":author_string", &r.author_string),
        (":journal_title", &r.journal_title),
        (":journal_issn", &r.journal_issn),
        (":journal_issns", issns),
        (":pub_year", &r.pub_year),
        (":first_publication_date", &r.publication_date),
        (":journal_volume", &r.journal_volume),
        (":issue", &r.issue),
        (":page_info", &r.page_info),
        (":pub_type", &r.pub_type),
        (":is_open_access", &r.is_open_access),
        (":is_coi_pred", &r.indicators.coi_disclosed),
        (":is_fund_pred", &r.indicators.funding_disclosed),
        (":is_register_pred", &r.indicators.registered),
        (":is_open_data", &r.indicators.open_data),
        (":is_open_code", &r.indicators.open_code),
        (":is_replication", &r.indicators.replication),
        (":is_novelty", &r.indicators.novelty),
        (":coi_text", &r.evidence.coi_text),
        (":fund_text", &r.evidence.fund_text),
        (":register_text", &r.evidence.register_text),
        (":open_data_category", &r.evidence.open_data_category),
        (":open_data_statements", &r.evidence.open_data_statements),
        (":open_code_statements", &r.evidence.open_code_statements),
        (":transparency_score", &paper.score.score),
        (":transparency_score_pct", &paper.score.percentage),
        (":journal_id", &paper.journal_id),
        (":broad_subject_category", &paper.category),
        (":assessment_tool", &r.assessment_tool),
        (":source_format", &r.source_format),
    ]
}

fn join_issns(issns: &[String]) -> Option<String> {
    if issns.is_empty() {
        None
    } else {
        Some(issns.join(";"))
    }
}

const SELECT_STORED: &str = "
    SELECT id, unique_key, pmid, pmcid, doi, title, journal_title, journal_issn, pub_year,
           is_coi_pred, is_fund_pred, is_register_pred, is_open_data, is_open_code,
           is_replication, is_novelty, transparency_score, transparency_score_pct,
           journal_id, broad_subject_category, assessment_tool, source_format
    FROM papers";

fn stored_from_row(row: &Row) -> rusqlite::Result<StoredPaper> {
    Ok(StoredPaper {
        id: row.get("id")?,
        unique_key: row.get("unique_key")?,
        pmid: row.get("pmid")?,
        pmcid: row.get("pmcid")?,
        doi: row.get("doi")?,
        title: row.get("title")?,
        journal_title: row.get("journal_title")?,
        journal_issn: row.get("journal_issn")?,
        pub_year: row.get("pub_year")?,
        is_coi_pred: row.get("is_coi_pred")?,
        is_fund_pred: row.get("is_fund_pred")?,
        is_register_pred: row.get("is_register_pred")?,
        is_open_data: row.get("is_open_data")?,
        is_open_code: row.get("is_open_code")?,
        is_replication: row.get("is_replication")?,
        is_novelty: row.get("is_novelty")?,
        transparency_score: row.get("transparency_score")?,
        transparency_score_pct: row.get("transparency_score_pct")?,
        journal_id: row.get("journal_id")?,
        broad_subject_category: row.get("broad_subject_category")?,
        assessment_tool: row.get("assessment_tool")?,
        source_format: row.get("source_format")?,
    })
}

impl Store {
    /// Write a batch of papers in one transaction.
    ///
    /// Rows whose key is already stored are skipped in `CreateOnly` mode and
    /// overwritten in `CreateOrUpdate` mode. Duplicate keys inside the batch
    /// are handled in order, so the first occurrence creates the record.
    pub fn write_papers(&mut self, rows: &[PaperRow], mode: WriteMode) -> Result<BatchCounts> {
        let tx = self.conn.transaction()?;
        let mut counts = BatchCounts::default();
        {
            let mut exists = tx.prepare_cached("SELECT 1 FROM papers WHERE unique_key = ?1")?;
            let mut insert = tx.prepare_cached(&insert_sql())?;
            let mut update = tx.prepare_cached(&update_sql())?;

            for paper in rows {
                if paper.key.is_empty() {
                    counts.rejected += 1;
                    continue;
                }

                let issns = join_issns(&paper.record.issns);
                let params = bind_paper(paper, &issns);
                if exists.exists([&paper.key])? {
                    match mode {
                        WriteMode::CreateOnly => counts.skipped += 1,
                        WriteMode::CreateOrUpdate => {
                            update.execute(&params[..])?;
                            counts.updated += 1;
                        }
                    }
                } else {
                    insert.execute(&params[..])?;
                    counts.created += 1;
                }
            }
        }
        tx.commit()?;
        Ok(counts)
    }

    pub fn count_papers(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn get_paper(&self, key: &str) -> Result<Option<StoredPaper>> {
        let sql = format!("{} WHERE unique_key = ?1", SELECT_STORED);
        let paper = self
            .conn
            .query_row(&sql, [key], stored_from_row)
            .optional()?;
        Ok(paper)
    }

    /// All stored papers ordered by key
    pub fn papers(&self) -> Result<Vec<StoredPaper>> {
        let sql = format!("{} ORDER BY unique_key", SELECT_STORED);
        let mut stmt = self.conn.prepare(&sql)?;
        let papers = stmt
            .query_map([], stored_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(papers)
    }

    /// Next page of papers after `after_id`, for keyset-paginated relinking
    pub fn link_candidates(
        &self,
        after_id: i64,
        limit: usize,
        only_unlinked: bool,
    ) -> Result<Vec<LinkCandidate>> {
        let sql = if only_unlinked {
            "SELECT id, journal_title, journal_issn, journal_issns, journal_id FROM papers
             WHERE id > ?1 AND journal_id IS NULL ORDER BY id LIMIT ?2"
        } else {
            "SELECT id, journal_title, journal_issn, journal_issns, journal_id FROM papers
             WHERE id > ?1 ORDER BY id LIMIT ?2"
        };
        let mut stmt = self.conn.prepare_cached(sql)?;
        let candidates = stmt
            .query_map(params![after_id, limit as i64], |row| {
                Ok(LinkCandidate {
                    id: row.get(0)?,
                    journal_title: row.get(1)?,
                    journal_issn: row.get(2)?,
                    journal_issns: row.get(3)?,
                    journal_id: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(candidates)
    }

    pub fn count_link_candidates(&self, only_unlinked: bool) -> Result<u64> {
        let sql = if only_unlinked {
            "SELECT COUNT(*) FROM papers WHERE journal_id IS NULL"
        } else {
            "SELECT COUNT(*) FROM papers"
        };
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Apply journal/category changes in one transaction; returns rows changed
    pub fn apply_links(&mut self, updates: &[LinkUpdate]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE papers SET journal_id = ?2, broad_subject_category = ?3 WHERE id = ?1",
            )?;
            for update in updates {
                changed += stmt.execute(params![update.id, update.journal_id, update.category])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }
}
