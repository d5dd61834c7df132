use anyhow::{Context, Result};
use rusqlite::Connection;

/// Tables are created on first open; re-opening an existing database is a no-op
pub const SCHEMA: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS journals (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        journal_key          TEXT NOT NULL UNIQUE,
        nlm_id               TEXT,
        title_abbreviation   TEXT,
        title_full           TEXT,
        publisher            TEXT,
        country              TEXT,
        issn_electronic      TEXT,
        issn_print           TEXT,
        issn_linking         TEXT,
        broad_subject_terms  TEXT,
        subject_term_count   INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_journals_issn_electronic ON journals(issn_electronic);
    CREATE INDEX IF NOT EXISTS idx_journals_issn_print ON journals(issn_print);
    CREATE INDEX IF NOT EXISTS idx_journals_issn_linking ON journals(issn_linking);

    CREATE TABLE IF NOT EXISTS papers (
        id                      INTEGER PRIMARY KEY AUTOINCREMENT,
        unique_key              TEXT NOT NULL UNIQUE,
        pmid                    TEXT,
        pmcid                   TEXT,
        doi                     TEXT,
        title                   TEXT,
        author_string           TEXT,
        journal_title           TEXT,
        journal_issn            TEXT,
        journal_issns           TEXT,
        pub_year                INTEGER,
        first_publication_date  TEXT,
        journal_volume          TEXT,
        issue                   TEXT,
        page_info               TEXT,
        pub_type                TEXT,
        is_open_access          INTEGER NOT NULL DEFAULT 0,
        is_coi_pred             INTEGER NOT NULL DEFAULT 0,
        is_fund_pred            INTEGER NOT NULL DEFAULT 0,
        is_register_pred        INTEGER NOT NULL DEFAULT 0,
        is_open_data            INTEGER NOT NULL DEFAULT 0,
        is_open_code            INTEGER NOT NULL DEFAULT 0,
        is_replication          INTEGER,
        is_novelty              INTEGER,
        coi_text                TEXT,
        fund_text               TEXT,
        register_text           TEXT,
        open_data_category      TEXT,
        open_data_statements    TEXT,
        open_code_statements    TEXT,
        transparency_score      INTEGER NOT NULL DEFAULT 0,
        transparency_score_pct  REAL NOT NULL DEFAULT 0,
        journal_id              INTEGER REFERENCES journals(id) ON DELETE SET NULL,
        broad_subject_category  TEXT,
        assessment_tool         TEXT NOT NULL,
        source_format           TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_papers_journal ON papers(journal_id);
    CREATE INDEX IF NOT EXISTS idx_papers_pub_year ON papers(pub_year);
    CREATE INDEX IF NOT EXISTS idx_papers_category ON papers(broad_subject_category);
"#;

pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Failed to initialise database schema")
}
