//! Declarative source-column tables per input shape, resolved against a
//! file's header row once and then applied to every row by index.

use crate::reader::RawRow;
use anyhow::{bail, Result};
use csv::StringRecord;
use std::collections::HashMap;
use std::hash::Hash;

/// Canonical paper attributes a source column can feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PaperField {
    UniqueKey,
    Pmid,
    Pmcid,
    Doi,
    Title,
    AuthorString,
    JournalTitle,
    JournalIssn,
    PubYear,
    PublicationDate,
    JournalVolume,
    Issue,
    PageInfo,
    PubType,
    OpenAccess,
    CoiPred,
    CoiText,
    FundPred,
    FundText,
    RegisterPred,
    RegisterText,
    OpenData,
    OpenDataCategory,
    OpenDataStatements,
    OpenCode,
    OpenCodeStatements,
    Replication,
    Novelty,
    AssessmentTool,
}

impl PaperField {
    /// Destination column width, for fields stored in bounded columns
    pub fn max_len(&self) -> Option<usize> {
        match self {
            PaperField::Pmid | PaperField::Pmcid => Some(20),
            PaperField::Doi => Some(200),
            PaperField::JournalTitle => Some(200),
            PaperField::JournalIssn => Some(9),
            PaperField::JournalVolume | PaperField::Issue => Some(20),
            PaperField::PageInfo => Some(50),
            PaperField::PubType => Some(200),
            PaperField::AssessmentTool => Some(50),
            _ => None,
        }
    }
}

/// Canonical journal-directory attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JournalField {
    NlmId,
    TitleAbbreviation,
    TitleFull,
    Publisher,
    Country,
    IssnElectronic,
    IssnPrint,
    IssnLinking,
    SubjectTerms,
}

impl JournalField {
    pub fn max_len(&self) -> Option<usize> {
        match self {
            JournalField::NlmId => Some(50),
            JournalField::TitleAbbreviation => Some(200),
            JournalField::Publisher => Some(500),
            JournalField::Country => Some(100),
            JournalField::IssnElectronic | JournalField::IssnPrint | JournalField::IssnLinking => {
                Some(9)
            }
            JournalField::TitleFull | JournalField::SubjectTerms => None,
        }
    }
}

/// One field and the source columns that may carry it, in priority order
#[derive(Debug, Clone, Copy)]
pub struct ColumnRule<F> {
    pub field: F,
    pub columns: &'static [&'static str],
}

const fn rule<F>(field: F, columns: &'static [&'static str]) -> ColumnRule<F> {
    ColumnRule { field, columns }
}

pub const DENTAL_COLUMNS: &[ColumnRule<PaperField>] = &[
    rule(PaperField::UniqueKey, &["unique_key", "epmc_id"]),
    rule(PaperField::Pmid, &["pmid"]),
    rule(PaperField::Pmcid, &["pmcid"]),
    rule(PaperField::Doi, &["doi"]),
    rule(PaperField::Title, &["title"]),
    rule(PaperField::AuthorString, &["authorString", "authors"]),
    rule(PaperField::JournalTitle, &["journalTitle"]),
    rule(PaperField::JournalIssn, &["journalIssn"]),
    rule(PaperField::PubYear, &["pubYear_modified", "pubYear", "year_firstpub"]),
    rule(PaperField::PublicationDate, &["firstPublicationDate"]),
    rule(PaperField::JournalVolume, &["journalVolume"]),
    rule(PaperField::Issue, &["issue"]),
    rule(PaperField::PageInfo, &["pageInfo"]),
    rule(PaperField::PubType, &["pubType", "type"]),
    rule(PaperField::OpenAccess, &["isOpenAccess"]),
    rule(PaperField::CoiPred, &["is_coi_pred"]),
    rule(PaperField::CoiText, &["coi_text"]),
    rule(PaperField::FundPred, &["is_fund_pred"]),
    rule(PaperField::FundText, &["fund_text"]),
    rule(PaperField::RegisterPred, &["is_register_pred"]),
    rule(PaperField::RegisterText, &["register_text"]),
    rule(PaperField::OpenData, &["is_open_data"]),
    rule(PaperField::OpenDataCategory, &["open_data_category"]),
    rule(PaperField::OpenDataStatements, &["open_data_statements"]),
    rule(PaperField::OpenCode, &["is_open_code"]),
    rule(PaperField::OpenCodeStatements, &["open_code_statements"]),
    rule(PaperField::Replication, &["is_replication"]),
    rule(PaperField::Novelty, &["is_novelty"]),
    rule(PaperField::AssessmentTool, &["assessment_tool"]),
];

/// Medical exports carry a publication date instead of a year column and
/// use the `rt_*` prefixed indicator names in some releases
pub const MEDICAL_COLUMNS: &[ColumnRule<PaperField>] = &[
    rule(PaperField::UniqueKey, &["unique_key", "epmc_id"]),
    rule(PaperField::Pmid, &["pmid"]),
    rule(PaperField::Pmcid, &["pmcid"]),
    rule(PaperField::Doi, &["doi"]),
    rule(PaperField::Title, &["title"]),
    rule(PaperField::AuthorString, &["authorString", "authors"]),
    rule(PaperField::JournalTitle, &["journalTitle"]),
    rule(PaperField::JournalIssn, &["journalIssn"]),
    rule(PaperField::PublicationDate, &["firstPublicationDate"]),
    rule(PaperField::JournalVolume, &["journalVolume"]),
    rule(PaperField::Issue, &["issue"]),
    rule(PaperField::PageInfo, &["pageInfo"]),
    rule(PaperField::PubType, &["pubType", "type"]),
    rule(PaperField::OpenAccess, &["isOpenAccess"]),
    rule(PaperField::CoiPred, &["is_coi_pred", "rt_all_is_coi_pred"]),
    rule(PaperField::CoiText, &["coi_text"]),
    rule(PaperField::FundPred, &["is_fund_pred", "rt_all_is_fund_pred"]),
    rule(PaperField::FundText, &["fund_text"]),
    rule(PaperField::RegisterPred, &["is_register_pred", "rt_all_is_register_pred"]),
    rule(PaperField::RegisterText, &["register_text"]),
    rule(PaperField::OpenData, &["is_open_data", "rt_data_is_open_data"]),
    rule(PaperField::OpenDataCategory, &["open_data_category"]),
    rule(PaperField::OpenDataStatements, &["open_data_statements"]),
    rule(PaperField::OpenCode, &["is_open_code", "rt_data_is_open_code"]),
    rule(PaperField::OpenCodeStatements, &["open_code_statements"]),
    rule(PaperField::Replication, &["is_replication"]),
    rule(PaperField::Novelty, &["is_novelty"]),
    rule(PaperField::AssessmentTool, &["assessment_tool"]),
];

pub const DIRECTORY_COLUMNS: &[ColumnRule<JournalField>] = &[
    rule(JournalField::NlmId, &["nlm_id", "nlm_unique_id"]),
    rule(JournalField::TitleAbbreviation, &["title_abbreviation", "iso_abbreviation"]),
    rule(JournalField::TitleFull, &["title_full", "journal_title"]),
    rule(JournalField::Publisher, &["publisher"]),
    rule(JournalField::Country, &["country"]),
    rule(JournalField::IssnElectronic, &["issn_electronic"]),
    rule(JournalField::IssnPrint, &["issn_print"]),
    rule(JournalField::IssnLinking, &["issn_linking"]),
    rule(
        JournalField::SubjectTerms,
        &["broad_subject_terms", "broad_subject_term"],
    ),
];

/// Header positions for the fields a file actually carries
#[derive(Debug, Clone)]
pub struct ResolvedColumns<F> {
    indices: HashMap<F, usize>,
    sources: Vec<(F, String)>,
}

fn header_position(headers: &StringRecord, column: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .or_else(|| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(column))
        })
}

impl<F: Copy + Eq + Hash> ResolvedColumns<F> {
    /// Resolve each rule to the first of its candidate columns present in the header
    pub fn resolve(rules: &[ColumnRule<F>], headers: &StringRecord) -> Self {
        let mut indices = HashMap::new();
        let mut sources = Vec::new();
        for rule in rules {
            let found = rule
                .columns
                .iter()
                .find_map(|column| header_position(headers, column).map(|idx| (idx, *column)));
            if let Some((idx, column)) = found {
                indices.insert(rule.field, idx);
                sources.push((rule.field, column.to_string()));
            }
        }
        Self { indices, sources }
    }

    pub fn has(&self, field: F) -> bool {
        self.indices.contains_key(&field)
    }

    /// Raw value of a field in this row; `None` if the file has no column for it
    pub fn value<'r>(&self, row: &'r RawRow, field: F) -> Option<&'r str> {
        self.indices.get(&field).and_then(|&idx| row.get(idx))
    }

    /// (field, source column) pairs that were found, in rule order
    pub fn sources(&self) -> &[(F, String)] {
        &self.sources
    }

    /// Fail with the first required field group none of whose members is present
    pub fn require_any(&self, fields: &[F], description: &str) -> Result<()> {
        if fields.iter().any(|f| self.has(*f)) {
            Ok(())
        } else {
            bail!("Input is missing a required column: {}", description)
        }
    }
}

pub type PaperColumns = ResolvedColumns<PaperField>;
pub type JournalColumns = ResolvedColumns<JournalField>;
