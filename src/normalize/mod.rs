//! Mapping of raw source rows onto canonical paper and journal records.
//!
//! Each source shape has a declarative column table (see [`mapping`]). The
//! table is resolved against the header once per file, and rows are then
//! normalised by index: values are trimmed, indicator flags interpreted,
//! dates reduced to a year, and bounded fields cut to their column width.

pub mod fields;
pub mod mapping;

pub use fields::*;
pub use mapping::*;

use crate::common::RejectReason;
use crate::reader::RawRow;
use crate::score::Indicators;
use anyhow::{bail, Result};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The shapes of input file the pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// NLM-style journal directory export
    Directory,
    /// Dental transparency assessment export
    Dental,
    /// Medical (rtransparent) assessment export
    Medical,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Directory => "directory",
            SourceFormat::Dental => "dental",
            SourceFormat::Medical => "medical",
        }
    }

    /// Infer the shape of a file from its header row.
    ///
    /// Both assessment shapes share the indicator and evidence columns; only
    /// dental exports carry a year column.
    pub fn detect(headers: &StringRecord) -> Result<Self> {
        let has = |name: &str| headers.iter().any(|h| h.trim().eq_ignore_ascii_case(name));

        if has("broad_subject_terms") || has("broad_subject_term") {
            Ok(SourceFormat::Directory)
        } else if has("pubYear") || has("pubYear_modified") || has("year_firstpub") {
            Ok(SourceFormat::Dental)
        } else if has("is_coi_pred") || has("rt_all_is_coi_pred") || has("firstPublicationDate") {
            Ok(SourceFormat::Medical)
        } else {
            bail!("Unable to detect input format from header row; pass --format explicitly")
        }
    }

    /// Column table for paper-bearing shapes
    pub fn paper_rules(&self) -> Option<&'static [ColumnRule<PaperField>]> {
        match self {
            SourceFormat::Directory => None,
            SourceFormat::Dental => Some(DENTAL_COLUMNS),
            SourceFormat::Medical => Some(MEDICAL_COLUMNS),
        }
    }

    /// Whether papers from this shape are dropped when no journal matches
    pub fn requires_journal_by_default(&self) -> bool {
        matches!(self, SourceFormat::Medical)
    }
}

/// Recorded in `assessment_tool` when the row does not name one
pub const DEFAULT_ASSESSMENT_TOOL: &str = "rtransparent";

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-text evidence captured alongside the indicator flags
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    pub coi_text: Option<String>,
    pub fund_text: Option<String>,
    pub register_text: Option<String>,
    pub open_data_category: Option<String>,
    pub open_data_statements: Option<String>,
    pub open_code_statements: Option<String>,
}

/// A paper row after mapping and cleaning, before it has a key or a journal
#[derive(Debug, Clone, PartialEq)]
pub struct PaperRecord {
    pub unique_key: Option<String>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub author_string: Option<String>,
    pub journal_title: Option<String>,
    /// Raw ISSN field, cut to column width; may hold more than one ISSN before cutting
    pub journal_issn: Option<String>,
    /// Every well-formed ISSN found in the raw field, for linkage
    pub issns: Vec<String>,
    pub pub_year: Option<i32>,
    pub publication_date: Option<String>,
    pub journal_volume: Option<String>,
    pub issue: Option<String>,
    pub page_info: Option<String>,
    pub pub_type: Option<String>,
    pub is_open_access: bool,
    pub indicators: Indicators,
    pub evidence: Evidence,
    pub assessment_tool: String,
    pub source_format: SourceFormat,
}

/// A paper-bearing file's resolved columns together with its shape
#[derive(Debug, Clone)]
pub struct PaperMapping {
    pub format: SourceFormat,
    pub columns: PaperColumns,
}

const IDENTIFYING_FIELDS: &[PaperField] = &[
    PaperField::UniqueKey,
    PaperField::Pmcid,
    PaperField::Pmid,
    PaperField::Doi,
    PaperField::Title,
];

impl PaperMapping {
    pub fn new(format: SourceFormat, headers: &StringRecord) -> Result<Self> {
        let Some(rules) = format.paper_rules() else {
            bail!("Format '{}' does not carry papers", format);
        };
        let columns = PaperColumns::resolve(rules, headers);
        columns.require_any(
            IDENTIFYING_FIELDS,
            "one of unique_key, pmcid, pmid, doi or title",
        )?;
        Ok(Self { format, columns })
    }

    fn text(&self, row: &RawRow, field: PaperField) -> Option<String> {
        clean_limited(self.columns.value(row, field), field.max_len())
    }

    fn flag(&self, row: &RawRow, field: PaperField) -> bool {
        parse_flag(self.columns.value(row, field))
    }

    /// Map one row; rejects only rows with nothing in any mapped column
    pub fn normalize(&self, row: &RawRow) -> Result<PaperRecord, RejectReason> {
        let all_empty = self
            .columns
            .sources()
            .iter()
            .all(|(field, _)| clean_text(self.columns.value(row, *field)).is_none());
        if all_empty {
            return Err(RejectReason::EmptyRow);
        }

        let raw_issn = self.columns.value(row, PaperField::JournalIssn);
        let date = parse_date(self.columns.value(row, PaperField::PublicationDate));
        let pub_year = parse_year(self.columns.value(row, PaperField::PubYear))
            .or_else(|| date.as_ref().map(|d| d.year));

        let indicators = Indicators {
            coi_disclosed: self.flag(row, PaperField::CoiPred),
            funding_disclosed: self.flag(row, PaperField::FundPred),
            registered: self.flag(row, PaperField::RegisterPred),
            open_data: self.flag(row, PaperField::OpenData),
            open_code: self.flag(row, PaperField::OpenCode),
            replication: parse_optional_flag(self.columns.value(row, PaperField::Replication)),
            novelty: parse_optional_flag(self.columns.value(row, PaperField::Novelty)),
        };

        Ok(PaperRecord {
            unique_key: self.text(row, PaperField::UniqueKey),
            pmid: self.text(row, PaperField::Pmid),
            pmcid: self.text(row, PaperField::Pmcid),
            doi: self.text(row, PaperField::Doi),
            title: self.text(row, PaperField::Title),
            author_string: self.text(row, PaperField::AuthorString),
            journal_title: self.text(row, PaperField::JournalTitle),
            journal_issn: self.text(row, PaperField::JournalIssn),
            issns: split_issns(raw_issn),
            pub_year,
            publication_date: date.and_then(|d| d.iso_date),
            journal_volume: self.text(row, PaperField::JournalVolume),
            issue: self.text(row, PaperField::Issue),
            page_info: self.text(row, PaperField::PageInfo),
            pub_type: self.text(row, PaperField::PubType),
            is_open_access: self.flag(row, PaperField::OpenAccess),
            indicators,
            evidence: Evidence {
                coi_text: self.text(row, PaperField::CoiText),
                fund_text: self.text(row, PaperField::FundText),
                register_text: self.text(row, PaperField::RegisterText),
                open_data_category: self.text(row, PaperField::OpenDataCategory),
                open_data_statements: self.text(row, PaperField::OpenDataStatements),
                open_code_statements: self.text(row, PaperField::OpenCodeStatements),
            },
            assessment_tool: self
                .text(row, PaperField::AssessmentTool)
                .unwrap_or_else(|| DEFAULT_ASSESSMENT_TOOL.to_string()),
            source_format: self.format,
        })
    }
}

/// A journal directory row after cleaning; ISSNs are in `NNNN-NNNC` form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalRow {
    pub nlm_id: Option<String>,
    pub title_abbreviation: Option<String>,
    pub title_full: Option<String>,
    pub publisher: Option<String>,
    pub country: Option<String>,
    pub issn_electronic: Option<String>,
    pub issn_print: Option<String>,
    pub issn_linking: Option<String>,
    pub subject_terms: Vec<String>,
}

impl JournalRow {
    /// Identity used to merge duplicate directory rows: NLM id, else the
    /// first ISSN, else the normalised full title
    pub fn identity_key(&self) -> Option<String> {
        if let Some(nlm_id) = &self.nlm_id {
            return Some(format!("nlm:{}", nlm_id));
        }
        if let Some(issn) = self
            .issn_electronic
            .as_ref()
            .or(self.issn_print.as_ref())
            .or(self.issn_linking.as_ref())
        {
            return Some(format!("issn:{}", issn));
        }
        self.title_full
            .as_deref()
            .map(normalize_title)
            .filter(|t| !t.is_empty())
            .map(|t| format!("title:{}", t))
    }
}

#[derive(Debug, Clone)]
pub struct JournalMapping {
    pub columns: JournalColumns,
}

impl JournalMapping {
    pub fn new(headers: &StringRecord) -> Result<Self> {
        let columns = JournalColumns::resolve(DIRECTORY_COLUMNS, headers);
        columns.require_any(
            &[
                JournalField::IssnElectronic,
                JournalField::IssnPrint,
                JournalField::IssnLinking,
            ],
            "one of issn_electronic, issn_print or issn_linking",
        )?;
        columns.require_any(
            &[JournalField::TitleFull, JournalField::TitleAbbreviation],
            "title_full or title_abbreviation",
        )?;
        Ok(Self { columns })
    }

    fn text(&self, row: &RawRow, field: JournalField) -> Option<String> {
        clean_limited(self.columns.value(row, field), field.max_len())
    }

    fn issn(&self, row: &RawRow, field: JournalField) -> Option<String> {
        self.columns.value(row, field).and_then(normalize_issn)
    }

    pub fn normalize(&self, row: &RawRow) -> Result<JournalRow, RejectReason> {
        let journal = JournalRow {
            nlm_id: self.text(row, JournalField::NlmId),
            title_abbreviation: self.text(row, JournalField::TitleAbbreviation),
            title_full: self.text(row, JournalField::TitleFull),
            publisher: self.text(row, JournalField::Publisher),
            country: self.text(row, JournalField::Country),
            issn_electronic: self.issn(row, JournalField::IssnElectronic),
            issn_print: self.issn(row, JournalField::IssnPrint),
            issn_linking: self.issn(row, JournalField::IssnLinking),
            subject_terms: split_subject_terms(self.columns.value(row, JournalField::SubjectTerms)),
        };

        if journal.identity_key().is_none() {
            return Err(RejectReason::NoJournalIdentity);
        }
        Ok(journal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{BatchReader, ReaderOptions};
    use std::io::Cursor;

    fn rows(csv: &str) -> (StringRecord, Vec<RawRow>) {
        let reader = BatchReader::from_reader(
            Box::new(Cursor::new(csv.as_bytes().to_vec())),
            ReaderOptions::default(),
        )
        .unwrap();
        let headers = reader.headers().clone();
        let rows = reader.flat_map(|b| b.unwrap().rows).collect();
        (headers, rows)
    }

    const DENTAL: &str = "pmid,pmcid,doi,title,journalTitle,journalIssn,pubYear,is_coi_pred,is_fund_pred,is_register_pred,is_open_data,is_open_code,coi_text\n\
        100,PMC200,10.1/x,A,J Dent Res,0022-0345,2021,TRUE,TRUE,FALSE,TRUE,FALSE,None declared\n";

    #[test]
    fn test_detect_formats() {
        let (h, _) = rows("nlm_id,title_full,issn_print,broad_subject_terms\n");
        assert_eq!(SourceFormat::detect(&h).unwrap(), SourceFormat::Directory);

        let (h, _) = rows(DENTAL);
        assert_eq!(SourceFormat::detect(&h).unwrap(), SourceFormat::Dental);

        let (h, _) = rows("pmid,firstPublicationDate,is_coi_pred\n");
        assert_eq!(SourceFormat::detect(&h).unwrap(), SourceFormat::Medical);

        let (h, _) = rows("foo,bar\n");
        assert!(SourceFormat::detect(&h).is_err());
    }

    #[test]
    fn test_detect_medical_with_evidence_columns() {
        let (h, _) = rows(
            "pmid,pmcid,doi,title,journalTitle,journalIssn,firstPublicationDate,is_coi_pred,coi_text,is_fund_pred,fund_text\n",
        );
        let format = SourceFormat::detect(&h).unwrap();
        assert_eq!(format, SourceFormat::Medical);
        assert!(format.requires_journal_by_default());

        let (h, _) = rows("pmid,firstPublicationDate,pubYear_modified,is_coi_pred,coi_text\n");
        assert_eq!(SourceFormat::detect(&h).unwrap(), SourceFormat::Dental);
    }

    #[test]
    fn test_normalize_dental_row() {
        let (h, rows) = rows(DENTAL);
        let mapping = PaperMapping::new(SourceFormat::Dental, &h).unwrap();
        let paper = mapping.normalize(&rows[0]).unwrap();

        assert_eq!(paper.pmcid.as_deref(), Some("PMC200"));
        assert_eq!(paper.pub_year, Some(2021));
        assert_eq!(paper.issns, vec!["0022-0345".to_string()]);
        assert!(paper.indicators.coi_disclosed);
        assert!(paper.indicators.funding_disclosed);
        assert!(!paper.indicators.registered);
        assert!(paper.indicators.open_data);
        assert!(!paper.indicators.open_code);
        assert_eq!(paper.indicators.replication, None);
        assert_eq!(paper.evidence.coi_text.as_deref(), Some("None declared"));
        assert_eq!(paper.assessment_tool, "rtransparent");
        assert_eq!(paper.source_format, SourceFormat::Dental);
    }

    #[test]
    fn test_medical_year_from_publication_date() {
        let (h, rows) = rows("pmid,firstPublicationDate,is_coi_pred\n7,2019-05-02,1\n8,garbage,0\n");
        let mapping = PaperMapping::new(SourceFormat::Medical, &h).unwrap();

        let paper = mapping.normalize(&rows[0]).unwrap();
        assert_eq!(paper.pub_year, Some(2019));
        assert_eq!(paper.publication_date.as_deref(), Some("2019-05-02"));
        assert!(paper.indicators.coi_disclosed);

        let paper = mapping.normalize(&rows[1]).unwrap();
        assert_eq!(paper.pub_year, None);
        assert_eq!(paper.publication_date, None);
    }

    #[test]
    fn test_bounded_fields_are_cut() {
        let long_volume = "9".repeat(40);
        let csv = format!(
            "pmid,journalIssn,journalVolume\n{},1234-5678; 8765-4321,{}\n",
            "1".repeat(30),
            long_volume
        );
        let (h, rows) = rows(&csv);
        let mapping = PaperMapping::new(SourceFormat::Dental, &h).unwrap();
        let paper = mapping.normalize(&rows[0]).unwrap();

        assert_eq!(paper.pmid.as_ref().unwrap().chars().count(), 20);
        assert_eq!(paper.journal_issn.as_deref(), Some("1234-5678"));
        assert_eq!(paper.issns.len(), 2);
        assert_eq!(paper.journal_volume.as_ref().unwrap().len(), 20);
    }

    #[test]
    fn test_empty_row_rejected() {
        let (h, rows) = rows("pmid,title\n\" \",nan\n");
        let mapping = PaperMapping::new(SourceFormat::Dental, &h).unwrap();
        assert_eq!(mapping.normalize(&rows[0]), Err(RejectReason::EmptyRow));
    }

    #[test]
    fn test_paper_mapping_requires_identifier_column() {
        let (h, _) = rows("journalTitle,is_coi_pred\n");
        let err = PaperMapping::new(SourceFormat::Dental, &h).unwrap_err();
        assert!(err.to_string().contains("missing a required column"));
        assert!(PaperMapping::new(SourceFormat::Directory, &h).is_err());
    }

    #[test]
    fn test_normalize_journal_row() {
        let (h, rows) = rows(
            "nlm_id,title_abbreviation,title_full,issn_print,issn_electronic,broad_subject_terms\n\
             0354011,J Dent Res,Journal of dental research,0022-0345,1544-0591x,Dentistry;Dentistry; Medicine\n",
        );
        let mapping = JournalMapping::new(&h).unwrap();
        let journal = mapping.normalize(&rows[0]).unwrap();

        assert_eq!(journal.issn_print.as_deref(), Some("0022-0345"));
        // nine significant characters, so unusable
        assert_eq!(journal.issn_electronic, None);
        assert_eq!(
            journal.subject_terms,
            vec!["Dentistry".to_string(), "Medicine".to_string()]
        );
        assert_eq!(journal.identity_key().as_deref(), Some("nlm:0354011"));
    }

    #[test]
    fn test_journal_identity_fallbacks() {
        let by_issn = JournalRow {
            issn_print: Some("0022-0345".into()),
            title_full: Some("X".into()),
            ..Default::default()
        };
        assert_eq!(by_issn.identity_key().as_deref(), Some("issn:0022-0345"));

        let by_title = JournalRow {
            title_full: Some("  Journal of  X ".into()),
            ..Default::default()
        };
        assert_eq!(by_title.identity_key().as_deref(), Some("title:journal of x"));

        assert_eq!(JournalRow::default().identity_key(), None);
    }

    #[test]
    fn test_journal_row_without_identity_rejected() {
        let (h, rows) = rows("title_full,issn_print,country\n,,USA\n");
        let mapping = JournalMapping::new(&h).unwrap();
        assert_eq!(mapping.normalize(&rows[0]), Err(RejectReason::NoJournalIdentity));
    }

    #[test]
    fn test_journal_mapping_requires_issn_and_title() {
        let (h, _) = rows("title_full,country\n");
        assert!(JournalMapping::new(&h).is_err());
        let (h, _) = rows("issn_print,country\n");
        assert!(JournalMapping::new(&h).is_err());
    }
}
