use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::normalize::SourceFormat;

#[derive(Parser)]
#[command(name = "ost-ingest")]
#[command(about = "Load journal directories and research-transparency exports into the Open Science Tracker database")]
#[command(version = "1.0.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a journal directory CSV, merging duplicate journals
    Journals(JournalsArgs),

    /// Ingest a dental or medical transparency export, linking papers to journals
    Ingest(IngestArgs),

    /// Re-run journal linkage for papers already in the database
    Relink(RelinkArgs),

    /// Report per-category and per-year transparency statistics
    Stats(StatsArgs),
}

/// Input shape selector; `auto` inspects the header row
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Auto,
    Directory,
    Dental,
    Medical,
}

impl FormatArg {
    pub fn explicit(&self) -> Option<SourceFormat> {
        match self {
            FormatArg::Auto => None,
            FormatArg::Directory => Some(SourceFormat::Directory),
            FormatArg::Dental => Some(SourceFormat::Dental),
            FormatArg::Medical => Some(SourceFormat::Medical),
        }
    }
}

fn parse_batch_size(value: &str) -> Result<usize, String> {
    let size: usize = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if size == 0 {
        return Err("batch size must be at least 1".to_string());
    }
    Ok(size)
}

fn parse_ratio(value: &str) -> Result<f64, String> {
    let ratio: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if !(0.0..=1.0).contains(&ratio) {
        return Err("ratio must be between 0 and 1".to_string());
    }
    Ok(ratio)
}

#[derive(Parser, Clone)]
pub struct JournalsArgs {
    /// Journal directory CSV (optionally .gz)
    #[arg(short, long, required = true)]
    pub input: String,

    /// SQLite database file
    #[arg(short, long, env = "OST_DATABASE", default_value = "ost.sqlite3")]
    pub database: String,

    /// Rows per batch read from the input
    #[arg(long, default_value = "1000", value_parser = parse_batch_size)]
    pub batch_size: usize,

    /// Logging level (OFF, DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, default_value = "INFO")]
    pub log_level: String,
}

#[derive(Parser, Clone)]
pub struct IngestArgs {
    /// Transparency export CSV (optionally .gz)
    #[arg(short, long, required = true)]
    pub input: String,

    /// SQLite database file; load the journal directory into it first
    #[arg(short, long, env = "OST_DATABASE", default_value = "ost.sqlite3")]
    pub database: String,

    /// Input format
    #[arg(short, long, value_enum, default_value = "auto")]
    pub format: FormatArg,

    /// Rows per batch; each batch is written in one transaction
    #[arg(long, default_value = "1000", value_parser = parse_batch_size)]
    pub batch_size: usize,

    /// Data rows to skip before the first batch (resume offset)
    #[arg(long, default_value = "0")]
    pub skip_rows: u64,

    /// Stop after this many data rows
    #[arg(long)]
    pub max_rows: Option<u64>,

    /// Overwrite papers that are already stored instead of skipping them
    #[arg(long)]
    pub update_existing: bool,

    /// Drop papers whose journal is not in the directory [default: true for medical, false otherwise]
    #[arg(long, action = ArgAction::Set)]
    pub require_journal: Option<bool>,

    /// Fall back to substring title matching when ISSN and exact title fail
    #[arg(long, action = ArgAction::Set, default_value = "true")]
    pub partial_titles: bool,

    /// Pick the closest-length partial title match with at least this length ratio
    #[arg(long, value_parser = parse_ratio)]
    pub min_title_ratio: Option<f64>,

    /// Save progress to this JSON file after every committed batch
    #[arg(long)]
    pub checkpoint: Option<String>,

    /// Continue from the offset recorded in --checkpoint
    #[arg(long, requires = "checkpoint")]
    pub resume: bool,

    /// Logging level (OFF, DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, default_value = "INFO")]
    pub log_level: String,
}

#[derive(Parser, Clone)]
pub struct RelinkArgs {
    /// SQLite database file
    #[arg(short, long, env = "OST_DATABASE", default_value = "ost.sqlite3")]
    pub database: String,

    /// Papers per page; each page is updated in one transaction
    #[arg(long, default_value = "1000", value_parser = parse_batch_size)]
    pub batch_size: usize,

    /// Only consider papers without a journal
    #[arg(long)]
    pub only_unlinked: bool,

    /// Fall back to substring title matching when ISSN and exact title fail
    #[arg(long, action = ArgAction::Set, default_value = "true")]
    pub partial_titles: bool,

    /// Pick the closest-length partial title match with at least this length ratio
    #[arg(long, value_parser = parse_ratio)]
    pub min_title_ratio: Option<f64>,

    /// Logging level (OFF, DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, default_value = "INFO")]
    pub log_level: String,
}

#[derive(Parser, Clone)]
pub struct StatsArgs {
    /// SQLite database file
    #[arg(short, long, env = "OST_DATABASE", default_value = "ost.sqlite3")]
    pub database: String,

    /// Also break statistics down by publication year
    #[arg(long)]
    pub by_year: bool,

    /// Logging level (OFF, DEBUG, INFO, WARN, ERROR)
    #[arg(short, long, default_value = "INFO")]
    pub log_level: String,
}
