use anyhow::Result;
use log::info;
use std::path::Path;
use std::time::Instant;

use crate::cli::JournalsArgs;
use crate::common::{format_elapsed, setup_logging, JournalImportStats};
use crate::directory::load_directory_file;
use crate::reader::ReaderOptions;
use crate::store::Store;

pub fn run_journals(args: JournalsArgs) -> Result<JournalImportStats> {
    let start_time = Instant::now();

    setup_logging(&args.log_level)?;

    info!("Starting journal directory import");
    info!("Input: {}", args.input);
    info!("Database: {}", args.database);

    let mut store = Store::open(&args.database)?;

    let options = ReaderOptions {
        batch_size: args.batch_size,
        ..Default::default()
    };
    let (entries, mut stats) = load_directory_file(Path::new(&args.input), options)?;

    // one transaction per chunk keeps a huge directory from holding a single long write
    for chunk in entries.chunks(args.batch_size) {
        let counts = store.upsert_journals(chunk)?;
        stats.created += counts.created;
        stats.updated += counts.updated;
    }

    info!("");
    info!("==================== JOURNAL IMPORT SUMMARY ====================");
    info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
    info!("Rows read: {}", stats.rows_read);
    info!("  Malformed: {}", stats.rows_malformed);
    info!("  Without identity: {}", stats.rows_rejected);
    info!("  Merged into an earlier row: {}", stats.journals_merged);
    info!("Journals created: {}", stats.created);
    info!("Journals updated: {}", stats.updated);
    info!("Journals in database: {}", store.count_journals()?);
    info!("================================================================");

    Ok(stats)
}
