use anyhow::{anyhow, bail, Result};
use log::{info, warn};
use std::path::PathBuf;

use crate::cli::IngestArgs;
use crate::common::{create_ingest_progress, install_signal_handlers, setup_logging};
use crate::directory::{JournalDirectory, LinkerConfig};
use crate::ingest::{Checkpoint, IngestOptions, IngestState, IngestSummary, Ingestor};
use crate::normalize::SourceFormat;
use crate::reader::{BatchReader, ReaderOptions};
use crate::store::{Store, WriteMode};

pub fn run_ingest(args: IngestArgs) -> Result<IngestSummary> {
    setup_logging(&args.log_level)?;
    install_signal_handlers()?;

    info!("Starting transparency ingestion");
    info!("Input: {}", args.input);
    info!("Database: {}", args.database);

    let checkpoint_path = args.checkpoint.as_ref().map(PathBuf::from);
    let mut skip_rows = args.skip_rows;
    let mut resumed = None;
    if args.resume {
        if let Some(path) = &checkpoint_path {
            match Checkpoint::load(path)? {
                Some(checkpoint) => {
                    skip_rows = checkpoint.resume_offset(&args.input)?;
                    info!(
                        "Resuming run {} from row offset {} ({} batches committed, last state {})",
                        checkpoint.run_id, skip_rows, checkpoint.batches_committed, checkpoint.state
                    );
                    resumed = Some(checkpoint);
                }
                None => warn!("No checkpoint at {}; starting from offset {}", path.display(), skip_rows),
            }
        }
    }

    let mut store = Store::open(&args.database)?;
    let journals = store.load_journals()?;
    let directory = JournalDirectory::from_entries(journals);
    info!(
        "Journal directory: {} journals, {} ISSNs",
        directory.len(),
        directory.issn_count()
    );

    let reader_options = ReaderOptions {
        batch_size: args.batch_size,
        skip_rows,
        max_rows: args.max_rows,
    };
    let reader = BatchReader::open(&args.input, reader_options.clone())?;

    let format = match args.format.explicit() {
        Some(format) => format,
        None => {
            let detected = SourceFormat::detect(reader.headers())?;
            info!("Detected input format: {}", detected);
            detected
        }
    };
    if format == SourceFormat::Directory {
        bail!("{} is a journal directory; load it with the journals command", args.input);
    }

    let mut options = IngestOptions::new(format);
    options.reader = reader_options;
    options.mode = if args.update_existing {
        WriteMode::CreateOrUpdate
    } else {
        WriteMode::CreateOnly
    };
    if let Some(require) = args.require_journal {
        options.require_journal = require;
    }
    options.linker = LinkerConfig {
        partial_titles: args.partial_titles,
        min_partial_ratio: args.min_title_ratio,
    };
    options.checkpoint = checkpoint_path;

    info!(
        "Journal linkage required: {}, partial titles: {}",
        options.require_journal, options.linker.partial_titles
    );

    let progress = create_ingest_progress(&args.input);

    let mut ingestor = Ingestor::new(&mut store, &directory, options).on_batch(|report| {
        progress.set_position(report.bytes_read);
        progress.set_message(format!(
            "{} rows, {} created, {} updated, {} rejected",
            report.rows_read, report.totals.created, report.totals.updated, report.totals.rejected
        ));
    });
    if let Some(checkpoint) = resumed {
        ingestor = ingestor.resume_from(checkpoint);
    }

    let summary = ingestor.run_reader(reader, &args.input)?;
    progress.finish_and_clear();

    summary.log_summary();

    match summary.state {
        IngestState::Done => Ok(summary),
        IngestState::Interrupted => Err(anyhow!(
            "Ingestion interrupted; resume with --skip-rows {}",
            summary.resume_offset
        )),
        _ => Err(anyhow!(
            "Ingestion failed: {}; resume with --skip-rows {}",
            summary.error.as_deref().unwrap_or("unknown error"),
            summary.resume_offset
        )),
    }
}
