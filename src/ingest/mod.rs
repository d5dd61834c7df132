//! Batch-by-batch ingestion of a paper export into the store.
//!
//! Each batch moves through normalisation, key resolution and journal
//! linkage, scoring, and a single transactional write. Batches are processed
//! strictly in file order; within a batch the per-row stages run on the rayon
//! pool and keep row order. A failed write is retried once; a second failure
//! ends the run in `Failed` with the offset to resume from. The stop flag is
//! checked between batches, so an interrupted run never leaves a batch half
//! written.

pub mod checkpoint;

pub use checkpoint::*;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::common::{
    current_rss_mb, format_elapsed, format_memory, percent, shutdown_flag, RejectReason,
};
use crate::directory::{JournalDirectory, LinkerConfig, MatchMethod};
use crate::identity::resolve_key;
use crate::normalize::{PaperMapping, PaperRecord, SourceFormat};
use crate::reader::{Batch, BatchReader, ReaderOptions};
use crate::score::compute_score;
use crate::store::{BatchCounts, PaperRow, PaperSink, WriteMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    Idle,
    Reading,
    Normalizing,
    ResolvingLinking,
    Scoring,
    Writing,
    Done,
    Interrupted,
    Failed,
}

impl IngestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IngestState::Done | IngestState::Interrupted | IngestState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IngestState::Idle => "idle",
            IngestState::Reading => "reading",
            IngestState::Normalizing => "normalizing",
            IngestState::ResolvingLinking => "resolving_linking",
            IngestState::Scoring => "scoring",
            IngestState::Writing => "writing",
            IngestState::Done => "done",
            IngestState::Interrupted => "interrupted",
            IngestState::Failed => "failed",
        }
    }
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub format: SourceFormat,
    pub mode: WriteMode,
    /// Drop papers whose journal is not in the directory
    pub require_journal: bool,
    pub linker: LinkerConfig,
    /// Batching and row range; the reader handed to [`Ingestor::run_reader`]
    /// must have been opened with these
    pub reader: ReaderOptions,
    /// Where to save progress after each committed batch
    pub checkpoint: Option<PathBuf>,
}

impl IngestOptions {
    pub fn new(format: SourceFormat) -> Self {
        Self {
            format,
            mode: WriteMode::CreateOnly,
            require_journal: format.requires_journal_by_default(),
            linker: LinkerConfig::default(),
            reader: ReaderOptions::default(),
            checkpoint: None,
        }
    }
}

/// Progress after one committed batch
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub index: usize,
    /// Data-row offset just after this batch
    pub offset: u64,
    /// Rows consumed by this batch
    pub rows: u64,
    pub counts: BatchCounts,
    pub malformed: u64,
    pub bytes_read: u64,
    /// Rows consumed by this run so far
    pub rows_read: u64,
    /// Run totals so far, including any carried over from a resumed checkpoint
    pub totals: BatchCounts,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub run_id: String,
    pub input: String,
    pub format: SourceFormat,
    pub state: IngestState,
    /// Rows consumed by this run, excluding rows skipped to reach the start offset
    pub rows_read: u64,
    /// Offset of the first row not yet committed; pass as `skip_rows` to resume
    pub resume_offset: u64,
    pub batches: usize,
    /// created/updated/skipped from the writer; `rejected` covers every dropped row.
    /// A resumed run starts from the totals of its checkpoint.
    pub counts: BatchCounts,
    pub malformed: u64,
    pub rejections: BTreeMap<RejectReason, u64>,
    /// Rows that reached journal linkage
    pub journal_attempts: u64,
    pub journal_matches: BTreeMap<MatchMethod, u64>,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl IngestSummary {
    fn new(run_id: &str, input: &str, format: SourceFormat, start_offset: u64) -> Self {
        Self {
            run_id: run_id.to_string(),
            input: input.to_string(),
            format,
            state: IngestState::Idle,
            rows_read: 0,
            resume_offset: start_offset,
            batches: 0,
            counts: BatchCounts::default(),
            malformed: 0,
            rejections: BTreeMap::new(),
            journal_attempts: 0,
            journal_matches: BTreeMap::new(),
            elapsed: Duration::ZERO,
            error: None,
        }
    }

    /// Carry the committed totals of an earlier attempt of the same run
    fn seed_from(&mut self, checkpoint: &Checkpoint) {
        self.batches = checkpoint.batches_committed;
        self.counts = checkpoint.counts;
        self.malformed = checkpoint.malformed;
        self.rejections = checkpoint.rejections.clone();
    }

    pub fn journal_matched(&self) -> u64 {
        self.journal_matches.values().sum()
    }

    /// Matched / attempted, as a percentage
    pub fn journal_match_rate(&self) -> f64 {
        percent(self.journal_matched() as usize, self.journal_attempts as usize)
    }

    pub fn is_success(&self) -> bool {
        self.state == IngestState::Done
    }

    fn checkpoint(&self, mode: WriteMode) -> Checkpoint {
        let mut cp = Checkpoint::new(&self.run_id, &self.input, self.format, mode);
        cp.state = self.state;
        cp.rows_committed = self.resume_offset;
        cp.batches_committed = self.batches;
        cp.counts = self.counts;
        cp.malformed = self.malformed;
        cp.rejections = self.rejections.clone();
        cp.error = self.error.clone();
        cp
    }

    pub fn log_summary(&self) {
        info!("");
        info!("==================== INGEST SUMMARY ====================");
        info!("Run id: {}", self.run_id);
        info!("Input: {} ({})", self.input, self.format);
        info!("Final state: {}", self.state);
        info!("Total execution time: {}", format_elapsed(self.elapsed));
        info!("");
        info!("Rows read: {} in {} batches", self.rows_read, self.batches);
        info!("  Created: {}", self.counts.created);
        info!("  Updated: {}", self.counts.updated);
        info!("  Skipped (already stored): {}", self.counts.skipped);
        info!("  Rejected: {}", self.counts.rejected);
        for (reason, count) in &self.rejections {
            info!("    {}: {} ({})", reason.code(), count, reason);
        }
        info!("  Malformed: {}", self.malformed);
        info!("");
        info!(
            "Journal linkage: {}/{} matched ({:.1}%)",
            self.journal_matched(),
            self.journal_attempts,
            self.journal_match_rate()
        );
        for (method, count) in &self.journal_matches {
            info!("  {}: {}", method, count);
        }
        if let Some(err) = &self.error {
            info!("");
            error!("Error: {}", err);
        }
        if self.state != IngestState::Done {
            info!("");
            info!("Resume with --skip-rows {}", self.resume_offset);
        }
        info!("=========================================================");
    }
}

struct Linked {
    key: String,
    record: PaperRecord,
    link: Option<(i64, Option<String>, MatchMethod)>,
}

#[derive(Default)]
struct PreparedBatch {
    rows: Vec<PaperRow>,
    rejections: BTreeMap<RejectReason, u64>,
    journal_attempts: u64,
    journal_matches: BTreeMap<MatchMethod, u64>,
}

impl PreparedBatch {
    fn reject(&mut self, reason: RejectReason) {
        *self.rejections.entry(reason).or_insert(0) += 1;
    }

    fn rejected(&self) -> u64 {
        self.rejections.values().sum()
    }
}

pub struct Ingestor<'a, S: PaperSink> {
    sink: &'a mut S,
    directory: &'a JournalDirectory,
    options: IngestOptions,
    stop: &'a AtomicBool,
    state: IngestState,
    run_id: String,
    resumed: Option<Checkpoint>,
    on_batch: Option<Box<dyn FnMut(&BatchReport) + 'a>>,
}

impl<'a, S: PaperSink> Ingestor<'a, S> {
    pub fn new(sink: &'a mut S, directory: &'a JournalDirectory, options: IngestOptions) -> Self {
        Self {
            sink,
            directory,
            options,
            stop: shutdown_flag(),
            state: IngestState::Idle,
            run_id: uuid::Uuid::new_v4().to_string(),
            resumed: None,
            on_batch: None,
        }
    }

    /// Use a flag other than the process-wide signal flag
    pub fn with_stop_flag(mut self, stop: &'a AtomicBool) -> Self {
        self.stop = stop;
        self
    }

    /// Continue the run a checkpoint was saved for: its run id is kept and
    /// its committed totals are carried into the summary and later checkpoints
    pub fn resume_from(mut self, checkpoint: Checkpoint) -> Self {
        self.run_id = checkpoint.run_id.clone();
        self.resumed = Some(checkpoint);
        self
    }

    pub fn on_batch(mut self, callback: impl FnMut(&BatchReport) + 'a) -> Self {
        self.on_batch = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn transition(&mut self, next: IngestState) {
        debug!("{} -> {}", self.state, next);
        self.state = next;
    }

    /// Open `input` with the configured reader options and ingest it
    pub fn run(&mut self, input: &Path) -> Result<IngestSummary> {
        let reader = BatchReader::open(input, self.options.reader.clone())?;
        self.run_reader(reader, &input.display().to_string())
    }

    /// Ingest every batch of `reader`.
    ///
    /// Returns `Err` only for problems detected before the first batch (an
    /// input whose header does not fit the format). Failures after that end
    /// the run in `Failed` and are reported through the summary.
    pub fn run_reader(&mut self, mut reader: BatchReader, input: &str) -> Result<IngestSummary> {
        let mapping = PaperMapping::new(self.options.format, reader.headers())
            .with_context(|| format!("Input {} does not fit format {}", input, self.options.format))?;
        for (field, column) in mapping.columns.sources() {
            debug!("  {:?} <- {}", field, column);
        }

        let start = Instant::now();
        let mut summary = IngestSummary::new(
            &self.run_id,
            input,
            self.options.format,
            self.options.reader.skip_rows,
        );
        if let Some(checkpoint) = &self.resumed {
            summary.seed_from(checkpoint);
        }

        info!(
            "Ingesting {} as {} (run {}, batch size {}, mode {:?})",
            input, self.options.format, self.run_id, self.options.reader.batch_size, self.options.mode
        );
        if self.options.require_journal && self.directory.is_empty() {
            warn!("Journal linkage is required but the directory is empty; every paper will be rejected");
        }

        loop {
            if self.stop.load(Ordering::SeqCst) {
                warn!("Stop requested; ending run after {} committed batches", summary.batches);
                self.transition(IngestState::Interrupted);
                break;
            }

            self.transition(IngestState::Reading);
            let batch = match reader.next() {
                None => {
                    summary.resume_offset = reader.offset();
                    self.transition(IngestState::Done);
                    break;
                }
                Some(Err(e)) => {
                    error!("Read failed after row {}: {:#}", summary.resume_offset, e);
                    summary.error = Some(format!("{:#}", e));
                    self.transition(IngestState::Failed);
                    break;
                }
                Some(Ok(batch)) => batch,
            };

            let batch_start = Instant::now();
            let prepared = self.prepare_batch(&mapping, &batch);

            self.transition(IngestState::Writing);
            let written = if prepared.rows.is_empty() {
                Ok(BatchCounts::default())
            } else {
                self.write_with_retry(&prepared.rows, batch.index)
            };
            let mut counts = match written {
                Ok(counts) => counts,
                Err(e) => {
                    error!("{:#}", e);
                    summary.error = Some(format!("{:#}", e));
                    summary.resume_offset = batch.start_offset;
                    self.transition(IngestState::Failed);
                    break;
                }
            };

            // writer-level rejects have no usable key
            let mut rejections = prepared.rejections.clone();
            if counts.rejected > 0 {
                *rejections.entry(RejectReason::NoIdentifier).or_insert(0) += counts.rejected;
            }
            counts.rejected += prepared.rejected();

            summary.batches += 1;
            summary.rows_read += batch.rows_consumed;
            summary.resume_offset = batch.end_offset();
            summary.malformed += batch.malformed;
            summary.counts.add(&counts);
            summary.journal_attempts += prepared.journal_attempts;
            for (reason, n) in rejections {
                *summary.rejections.entry(reason).or_insert(0) += n;
            }
            for (method, n) in prepared.journal_matches {
                *summary.journal_matches.entry(method).or_insert(0) += n;
            }

            let rate = batch.rows_consumed as f64 / batch_start.elapsed().as_secs_f64().max(1e-9);
            let elapsed = start.elapsed();
            info!(
                "Batch {}: rows {}-{} | {} created | {} updated | {} skipped | {} rejected | {} malformed | {:.0} rows/s",
                batch.index,
                batch.start_offset + 1,
                batch.end_offset(),
                counts.created,
                counts.updated,
                counts.skipped,
                counts.rejected,
                batch.malformed,
                rate
            );
            info!(
                "  Total: {} rows read | {} created | {} updated | {} skipped | {} rejected | elapsed {} | mem {}",
                summary.rows_read,
                summary.counts.created,
                summary.counts.updated,
                summary.counts.skipped,
                summary.counts.rejected,
                format_elapsed(elapsed),
                format_memory(current_rss_mb())
            );

            self.save_checkpoint(&summary);

            if let Some(callback) = self.on_batch.as_mut() {
                callback(&BatchReport {
                    index: batch.index,
                    offset: batch.end_offset(),
                    rows: batch.rows_consumed,
                    counts,
                    malformed: batch.malformed,
                    bytes_read: reader.bytes_read(),
                    rows_read: summary.rows_read,
                    totals: summary.counts,
                    elapsed,
                });
            }
        }

        summary.state = self.state;
        summary.elapsed = start.elapsed();
        self.save_checkpoint(&summary);
        Ok(summary)
    }

    fn prepare_batch(&mut self, mapping: &PaperMapping, batch: &Batch) -> PreparedBatch {
        let directory = self.directory;
        let linker = self.options.linker.clone();

        self.transition(IngestState::Normalizing);
        let normalized: Vec<Result<PaperRecord, RejectReason>> = batch
            .rows
            .par_iter()
            .map(|row| mapping.normalize(row))
            .collect();

        self.transition(IngestState::ResolvingLinking);
        let linked: Vec<Result<Linked, RejectReason>> = normalized
            .into_par_iter()
            .map(|record| {
                let record = record?;
                let key = resolve_key(&record)?;
                let link = directory
                    .link(&record.issns, record.journal_title.as_deref(), &linker)
                    .map(|m| (m.entry.id, m.entry.primary_subject().map(String::from), m.method));
                Ok(Linked { key, record, link })
            })
            .collect();

        let mut prepared = PreparedBatch::default();
        let mut to_score = Vec::with_capacity(linked.len());
        for item in linked {
            match item {
                Ok(linked) => {
                    prepared.journal_attempts += 1;
                    match &linked.link {
                        Some((_, _, method)) => {
                            *prepared.journal_matches.entry(*method).or_insert(0) += 1;
                        }
                        None if self.options.require_journal => {
                            prepared.reject(RejectReason::JournalNotMatched);
                            continue;
                        }
                        None => {}
                    }
                    to_score.push(linked);
                }
                Err(reason) => prepared.reject(reason),
            }
        }

        self.transition(IngestState::Scoring);
        prepared.rows = to_score
            .into_par_iter()
            .map(|linked| {
                let (journal_id, category) = match linked.link {
                    Some((id, category, _)) => (Some(id), category),
                    None => (None, None),
                };
                PaperRow {
                    score: compute_score(&linked.record.indicators),
                    key: linked.key,
                    record: linked.record,
                    journal_id,
                    category,
                }
            })
            .collect();

        prepared
    }

    fn write_with_retry(&mut self, rows: &[PaperRow], batch_index: usize) -> Result<BatchCounts> {
        match self.sink.write_batch(rows, self.options.mode) {
            Ok(counts) => Ok(counts),
            Err(first) => {
                warn!("Batch {} write failed, retrying once: {:#}", batch_index, first);
                self.sink
                    .write_batch(rows, self.options.mode)
                    .with_context(|| {
                        format!(
                            "Batch {} failed on retry (first attempt: {:#})",
                            batch_index, first
                        )
                    })
            }
        }
    }

    fn save_checkpoint(&self, summary: &IngestSummary) {
        let Some(path) = &self.options.checkpoint else {
            return;
        };
        let mut checkpoint = summary.checkpoint(self.options.mode);
        checkpoint.state = self.state;
        if let Err(e) = checkpoint.save(path) {
            warn!("Could not save checkpoint: {:#}", e);
        }
    }
}
