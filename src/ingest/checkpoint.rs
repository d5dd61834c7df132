use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::IngestState;
use crate::common::RejectReason;
use crate::normalize::SourceFormat;
use crate::store::{BatchCounts, WriteMode};

/// Progress of an ingestion run, saved after every committed batch so an
/// interrupted or failed run can be resumed from `rows_committed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique identifier for this run
    pub run_id: String,
    pub input: String,
    pub format: SourceFormat,
    pub mode: WriteMode,
    pub state: IngestState,
    /// Data rows (from the start of the file) whose batches are committed
    pub rows_committed: u64,
    pub batches_committed: usize,
    pub counts: BatchCounts,
    pub malformed: u64,
    pub rejections: BTreeMap<RejectReason, u64>,
    /// Failure message when `state` is `Failed`
    pub error: Option<String>,
}

impl Checkpoint {
    pub fn new(run_id: &str, input: &str, format: SourceFormat, mode: WriteMode) -> Self {
        Self {
            run_id: run_id.to_string(),
            input: input.to_string(),
            format,
            mode,
            state: IngestState::Idle,
            rows_committed: 0,
            batches_committed: 0,
            counts: BatchCounts::default(),
            malformed: 0,
            rejections: BTreeMap::new(),
            error: None,
        }
    }

    /// Save checkpoint to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize checkpoint")?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write checkpoint to {:?}", tmp))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move checkpoint into place at {:?}", path))?;
        Ok(())
    }

    /// Load checkpoint from file, returning None if file doesn't exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint from {:?}", path))?;
        let checkpoint: Self =
            serde_json::from_str(&json).context("Failed to deserialize checkpoint")?;
        Ok(Some(checkpoint))
    }

    /// Offset to resume a run from, after checking the checkpoint belongs to this input
    pub fn resume_offset(&self, input: &str) -> Result<u64> {
        if self.input != input {
            bail!(
                "Checkpoint {} was written for '{}', not '{}'",
                self.run_id,
                self.input,
                input
            );
        }
        if self.state == IngestState::Done {
            bail!("Checkpoint {} is for a run that already completed", self.run_id);
        }
        Ok(self.rows_committed)
    }
}
