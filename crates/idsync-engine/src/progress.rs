//! Export progress reporting.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Phase of an export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPhase {
    Preparing,
    Executing,
    Completed,
}

/// Progress snapshot emitted at batch boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportProgress {
    pub phase: ExportPhase,
    pub processed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ExportProgress {
    #[must_use]
    pub fn preparing() -> Self {
        Self {
            phase: ExportPhase::Preparing,
            processed: 0,
            total: 0,
            succeeded: 0,
            failed: 0,
        }
    }

    /// Percentage of due exports processed so far.
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.processed as f64 / self.total as f64) * 100.0
        }
    }
}

/// Best-effort progress observer. Must not block.
pub type ProgressCallback = Arc<dyn Fn(ExportProgress) + Send + Sync>;
