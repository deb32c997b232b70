//! Observable state of a summarisation run.
//!
//! [`RunState`] is written only by the session's driver and published to
//! observers as snapshots. It is plain data (`Clone + Serialize`) so a
//! presentation layer can render it, diff it or ship it as JSON.
//!
//! ## Retention
//!
//! `final_summary` outlives the run that produced it. Starting a new run does
//! not clear it; the new run overwrites it when it completes, and only
//! [`crate::session::SummarySession::reset`] empties it. The summary records
//! its own `run_id`, so a lookup by run never returns another run's text.

use crate::config::{PageBudget, ReportType};
use crate::error::{ErrorKind, ExtractionError, SummaryError};
use crate::pipeline::chunk::Chunk;
use crate::pipeline::summarize::ChunkSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one run within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Extracting,
    Chunking,
    Summarizing,
    Synthesizing,
    Completed,
    Cancelled,
    Failed,
}

impl RunPhase {
    /// A run in this phase blocks a new submit.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            RunPhase::Extracting | RunPhase::Chunking | RunPhase::Summarizing | RunPhase::Synthesizing
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Cancelled | RunPhase::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Idle => "idle",
            RunPhase::Extracting => "extracting",
            RunPhase::Chunking => "chunking",
            RunPhase::Summarizing => "summarizing",
            RunPhase::Synthesizing => "synthesizing",
            RunPhase::Completed => "completed",
            RunPhase::Cancelled => "cancelled",
            RunPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Chunks summarised so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChunkProgress {
    pub completed: usize,
    pub total: usize,
}

/// A chunk without its text, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkOutline {
    pub index: usize,
    pub pages: Vec<usize>,
    pub char_count: usize,
}

impl From<&Chunk> for ChunkOutline {
    fn from(c: &Chunk) -> Self {
        Self {
            index: c.index,
            pages: c.pages.clone(),
            char_count: c.char_count,
        }
    }
}

/// Why a run failed, as shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SummaryError> for RunFailure {
    fn from(e: &SummaryError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// A completed final summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalSummary {
    pub run_id: RunId,
    pub report_type: ReportType,
    pub text: String,
    pub estimated_pages: u32,
    pub page_budget: u32,
    pub condensed: bool,
    pub completed_at: DateTime<Utc>,
}

/// Snapshot of the session's current (or most recent) run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// None until the first submit, and again after reset.
    pub run_id: Option<RunId>,
    pub phase: RunPhase,
    pub document_fingerprint: Option<String>,
    pub page_count: usize,
    pub report_type: ReportType,
    pub page_budget: PageBudget,
    /// Concrete page budget handed to synthesis.
    pub resolved_page_budget: Option<u32>,
    pub pages_extracted: usize,
    pub cache_hits: usize,
    /// Pages whose extraction failed; they contributed empty text.
    pub page_failures: Vec<ExtractionError>,
    pub chunks: Vec<ChunkOutline>,
    pub progress: ChunkProgress,
    /// Chunk summaries in chunk order; kept after cancellation or failure.
    pub chunk_summaries: Vec<ChunkSummary>,
    pub cancel_requested: bool,
    pub error: Option<RunFailure>,
    /// Last completed summary of this session, possibly from an earlier run.
    pub final_summary: Option<FinalSummary>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    /// State for a freshly submitted run, carrying over the retained summary.
    pub(crate) fn started(
        run_id: RunId,
        document_fingerprint: String,
        page_count: usize,
        report_type: ReportType,
        page_budget: PageBudget,
        retained: Option<FinalSummary>,
    ) -> Self {
        Self {
            run_id: Some(run_id),
            phase: RunPhase::Extracting,
            document_fingerprint: Some(document_fingerprint),
            page_count,
            report_type,
            page_budget,
            final_summary: retained,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }

    /// The final summary if it was produced by `run_id`.
    pub fn summary_for(&self, run_id: RunId) -> Option<&FinalSummary> {
        self.final_summary.as_ref().filter(|s| s.run_id == run_id)
    }

    /// Wall-clock duration of the run, up to now if still running.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let start = self.started_at?;
        Some(self.finished_at.unwrap_or_else(Utc::now) - start)
    }

    /// Every chunk has a summary, so synthesis can run without redoing earlier stages.
    pub fn has_all_chunk_summaries(&self) -> bool {
        !self.chunks.is_empty() && self.chunk_summaries.len() == self.chunks.len()
    }
}
