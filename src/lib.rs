//! # edgequake-summarize
//!
//! Summarise long PDF reports (monthly progress, board, financial, audit,
//! or anything else) into a narrative of bounded length, using a local LLM.
//!
//! ## Why this crate?
//!
//! A 200-page board pack does not fit in a small local model's context
//! window. This crate reads each page (text layer, or vision OCR for scans),
//! groups pages into page-aligned chunks under a character budget, summarises
//! every chunk with a report-type-specific prompt, and merges the chunk
//! summaries into one final summary that respects an A4 page budget.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input       resolve local file or download from URL
//!  ├─ 2. Render      text layers + rasterise scans via pdfium (spawn_blocking)
//!  ├─ 3. Extract     per-page text through a content-addressed cache / OCR
//!  ├─ 4. Chunk       greedy, page-aligned, ≤ budget characters
//!  ├─ 5. Summarize   one model call per chunk, in order, with retries
//!  └─ 6. Synthesize  merge under the page budget, condense once on overrun
//! ```
//!
//! A [`SummarySession`] drives these stages for one run at a time and
//! publishes [`RunState`] snapshots for progress display and cancellation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_summarize::{PageBudget, ReportType, RunOptions, SummaryConfig, SummarySession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Ollama on localhost by default; see SummaryConfig for other providers.
//!     let session = SummarySession::from_config(SummaryConfig::default())?;
//!     let options = RunOptions::new(ReportType::BoardReport).page_budget(PageBudget::Pages(2));
//!     let run = session.submit_pdf("board-pack.pdf", options).await?;
//!     let state = session.wait(run).await?;
//!     if let Some(summary) = session.final_summary(run) {
//!         println!("{summary}");
//!     } else {
//!         eprintln!("run ended {}: {:?}", state.phase, state.error);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfsum` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-summarize = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;
pub mod state;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{BackendError, LlmBackend, ModelBackend};
pub use cache::{CacheStats, DiskExtractionCache, ExtractionCache, MemoryExtractionCache};
pub use cancel::CancellationToken;
pub use config::{OcrMode, PageBudget, ReportType, SummaryConfig, SummaryConfigBuilder};
pub use document::{Document, ExtractionMethod, Page, PagePayload};
pub use error::{ErrorKind, ExtractionError, SummaryError};
pub use pipeline::chunk::{chunk_pages, Chunk};
pub use pipeline::extract::{DefaultExtractor, ExtractedText, PageExtractor, VisionOcr};
pub use pipeline::render::load_document;
pub use pipeline::summarize::ChunkSummary;
pub use progress::{NoopProgressCallback, ProgressCallback, SummaryProgressCallback};
pub use prompts::PromptResolver;
pub use session::{write_summary, RunOptions, SummarySession, SummarySessionBuilder};
pub use state::{FinalSummary, RunFailure, RunId, RunPhase, RunState};
