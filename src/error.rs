//! Error types for the edgequake-summarize library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SummaryError`] — **Fatal** to whatever produced it: a bad input file,
//!   a broken prompt template, an unreachable model backend, a chunk or
//!   synthesis call that failed after its retry. Inside a run these end the
//!   run in the `Failed` phase with the error's [`ErrorKind`] attached.
//!
//! * [`ExtractionError`] — **Non-fatal**: text extraction failed for a single
//!   page. The page is treated as empty and the run continues, so one
//!   unreadable scan never costs the whole report.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-summarize library.
#[derive(Debug, Error)]
pub enum SummaryError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    // ── Model backend errors ──────────────────────────────────────────────
    /// The configured provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model backend did not answer after every readiness probe / retry.
    #[error("Model backend unavailable after {attempts} attempt(s): {detail}\nIs the local model server running? (e.g. `ollama serve`)")]
    BackendUnavailable { attempts: u32, detail: String },

    /// A chunk's model call failed after its retry.
    #[error("Summarising chunk {chunk} failed after {attempts} attempt(s): {detail}")]
    ChunkSummary {
        chunk: usize,
        attempts: u32,
        detail: String,
    },

    /// The final synthesis call failed after its retry.
    #[error("Final synthesis failed after {attempts} attempt(s): {detail}")]
    Synthesis { attempts: u32, detail: String },

    /// A prompt template is missing or malformed for the selected report type.
    #[error("Prompt configuration error: {0}")]
    Configuration(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Extraction produced no text on any page, so there is nothing to summarise.
    #[error("No content extracted from the document ({pages} page(s) scanned)")]
    NoContent { pages: usize },

    // ── Session errors ────────────────────────────────────────────────────
    /// A run is already active in this session.
    #[error("Run {run_id} is still in progress; cancel it or wait for it to finish")]
    RunInProgress { run_id: u64 },

    /// The run id is not the session's current run.
    #[error("Unknown run {run_id}")]
    UnknownRun { run_id: u64 },

    /// The requested operation does not apply to the run's current state.
    #[error("Run {run_id} cannot be resynthesised: {reason}")]
    NotResumable { run_id: u64, reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output summary file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SummaryError {
    /// Classify the error for [`crate::state::RunFailure`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            SummaryError::FileNotFound { .. }
            | SummaryError::PermissionDenied { .. }
            | SummaryError::InvalidInput { .. }
            | SummaryError::DownloadFailed { .. }
            | SummaryError::DownloadTimeout { .. }
            | SummaryError::NotAPdf { .. }
            | SummaryError::CorruptPdf { .. }
            | SummaryError::PasswordRequired { .. }
            | SummaryError::WrongPassword { .. }
            | SummaryError::OutputWriteFailed { .. } => ErrorKind::Input,
            SummaryError::ProviderNotConfigured { .. }
            | SummaryError::Configuration(_)
            | SummaryError::InvalidConfig(_) => ErrorKind::Configuration,
            SummaryError::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            SummaryError::ChunkSummary { .. } => ErrorKind::ChunkSummary,
            SummaryError::Synthesis { .. } => ErrorKind::Synthesis,
            SummaryError::NoContent { .. } => ErrorKind::NoContent,
            SummaryError::RunInProgress { .. }
            | SummaryError::UnknownRun { .. }
            | SummaryError::NotResumable { .. } => ErrorKind::Session,
            SummaryError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Coarse error classification exposed to presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Extraction,
    BackendUnavailable,
    ChunkSummary,
    Synthesis,
    Configuration,
    Input,
    NoContent,
    Session,
    Internal,
}

/// A non-fatal error for a single page.
///
/// Logged and recorded in [`crate::state::RunState::page_failures`]; the
/// page then contributes empty text to chunking.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExtractionError {
    /// The page is image-only and no OCR backend is configured.
    #[error("Page {page}: no embedded text and no OCR backend configured")]
    OcrUnavailable { page: usize },

    /// The OCR call failed after retries.
    #[error("Page {page}: OCR failed after {attempts} attempt(s): {detail}")]
    OcrFailed {
        page: usize,
        attempts: u32,
        detail: String,
    },

    /// The page could not be rasterised and has no text layer.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The extractor collaborator failed for another reason.
    #[error("Page {page}: extraction failed: {detail}")]
    Failed { page: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_unavailable_display_and_kind() {
        let e = SummaryError::BackendUnavailable {
            attempts: 10,
            detail: "connection refused".into(),
        };
        assert!(e.to_string().contains("10 attempt"));
        assert!(e.to_string().contains("connection refused"));
        assert_eq!(e.kind(), ErrorKind::BackendUnavailable);
    }

    #[test]
    fn chunk_summary_display() {
        let e = SummaryError::ChunkSummary {
            chunk: 3,
            attempts: 2,
            detail: "HTTP 500".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("chunk 3"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::ChunkSummary);
    }

    #[test]
    fn configuration_errors_share_a_kind() {
        assert_eq!(
            SummaryError::Configuration("missing".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            SummaryError::InvalidConfig("budget".into()).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn extraction_error_display() {
        let e = ExtractionError::OcrFailed {
            page: 2,
            attempts: 3,
            detail: "timeout".into(),
        };
        assert!(e.to_string().starts_with("Page 2"));
    }

    #[test]
    fn error_kind_serialises_snake_case() {
        let json = serde_json::to_string(&ErrorKind::BackendUnavailable).unwrap();
        assert_eq!(json, "\"backend_unavailable\"");
    }
}
