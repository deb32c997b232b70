//! The run driver and its presentation-facing surface.
//!
//! A [`SummarySession`] owns the collaborators (model backend, extractor,
//! cache, prompts) and at most one active run. Presentation layers submit
//! documents, observe [`RunState`] snapshots, cancel, and fetch the final
//! summary; only the driver task ever writes the state.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle ─submit─▶ Extracting ─▶ Chunking ─▶ Summarizing ─▶ Synthesizing ─▶ Completed
//!                    │             │             │               │
//!                    └─────────────┴─────────────┴───────────────┴──▶ Cancelled | Failed
//! ```
//!
//! ## Why a single worker lane?
//!
//! The model backend is one local process with one model loaded. Every run
//! holds the session's lane lock for its whole duration, so even a run
//! submitted right after a cancel waits until the cancelled driver has
//! returned from its in-flight call. The backend never sees two callers.
//!
//! ## Submitting while busy
//!
//! A second [`SummarySession::submit`] while a run is active is rejected with
//! [`SummaryError::RunInProgress`]. Once the active run has been cancelled (or
//! the session reset) a new submit is accepted and queues on the lane.

use crate::backend::{wait_until_ready, LlmBackend, ModelBackend, Readiness};
use crate::cache::{CacheStats, DiskExtractionCache, ExtractionCache, MemoryExtractionCache};
use crate::cancel::CancellationToken;
use crate::config::{PageBudget, ReportType, SummaryConfig};
use crate::document::Document;
use crate::error::SummaryError;
use crate::pipeline::chunk::chunk_pages;
use crate::pipeline::extract::{extract_page_cached, DefaultExtractor, PageExtractor};
use crate::pipeline::render::load_document;
use crate::pipeline::summarize::{summarize_chunks, ChunkEvent, StageContext, StageEnd};
use crate::pipeline::synthesize::{synthesize, FinalDraft, Synthesis};
use crate::progress::ProgressCallback;
use crate::prompts::PromptResolver;
use crate::state::{ChunkOutline, ChunkProgress, FinalSummary, RunFailure, RunId, RunPhase, RunState};
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{error, info, warn};

/// Per-run choices.
#[derive(Clone, Default)]
pub struct RunOptions {
    pub report_type: ReportType,
    pub page_budget: PageBudget,
    pub progress: Option<ProgressCallback>,
}

impl RunOptions {
    pub fn new(report_type: ReportType) -> Self {
        Self {
            report_type,
            ..Self::default()
        }
    }

    pub fn page_budget(mut self, budget: PageBudget) -> Self {
        self.page_budget = budget;
        self
    }

    pub fn progress(mut self, cb: ProgressCallback) -> Self {
        self.progress = Some(cb);
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("report_type", &self.report_type)
            .field("page_budget", &self.page_budget)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

struct ActiveRun {
    id: RunId,
    cancel: CancellationToken,
}

struct Inner {
    backend: Arc<dyn ModelBackend>,
    extractor: Arc<dyn PageExtractor>,
    cache: Arc<dyn ExtractionCache>,
    prompts: PromptResolver,
    config: SummaryConfig,
    state: watch::Sender<RunState>,
    active: Mutex<Option<ActiveRun>>,
    lane: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

impl Inner {
    /// Apply `f` to the state if it still belongs to run `id`.
    fn update(&self, id: RunId, f: impl FnOnce(&mut RunState)) -> bool {
        self.state.send_if_modified(|s| {
            if s.run_id != Some(id) {
                return false;
            }
            f(s);
            true
        })
    }

    fn set_phase(&self, id: RunId, phase: RunPhase, progress: Option<&ProgressCallback>) {
        if self.update(id, |s| s.phase = phase) {
            info!("Run {}: {}", id, phase);
            if let Some(cb) = progress {
                cb.on_phase_change(phase);
            }
        }
    }

    fn active(&self) -> std::sync::MutexGuard<'_, Option<ActiveRun>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, id: RunId) {
        let mut active = self.active();
        if active.as_ref().is_some_and(|a| a.id == id) {
            *active = None;
        }
    }

    fn stage_context(&self, report_type: ReportType) -> StageContext<'_> {
        StageContext {
            backend: self.backend.as_ref(),
            prompts: &self.prompts,
            report_type,
            config: &self.config,
        }
    }
}

/// How the stages of a run ended, before it is written to the state.
enum Outcome {
    Completed { draft: FinalDraft, page_budget: u32 },
    Cancelled,
}

/// A summarisation session: one active run at a time, observable state,
/// and a retained final summary.
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct SummarySession {
    inner: Arc<Inner>,
}

impl SummarySession {
    /// Start building a session around `config`.
    pub fn builder(config: SummaryConfig) -> SummarySessionBuilder {
        SummarySessionBuilder {
            config,
            backend: None,
            extractor: None,
            cache: None,
            prompts: None,
        }
    }

    /// Session with every collaborator derived from `config`.
    pub fn from_config(config: SummaryConfig) -> Result<Self, SummaryError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &SummaryConfig {
        &self.inner.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    // ── Runs ─────────────────────────────────────────────────────────────

    /// Start summarising `document` in the background.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`SummaryError::RunInProgress`] while another run is active and has
    /// not been cancelled.
    pub fn submit(&self, document: Document, options: RunOptions) -> Result<RunId, SummaryError> {
        let id;
        let cancel = CancellationToken::new();
        {
            let mut active = self.inner.active();
            {
                let current = self.inner.state.borrow();
                if current.is_active() && !current.cancel_requested {
                    return Err(SummaryError::RunInProgress {
                        run_id: current.run_id.map(|r| r.0).unwrap_or_default(),
                    });
                }
            }
            id = RunId(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            let retained = self.inner.state.borrow().final_summary.clone();
            self.inner.state.send_replace(RunState::started(
                id,
                document.fingerprint.clone(),
                document.len(),
                options.report_type,
                options.page_budget,
                retained,
            ));
            *active = Some(ActiveRun {
                id,
                cancel: cancel.clone(),
            });
        }

        info!(
            "Run {}: submitted {} page(s) as {} (budget {:?})",
            id,
            document.len(),
            options.report_type,
            options.page_budget
        );
        if let Some(cb) = &options.progress {
            cb.on_run_start(id, document.len());
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _lane = inner.lane.lock().await;
            let outcome = run_stages(&inner, id, &document, &options, &cancel).await;
            finish(&inner, id, options.report_type, outcome, options.progress.as_ref());
        });
        Ok(id)
    }

    /// Load a PDF from a path or URL with this session's config, then [`submit`](Self::submit) it.
    pub async fn submit_pdf(&self, input: &str, options: RunOptions) -> Result<RunId, SummaryError> {
        let document = load_document(input, &self.inner.config).await?;
        self.submit(document, options)
    }

    /// Re-run synthesis alone for a run that ended `Failed` or `Cancelled`
    /// with every chunk summary present.
    pub fn resynthesize(&self, run_id: RunId) -> Result<(), SummaryError> {
        let cancel = CancellationToken::new();
        let (report_type, budget) = {
            let mut active = self.inner.active();
            let state = self.inner.state.borrow().clone();
            if state.run_id != Some(run_id) {
                return Err(SummaryError::UnknownRun { run_id: run_id.0 });
            }
            if state.is_active() {
                return Err(SummaryError::RunInProgress { run_id: run_id.0 });
            }
            if !matches!(state.phase, RunPhase::Failed | RunPhase::Cancelled) {
                return Err(SummaryError::NotResumable {
                    run_id: run_id.0,
                    reason: format!("run is {}", state.phase),
                });
            }
            if !state.has_all_chunk_summaries() {
                return Err(SummaryError::NotResumable {
                    run_id: run_id.0,
                    reason: format!(
                        "only {}/{} chunk summaries available",
                        state.chunk_summaries.len(),
                        state.chunks.len()
                    ),
                });
            }
            self.inner.update(run_id, |s| {
                s.phase = RunPhase::Synthesizing;
                s.error = None;
                s.cancel_requested = false;
                s.finished_at = None;
            });
            *active = Some(ActiveRun {
                id: run_id,
                cancel: cancel.clone(),
            });
            (state.report_type, state.page_budget)
        };

        info!("Run {}: resynthesising", run_id);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _lane = inner.lane.lock().await;
            let outcome = synthesis_stage(&inner, run_id, report_type, budget, &cancel).await;
            finish(&inner, run_id, report_type, outcome, None);
        });
        Ok(())
    }

    /// Request cooperative cancellation of `run_id`. Returns false when it is not the active run.
    pub fn cancel(&self, run_id: RunId) -> bool {
        let active = self.inner.active();
        match active.as_ref() {
            Some(run) if run.id == run_id => {
                run.cancel.cancel();
                self.inner.update(run_id, |s| s.cancel_requested = true);
                info!("Run {}: cancellation requested", run_id);
                true
            }
            _ => false,
        }
    }

    /// Cancel any active run and return to `Idle`, clearing the retained summary.
    pub fn reset(&self) {
        let mut active = self.inner.active();
        if let Some(run) = active.take() {
            run.cancel.cancel();
        }
        self.inner.state.send_replace(RunState::default());
        info!("Session reset");
    }

    // ── Observation ──────────────────────────────────────────────────────

    /// Snapshot of `run_id`, which must be the session's current run.
    pub fn progress(&self, run_id: RunId) -> Result<RunState, SummaryError> {
        let state = self.inner.state.borrow();
        if state.run_id == Some(run_id) {
            Ok(state.clone())
        } else {
            Err(SummaryError::UnknownRun { run_id: run_id.0 })
        }
    }

    /// Snapshot of whatever the session currently holds.
    pub fn snapshot(&self) -> RunState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.inner.state.subscribe()
    }

    /// State changes as a stream, starting with the current snapshot.
    pub fn progress_stream(&self) -> WatchStream<RunState> {
        WatchStream::new(self.inner.state.subscribe())
    }

    /// Wait until `run_id` reaches a terminal phase.
    ///
    /// Fails with [`SummaryError::UnknownRun`] if the run is (or becomes)
    /// superseded by a reset or a newer submit.
    pub async fn wait(&self, run_id: RunId) -> Result<RunState, SummaryError> {
        let mut rx = self.inner.state.subscribe();
        let state = rx
            .wait_for(|s| s.run_id != Some(run_id) || s.phase.is_terminal())
            .await
            .map_err(|_| SummaryError::Internal("session state closed".to_string()))?
            .clone();
        if state.run_id == Some(run_id) {
            Ok(state)
        } else {
            Err(SummaryError::UnknownRun { run_id: run_id.0 })
        }
    }

    /// The final summary text produced by `run_id`, if it completed and is still retained.
    pub fn final_summary(&self, run_id: RunId) -> Option<String> {
        self.inner
            .state
            .borrow()
            .summary_for(run_id)
            .map(|s| s.text.clone())
    }

    /// The most recent completed summary, whichever run produced it.
    pub fn latest_summary(&self) -> Option<FinalSummary> {
        self.inner.state.borrow().final_summary.clone()
    }
}

impl std::fmt::Debug for SummarySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarySession")
            .field("backend", &self.inner.backend.name())
            .field("phase", &self.inner.state.borrow().phase)
            .finish()
    }
}

// ── Driver ───────────────────────────────────────────────────────────────

async fn run_stages(
    inner: &Inner,
    id: RunId,
    document: &Document,
    options: &RunOptions,
    cancel: &CancellationToken,
) -> Result<Outcome, SummaryError> {
    let progress = options.progress.as_ref();
    let total_pages = document.len();

    // Fail fast on templates: OCR is a model call too.
    inner.prompts.validate(options.report_type)?;

    // ── Extracting ───────────────────────────────────────────────────────
    inner.set_phase(id, RunPhase::Extracting, progress);
    let mut page_texts: Vec<(usize, String)> = Vec::with_capacity(total_pages);
    for page in &document.pages {
        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        match extract_page_cached(inner.extractor.as_ref(), &inner.cache, page).await {
            Ok(extraction) => {
                inner.update(id, |s| {
                    s.pages_extracted += 1;
                    if extraction.from_cache {
                        s.cache_hits += 1;
                    }
                });
                if let Some(cb) = progress {
                    cb.on_page_extracted(page.index, total_pages, extraction.method, extraction.from_cache);
                }
                page_texts.push((page.index, extraction.text));
            }
            Err(e) => {
                warn!("Run {}: {}; page treated as empty", id, e);
                if let Some(cb) = progress {
                    cb.on_page_error(page.index, total_pages, &e.to_string());
                }
                inner.update(id, |s| {
                    s.pages_extracted += 1;
                    s.page_failures.push(e);
                });
                page_texts.push((page.index, String::new()));
            }
        }
    }

    // ── Chunking ─────────────────────────────────────────────────────────
    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }
    inner.set_phase(id, RunPhase::Chunking, progress);
    if page_texts.iter().all(|(_, t)| t.trim().is_empty()) {
        return Err(SummaryError::NoContent { pages: total_pages });
    }
    let chunks = chunk_pages(&page_texts, inner.config.chunk_budget_chars);
    info!(
        "Run {}: {} page(s) → {} chunk(s)",
        id,
        total_pages,
        chunks.len()
    );
    inner.update(id, |s| {
        s.chunks = chunks.iter().map(ChunkOutline::from).collect();
        s.progress = ChunkProgress {
            completed: 0,
            total: chunks.len(),
        };
    });
    if let Some(cb) = progress {
        cb.on_chunks_ready(chunks.len());
    }

    // ── Summarizing ──────────────────────────────────────────────────────
    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }
    inner.set_phase(id, RunPhase::Summarizing, progress);
    let readiness = wait_until_ready(
        inner.backend.as_ref(),
        inner.config.readiness_attempts,
        inner.config.readiness_backoff_ms,
        cancel,
    )
    .await?;
    if readiness == Readiness::Cancelled {
        return Ok(Outcome::Cancelled);
    }

    let run = summarize_chunks(
        inner.stage_context(options.report_type),
        &chunks,
        cancel,
        &mut |event| match event {
            ChunkEvent::Started { index, total } => {
                if let Some(cb) = progress {
                    cb.on_chunk_start(index, total);
                }
            }
            ChunkEvent::Completed {
                completed,
                total,
                summary,
            } => {
                inner.update(id, |s| {
                    s.chunk_summaries.push(summary.clone());
                    s.progress.completed = completed;
                });
                if let Some(cb) = progress {
                    cb.on_chunk_complete(completed, total, summary);
                }
            }
        },
    )
    .await;
    match run.end {
        StageEnd::Completed => {}
        StageEnd::Cancelled => return Ok(Outcome::Cancelled),
        StageEnd::Failed(e) => return Err(e),
    }

    // ── Synthesizing ─────────────────────────────────────────────────────
    inner.set_phase(id, RunPhase::Synthesizing, progress);
    synthesis_stage(inner, id, options.report_type, options.page_budget, cancel).await
}

/// Resolve the page budget from the recorded chunk summaries and synthesise.
async fn synthesis_stage(
    inner: &Inner,
    id: RunId,
    report_type: ReportType,
    page_budget: PageBudget,
    cancel: &CancellationToken,
) -> Result<Outcome, SummaryError> {
    if cancel.is_cancelled() {
        return Ok(Outcome::Cancelled);
    }
    let summaries = {
        let state = inner.state.borrow();
        if state.run_id != Some(id) {
            return Ok(Outcome::Cancelled);
        }
        state.chunk_summaries.clone()
    };

    let auto: u32 = summaries
        .iter()
        .fold(0u32, |acc, s| acc.saturating_add(s.estimated_pages));
    let budget = page_budget.resolve(auto);
    inner.update(id, |s| s.resolved_page_budget = Some(budget));

    match synthesize(inner.stage_context(report_type), &summaries, budget, cancel).await? {
        Synthesis::Completed(draft) => Ok(Outcome::Completed {
            draft,
            page_budget: budget,
        }),
        Synthesis::Cancelled => Ok(Outcome::Cancelled),
    }
}

/// Write the terminal phase for `id` and release the active slot.
///
/// Callbacks see the terminal state before it is published, so anyone woken
/// by [`SummarySession::wait`] observes a run whose callbacks have all fired.
fn finish(
    inner: &Inner,
    id: RunId,
    report_type: ReportType,
    outcome: Result<Outcome, SummaryError>,
    progress: Option<&ProgressCallback>,
) {
    inner.release(id);

    let mut state = inner.state.borrow().clone();
    if state.run_id != Some(id) {
        // Superseded by a reset or a newer submit.
        return;
    }
    let now = Utc::now();
    state.finished_at = Some(now);
    state.phase = match outcome {
        Ok(Outcome::Completed { draft, page_budget }) => {
            state.final_summary = Some(FinalSummary {
                run_id: id,
                report_type,
                text: draft.text,
                estimated_pages: draft.estimated_pages,
                page_budget,
                condensed: draft.condensed,
                completed_at: now,
            });
            RunPhase::Completed
        }
        Ok(Outcome::Cancelled) => RunPhase::Cancelled,
        Err(e) => {
            error!("Run {} failed: {}", id, e);
            state.error = Some(RunFailure::from(&e));
            RunPhase::Failed
        }
    };

    info!(
        "Run {}: {} ({} chunk summaries, {:.1}s)",
        id,
        state.phase,
        state.chunk_summaries.len(),
        state
            .elapsed()
            .map(|d| d.num_milliseconds() as f64 / 1000.0)
            .unwrap_or_default()
    );
    if let Some(cb) = progress {
        cb.on_phase_change(state.phase);
        cb.on_run_complete(&state);
    }
    inner.update(id, |s| *s = state);
}

// ── Output ───────────────────────────────────────────────────────────────

/// Write `text` to `path` atomically (temp file + rename), creating parent directories.
pub async fn write_summary(path: impl AsRef<Path>, text: &str) -> Result<(), SummaryError> {
    let path = path.as_ref();
    let write_err = |e| SummaryError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut body = text.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, body).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Builder for [`SummarySession`]. Collaborators left unset are derived from the config.
pub struct SummarySessionBuilder {
    config: SummaryConfig,
    backend: Option<Arc<dyn ModelBackend>>,
    extractor: Option<Arc<dyn PageExtractor>>,
    cache: Option<Arc<dyn ExtractionCache>>,
    prompts: Option<PromptResolver>,
}

impl SummarySessionBuilder {
    pub fn backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn PageExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn ExtractionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn prompts(mut self, prompts: PromptResolver) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// Build the session.
    ///
    /// Without an explicit backend an [`LlmBackend`] is created from the
    /// config, and the default extractor OCRs through the same provider.
    /// With an explicit backend and no extractor, only text layers are read.
    pub fn build(self) -> Result<SummarySession, SummaryError> {
        let config = self.config;

        let (backend, extractor): (Arc<dyn ModelBackend>, Arc<dyn PageExtractor>) =
            match (self.backend, self.extractor) {
                (Some(b), Some(e)) => (b, e),
                (Some(b), None) => (b, Arc::new(DefaultExtractor::text_only())),
                (None, extractor) => {
                    let llm = LlmBackend::from_config(&config)?;
                    let extractor = extractor.unwrap_or_else(|| {
                        Arc::new(DefaultExtractor::from_config(&config, llm.provider()))
                    });
                    (Arc::new(llm), extractor)
                }
            };

        let cache: Arc<dyn ExtractionCache> = match (self.cache, &config.cache_dir) {
            (Some(c), _) => c,
            (None, Some(dir)) => {
                let disk = DiskExtractionCache::open(dir)
                    .map_err(|e| SummaryError::InvalidConfig(format!("cache directory: {e}")))?;
                if let Some(days) = config.cache_max_age_days {
                    match disk.prune_older_than(Duration::from_secs(days * 24 * 3600)) {
                        Ok(n) if n > 0 => info!("Pruned {} stale cache entries", n),
                        Ok(_) => {}
                        Err(e) => warn!("Cache pruning failed: {}", e),
                    }
                }
                Arc::new(disk)
            }
            (None, None) => Arc::new(MemoryExtractionCache::new()),
        };

        let prompts = match (self.prompts, &config.prompt_dir) {
            (Some(p), _) => p,
            (None, Some(dir)) => PromptResolver::from_dir(dir)?,
            (None, None) => PromptResolver::builtin(),
        };

        let (state, _) = watch::channel(RunState::default());
        Ok(SummarySession {
            inner: Arc::new(Inner {
                backend,
                extractor,
                cache,
                prompts,
                config,
                state,
                active: Mutex::new(None),
                lane: tokio::sync::Mutex::new(()),
                next_id: AtomicU64::new(0),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl ModelBackend for Echo {
        async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
            Ok("summary".to_string())
        }
    }

    fn session() -> SummarySession {
        let config = SummaryConfig::builder()
            .chunk_budget_chars(1000)
            .readiness_backoff_ms(1)
            .retry_backoff_ms(1)
            .build()
            .unwrap();
        SummarySession::builder(config)
            .backend(Arc::new(Echo))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn completes_and_retains_summary() {
        let s = session();
        let id = s
            .submit(Document::from_texts(["a", "b"]), RunOptions::default())
            .unwrap();
        let state = s.wait(id).await.unwrap();
        assert_eq!(state.phase, RunPhase::Completed);
        assert_eq!(s.final_summary(id).as_deref(), Some("summary"));
        assert_eq!(state.resolved_page_budget, Some(1));
    }

    #[tokio::test]
    async fn unknown_run_lookups() {
        let s = session();
        assert!(matches!(
            s.progress(RunId(9)),
            Err(SummaryError::UnknownRun { run_id: 9 })
        ));
        assert!(!s.cancel(RunId(9)));
        assert!(s.final_summary(RunId(9)).is_none());
        assert!(matches!(
            s.resynthesize(RunId(9)),
            Err(SummaryError::UnknownRun { .. })
        ));
    }

    #[tokio::test]
    async fn empty_document_has_no_content() {
        let s = session();
        let id = s
            .submit(Document::from_texts(["", "  "]), RunOptions::default())
            .unwrap();
        let state = s.wait(id).await.unwrap();
        assert_eq!(state.phase, RunPhase::Failed);
        assert_eq!(
            state.error.map(|e| e.kind),
            Some(crate::error::ErrorKind::NoContent)
        );
    }

    #[tokio::test]
    async fn write_summary_creates_parents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out/board.md");
        write_summary(&path, "Summary").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Summary\n");
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn completed_run_is_not_resumable() {
        let s = session();
        let id = s
            .submit(Document::from_texts(["a"]), RunOptions::default())
            .unwrap();
        s.wait(id).await.unwrap();
        assert!(matches!(
            s.resynthesize(id),
            Err(SummaryError::NotResumable { .. })
        ));
    }
}
