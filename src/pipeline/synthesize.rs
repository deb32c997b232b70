//! Final synthesis: merge ordered chunk summaries into one summary.
//!
//! One model call builds the summary from every chunk summary plus the page
//! budget. If the answer overruns the budget by more than the configured
//! tolerance, a single second call asks the model to condense further; there
//! is never a third. A condense call that fails leaves the first draft in
//! place, since an overlong summary beats none.

use crate::backend::{complete_with_retry, BackendError};
use crate::cancel::CancellationToken;
use crate::error::SummaryError;
use crate::pipeline::postprocess::clean_summary;
use crate::pipeline::summarize::{estimate_pages, ChunkSummary, StageContext};
use crate::prompts::CONDENSE_INSTRUCTION;
use tracing::{info, warn};

/// A finished final summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalDraft {
    pub text: String,
    pub estimated_pages: u32,
    /// True when the condense pass produced `text`.
    pub condensed: bool,
    /// Model calls used across both passes.
    pub attempts: u32,
}

/// Outcome of [`synthesize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Synthesis {
    Completed(FinalDraft),
    Cancelled,
}

/// Build the final summary from `summaries` (any order; sorted by chunk index here).
pub async fn synthesize(
    ctx: StageContext<'_>,
    summaries: &[ChunkSummary],
    page_budget: u32,
    cancel: &CancellationToken,
) -> Result<Synthesis, SummaryError> {
    let mut ordered: Vec<&ChunkSummary> = summaries.iter().collect();
    ordered.sort_by_key(|s| s.index);
    let texts: Vec<&str> = ordered
        .iter()
        .map(|s| s.text.as_str())
        .filter(|t| !t.trim().is_empty())
        .collect();

    let prompt = ctx
        .prompts
        .resolve_final_prompt(ctx.report_type, &texts, page_budget)?;

    if cancel.is_cancelled() {
        info!("Cancelled before synthesis");
        return Ok(Synthesis::Cancelled);
    }

    info!(
        "Synthesising {} chunk summaries (budget {} page(s))",
        texts.len(),
        page_budget
    );
    let first = complete_with_retry(
        ctx.backend,
        &prompt,
        ctx.config.chunk_retries,
        ctx.config.retry_backoff_ms,
        "Synthesis",
    )
    .await;
    if cancel.is_cancelled() {
        info!("Cancelled during synthesis; result discarded");
        return Ok(Synthesis::Cancelled);
    }
    let mut attempts = first.attempts;
    let text = clean_summary(&first.result.map_err(|e| stage_error(e, attempts))?);
    let estimated_pages = estimate_pages(&text, ctx.config.chars_per_page);

    let limit = page_budget.saturating_add(ctx.config.page_tolerance);
    if estimated_pages <= limit || !ctx.config.condense_on_overrun {
        return Ok(Synthesis::Completed(FinalDraft {
            text,
            estimated_pages,
            condensed: false,
            attempts,
        }));
    }

    info!(
        "Draft is ~{} page(s), over the {}-page limit; condensing once",
        estimated_pages, limit
    );
    let condense_prompt = format!("{prompt}{CONDENSE_INSTRUCTION}");
    let second = complete_with_retry(
        ctx.backend,
        &condense_prompt,
        ctx.config.chunk_retries,
        ctx.config.retry_backoff_ms,
        "Condense",
    )
    .await;
    if cancel.is_cancelled() {
        info!("Cancelled during condense pass; result discarded");
        return Ok(Synthesis::Cancelled);
    }
    attempts += second.attempts;

    match second.result {
        Ok(raw) => {
            let condensed = clean_summary(&raw);
            let pages = estimate_pages(&condensed, ctx.config.chars_per_page);
            Ok(Synthesis::Completed(FinalDraft {
                text: condensed,
                estimated_pages: pages,
                condensed: true,
                attempts,
            }))
        }
        Err(e) => {
            warn!("Condense pass failed ({}); keeping first draft", e);
            Ok(Synthesis::Completed(FinalDraft {
                text,
                estimated_pages,
                condensed: false,
                attempts,
            }))
        }
    }
}

fn stage_error(e: BackendError, attempts: u32) -> SummaryError {
    match e {
        BackendError::Unavailable(detail) => SummaryError::BackendUnavailable { attempts, detail },
        BackendError::Failed(detail) => SummaryError::Synthesis { attempts, detail },
    }
}
