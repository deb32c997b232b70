//! Sequential chunk summarisation.
//!
//! ## Why sequential?
//!
//! The model backend is a single local server that holds one model in memory
//! and offers no guarantee about concurrent requests. Chunk *i + 1* is
//! therefore never sent before chunk *i* has returned, which also gives
//! progress events in strictly ascending chunk order for free.
//!
//! ## Cancellation
//!
//! The token is checked before every chunk. A call already in flight runs to
//! completion, but if cancellation was requested meanwhile its result is
//! dropped, so the summaries returned are exactly those that finished before
//! the request.

use crate::backend::{complete_with_retry, BackendError, ModelBackend};
use crate::cancel::CancellationToken;
use crate::config::{ReportType, SummaryConfig};
use crate::error::SummaryError;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::postprocess::clean_summary;
use crate::prompts::PromptResolver;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Everything a model-facing stage needs besides its input.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub backend: &'a dyn ModelBackend,
    pub prompts: &'a PromptResolver,
    pub report_type: ReportType,
    pub config: &'a SummaryConfig,
}

/// The model's summary of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSummary {
    /// Index of the chunk this summarises (1-based).
    pub index: usize,
    /// Pages the chunk covered.
    pub pages: Vec<usize>,
    pub text: String,
    /// Rendered A4 pages this summary would take.
    pub estimated_pages: u32,
    /// Model calls used; 0 for a chunk with no text.
    pub attempts: u32,
}

/// How a stage ended.
#[derive(Debug)]
pub enum StageEnd {
    Completed,
    Cancelled,
    Failed(SummaryError),
}

/// Summaries produced so far plus how the stage ended.
#[derive(Debug)]
pub struct ChunkRun {
    pub summaries: Vec<ChunkSummary>,
    pub end: StageEnd,
}

/// Progress events emitted in chunk order.
#[derive(Debug)]
pub enum ChunkEvent<'a> {
    Started { index: usize, total: usize },
    Completed {
        completed: usize,
        total: usize,
        summary: &'a ChunkSummary,
    },
}

/// Pages `text` would fill at `chars_per_page` characters per page, rounded up.
pub fn estimate_pages(text: &str, chars_per_page: usize) -> u32 {
    let chars = text.chars().count();
    let per_page = chars_per_page.max(1);
    u32::try_from(chars.div_ceil(per_page)).unwrap_or(u32::MAX)
}

/// Summarise `chunks` one at a time, in order.
pub async fn summarize_chunks(
    ctx: StageContext<'_>,
    chunks: &[Chunk],
    cancel: &CancellationToken,
    on_event: &mut (dyn FnMut(ChunkEvent<'_>) + Send),
) -> ChunkRun {
    let total = chunks.len();
    let mut summaries: Vec<ChunkSummary> = Vec::with_capacity(total);

    for chunk in chunks {
        if cancel.is_cancelled() {
            info!("Cancelled before chunk {}/{}", chunk.index, total);
            return ChunkRun {
                summaries,
                end: StageEnd::Cancelled,
            };
        }
        on_event(ChunkEvent::Started {
            index: chunk.index,
            total,
        });

        let summary = if chunk.text.trim().is_empty() {
            debug!("Chunk {} has no text; skipping model call", chunk.index);
            ChunkSummary {
                index: chunk.index,
                pages: chunk.pages.clone(),
                text: String::new(),
                estimated_pages: 0,
                attempts: 0,
            }
        } else {
            let prompt = match ctx.prompts.resolve_chunk_prompt(ctx.report_type, &chunk.text) {
                Ok(p) => p,
                Err(e) => {
                    return ChunkRun {
                        summaries,
                        end: StageEnd::Failed(e),
                    }
                }
            };
            debug!(
                "Chunk {}/{}: pages {:?}, {} chars",
                chunk.index, total, chunk.pages, chunk.char_count
            );

            let what = format!("Chunk {}/{}", chunk.index, total);
            let outcome = complete_with_retry(
                ctx.backend,
                &prompt,
                ctx.config.chunk_retries,
                ctx.config.retry_backoff_ms,
                &what,
            )
            .await;

            if cancel.is_cancelled() {
                info!("Cancelled during chunk {}/{}; result discarded", chunk.index, total);
                return ChunkRun {
                    summaries,
                    end: StageEnd::Cancelled,
                };
            }

            match outcome.result {
                Ok(raw) => {
                    let text = clean_summary(&raw);
                    ChunkSummary {
                        index: chunk.index,
                        pages: chunk.pages.clone(),
                        estimated_pages: estimate_pages(&text, ctx.config.chars_per_page),
                        text,
                        attempts: outcome.attempts,
                    }
                }
                Err(BackendError::Unavailable(detail)) => {
                    return ChunkRun {
                        summaries,
                        end: StageEnd::Failed(SummaryError::BackendUnavailable {
                            attempts: outcome.attempts,
                            detail,
                        }),
                    }
                }
                Err(BackendError::Failed(detail)) => {
                    return ChunkRun {
                        summaries,
                        end: StageEnd::Failed(SummaryError::ChunkSummary {
                            chunk: chunk.index,
                            attempts: outcome.attempts,
                            detail,
                        }),
                    }
                }
            }
        };

        summaries.push(summary);
        if let Some(last) = summaries.last() {
            on_event(ChunkEvent::Completed {
                completed: summaries.len(),
                total,
                summary: last,
            });
        }
    }

    ChunkRun {
        summaries,
        end: StageEnd::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::chunk::chunk_pages;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies "S<n>" for the n-th call; fails the calls listed in `fail_on`.
    struct Numbered {
        calls: Mutex<u32>,
        fail_on: Vec<u32>,
        cancel_on: Option<(u32, CancellationToken)>,
    }

    impl Numbered {
        fn new() -> Self {
            Self {
                calls: Mutex::new(0),
                fail_on: Vec::new(),
                cancel_on: None,
            }
        }
    }

    #[async_trait]
    impl ModelBackend for Numbered {
        async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
            let n = {
                let mut c = self.calls.lock().unwrap();
                *c += 1;
                *c
            };
            if let Some((at, token)) = &self.cancel_on {
                if *at == n {
                    token.cancel();
                }
            }
            if self.fail_on.contains(&n) {
                Err(BackendError::Failed(format!("call {n} failed")))
            } else {
                Ok(format!("S{n}"))
            }
        }
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        let pages: Vec<(usize, String)> = (1..=n).map(|i| (i, "x".repeat(900))).collect();
        chunk_pages(&pages, 1000)
    }

    fn ctx<'a>(
        backend: &'a dyn ModelBackend,
        prompts: &'a PromptResolver,
        config: &'a SummaryConfig,
    ) -> StageContext<'a> {
        StageContext {
            backend,
            prompts,
            report_type: ReportType::Other,
            config,
        }
    }

    fn fast_config() -> SummaryConfig {
        SummaryConfig::builder().retry_backoff_ms(1).build().unwrap()
    }

    #[test]
    fn page_estimate_rounds_up() {
        assert_eq!(estimate_pages("", 3000), 0);
        assert_eq!(estimate_pages(&"a".repeat(3000), 3000), 1);
        assert_eq!(estimate_pages(&"a".repeat(3001), 3000), 2);
        assert_eq!(estimate_pages("abc", 0), 3);
    }

    #[tokio::test]
    async fn summarises_in_order_with_progress() {
        let backend = Numbered::new();
        let prompts = PromptResolver::builtin();
        let config = fast_config();
        let mut seen = Vec::new();

        let run = summarize_chunks(
            ctx(&backend, &prompts, &config),
            &chunks(3),
            &CancellationToken::new(),
            &mut |e| {
                if let ChunkEvent::Completed { completed, total, summary } = e {
                    seen.push((completed, total, summary.index, summary.text.clone()));
                }
            },
        )
        .await;

        assert!(matches!(run.end, StageEnd::Completed));
        assert_eq!(
            seen,
            vec![
                (1, 3, 1, "S1".to_string()),
                (2, 3, 2, "S2".to_string()),
                (3, 3, 3, "S3".to_string())
            ]
        );
        assert_eq!(run.summaries[1].pages, vec![2]);
        assert_eq!(run.summaries[0].estimated_pages, 1);
    }

    #[tokio::test]
    async fn one_retry_then_success_keeps_order() {
        let mut backend = Numbered::new();
        backend.fail_on = vec![2];
        let prompts = PromptResolver::builtin();
        let config = fast_config();
        let mut order = Vec::new();

        let run = summarize_chunks(
            ctx(&backend, &prompts, &config),
            &chunks(3),
            &CancellationToken::new(),
            &mut |e| {
                if let ChunkEvent::Completed { summary, .. } = e {
                    order.push(summary.index);
                }
            },
        )
        .await;

        assert!(matches!(run.end, StageEnd::Completed));
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(run.summaries[1].attempts, 2);
        assert_eq!(run.summaries[1].text, "S3");
    }

    #[tokio::test]
    async fn failure_after_retry_keeps_completed_chunks() {
        let mut backend = Numbered::new();
        backend.fail_on = vec![2, 3];
        let prompts = PromptResolver::builtin();
        let config = fast_config();

        let run = summarize_chunks(
            ctx(&backend, &prompts, &config),
            &chunks(3),
            &CancellationToken::new(),
            &mut |_| {},
        )
        .await;

        assert_eq!(run.summaries.len(), 1);
        match run.end {
            StageEnd::Failed(SummaryError::ChunkSummary { chunk, attempts, .. }) => {
                assert_eq!((chunk, attempts), (2, 2));
            }
            other => panic!("unexpected end: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_during_call_discards_that_chunk() {
        let token = CancellationToken::new();
        let mut backend = Numbered::new();
        backend.cancel_on = Some((2, token.clone()));
        let prompts = PromptResolver::builtin();
        let config = fast_config();

        let run = summarize_chunks(
            ctx(&backend, &prompts, &config),
            &chunks(4),
            &token,
            &mut |_| {},
        )
        .await;

        assert!(matches!(run.end, StageEnd::Cancelled));
        let indices: Vec<usize> = run.summaries.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1]);
        assert_eq!(*backend.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_calls() {
        let token = CancellationToken::new();
        token.cancel();
        let backend = Numbered::new();
        let prompts = PromptResolver::builtin();
        let config = fast_config();

        let run =
            summarize_chunks(ctx(&backend, &prompts, &config), &chunks(2), &token, &mut |_| {}).await;

        assert!(matches!(run.end, StageEnd::Cancelled));
        assert!(run.summaries.is_empty());
        assert_eq!(*backend.calls.lock().unwrap(), 0);
    }
}
