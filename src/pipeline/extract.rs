//! Page text extraction: embedded text, vision-model OCR, and the cache in front of both.
//!
//! [`PageExtractor`] is the seam to the outside world. [`DefaultExtractor`]
//! reads the text layer when there is one and sends page images to a vision
//! model otherwise. [`extract_page_cached`] puts the content-addressed cache
//! in front of any extractor, so a scanned page is only OCR'd once.
//!
//! ## Retry Strategy
//!
//! OCR calls go to the same kind of provider as summaries and fail the same
//! way. They are retried with exponential backoff (`retry_backoff_ms * 2^n`);
//! a page that still fails is reported as a page-level
//! [`ExtractionError`] and contributes empty text to the run.

use crate::backend::build_options;
use crate::cache::ExtractionCache;
use crate::config::SummaryConfig;
use crate::document::{ExtractionMethod, Page, PagePayload};
use crate::error::ExtractionError;
use crate::pipeline::encode::png_image_data;
use crate::pipeline::postprocess::{clean_extracted_text, clean_summary, merge_ocr_lines};
use crate::prompts::OCR_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Text obtained from one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub method: ExtractionMethod,
    /// Produced by a fallback after part of the extraction failed. Degraded
    /// text is used for the current run but never cached.
    pub degraded: bool,
}

impl ExtractedText {
    pub fn new(text: impl Into<String>, method: ExtractionMethod) -> Self {
        Self {
            text: text.into(),
            method,
            degraded: false,
        }
    }

    pub fn degraded(text: impl Into<String>, method: ExtractionMethod) -> Self {
        Self {
            degraded: true,
            ..Self::new(text, method)
        }
    }
}

/// Result of a cache-aware extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageExtraction {
    pub text: String,
    pub method: ExtractionMethod,
    pub from_cache: bool,
}

/// Turns a page into text. Must be deterministic for identical pages so
/// cached results stay valid.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    async fn extract_page(&self, page: &Page) -> Result<ExtractedText, ExtractionError>;
}

/// Look `page` up in `cache`, extracting and storing it on a miss.
///
/// Cache access runs on the blocking pool since the disk cache uses
/// `std::fs`. Degraded results are returned but not stored. Cache write
/// failures are logged and otherwise ignored.
pub async fn extract_page_cached(
    extractor: &dyn PageExtractor,
    cache: &Arc<dyn ExtractionCache>,
    page: &Page,
) -> Result<PageExtraction, ExtractionError> {
    let lookup = {
        let cache = Arc::clone(cache);
        let fingerprint = page.fingerprint.clone();
        tokio::task::spawn_blocking(move || cache.get(&fingerprint)).await
    };
    match lookup {
        Ok(Some(entry)) => {
            debug!("Page {}: cache hit ({})", page.index, entry.method);
            return Ok(PageExtraction {
                text: entry.text,
                method: entry.method,
                from_cache: true,
            });
        }
        Ok(None) => {}
        Err(e) => warn!("Page {}: cache lookup task failed: {}", page.index, e),
    }

    let extracted = extractor.extract_page(page).await?;
    if extracted.degraded {
        debug!("Page {}: degraded extraction, not cached", page.index);
    } else {
        let cache = Arc::clone(cache);
        let fingerprint = page.fingerprint.clone();
        let text = extracted.text.clone();
        let method = extracted.method;
        match tokio::task::spawn_blocking(move || cache.put(&fingerprint, &text, method)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Page {}: cache write failed: {}", page.index, e),
            Err(e) => warn!("Page {}: cache write task failed: {}", page.index, e),
        }
    }
    Ok(PageExtraction {
        text: extracted.text,
        method: extracted.method,
        from_cache: false,
    })
}

// ── Vision OCR ───────────────────────────────────────────────────────────

/// OCR through a vision-capable edgequake-llm provider.
pub struct VisionOcr {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
    call_timeout: Duration,
}

impl VisionOcr {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &SummaryConfig) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                // Transcription, not creativity.
                temperature: Some(0.0),
                ..build_options(config)
            },
            max_retries: config.chunk_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            call_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Transcribe one PNG page image.
    pub async fn transcribe(&self, page_num: usize, png: &[u8]) -> Result<String, ExtractionError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(OCR_PROMPT),
            ChatMessage::user_with_images("", vec![png_image_data(png)]),
        ];

        let mut last_err: Option<String> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Page {}: OCR retry {}/{} after {}ms",
                    page_num, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.call_timeout, self.provider.chat(&messages, Some(&self.options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "Page {}: OCR {} input tokens, {} output tokens, {:?}",
                        page_num,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(clean_summary(&response.content));
                }
                Ok(Err(e)) => {
                    let err_msg = format!("{}", e);
                    warn!("Page {}: OCR attempt {} failed: {}", page_num, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
                Err(_) => {
                    warn!("Page {}: OCR attempt {} timed out", page_num, attempt + 1);
                    last_err = Some(format!("no response within {}s", self.call_timeout.as_secs()));
                }
            }
        }

        Err(ExtractionError::OcrFailed {
            page: page_num,
            attempts: self.max_retries + 1,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

// ── Default extractor ────────────────────────────────────────────────────

/// Embedded text first, vision OCR for image pages.
pub struct DefaultExtractor {
    ocr: Option<VisionOcr>,
}

impl DefaultExtractor {
    /// Extractor that can only read text layers.
    pub fn text_only() -> Self {
        Self { ocr: None }
    }

    pub fn with_ocr(ocr: VisionOcr) -> Self {
        Self { ocr: Some(ocr) }
    }

    /// OCR through the same provider the session summarises with.
    pub fn from_config(config: &SummaryConfig, provider: Arc<dyn LLMProvider>) -> Self {
        Self::with_ocr(VisionOcr::new(provider, config))
    }

    async fn ocr(&self, page: usize, png: &[u8]) -> Result<String, ExtractionError> {
        match &self.ocr {
            Some(ocr) => Ok(clean_extracted_text(&ocr.transcribe(page, png).await?)),
            None => Err(ExtractionError::OcrUnavailable { page }),
        }
    }
}

#[async_trait]
impl PageExtractor for DefaultExtractor {
    async fn extract_page(&self, page: &Page) -> Result<ExtractedText, ExtractionError> {
        match &page.payload {
            PagePayload::Text(text) => Ok(ExtractedText::new(
                clean_extracted_text(text),
                ExtractionMethod::EmbeddedText,
            )),
            PagePayload::Image(png) => Ok(ExtractedText::new(
                self.ocr(page.index, png).await?,
                ExtractionMethod::OpticalCharacterRecognition,
            )),
            PagePayload::Unreadable { detail } => Err(ExtractionError::RenderFailed {
                page: page.index,
                detail: detail.clone(),
            }),
            PagePayload::TextAndImage { text, image } => {
                let embedded = clean_extracted_text(text);
                let ocr = match self.ocr(page.index, image).await {
                    Ok(ocr) => ocr,
                    Err(e) => {
                        // The text layer alone is still a usable answer.
                        warn!("{}; using embedded text only", e);
                        return Ok(ExtractedText::degraded(
                            embedded,
                            ExtractionMethod::EmbeddedText,
                        ));
                    }
                };
                let (merged, added) = merge_ocr_lines(&embedded, &ocr);
                debug!("Page {}: OCR added {} line(s)", page.index, added);
                let method = if added > 0 {
                    ExtractionMethod::OpticalCharacterRecognition
                } else {
                    ExtractionMethod::EmbeddedText
                };
                Ok(ExtractedText::new(merged, method))
            }
        }
    }
}

impl std::fmt::Debug for DefaultExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultExtractor")
            .field("ocr", &self.ocr.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{DiskExtractionCache, MemoryExtractionCache};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageExtractor for Counting {
        async fn extract_page(&self, page: &Page) -> Result<ExtractedText, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExtractedText::new(
                format!("page {}", page.index),
                ExtractionMethod::OpticalCharacterRecognition,
            ))
        }
    }

    #[tokio::test]
    async fn text_pages_are_cleaned() {
        let page = Page::new(1, PagePayload::Text("  Net   profit \n\n\n\n up ".into()));
        let out = DefaultExtractor::text_only().extract_page(&page).await.unwrap();
        assert_eq!(out.text, "Net profit\n\nup");
        assert_eq!(out.method, ExtractionMethod::EmbeddedText);
    }

    #[tokio::test]
    async fn image_page_without_ocr_is_page_error() {
        let page = Page::new(4, PagePayload::Image(vec![1, 2, 3]));
        let err = DefaultExtractor::text_only().extract_page(&page).await.unwrap_err();
        assert!(matches!(err, ExtractionError::OcrUnavailable { page: 4 }));
    }

    #[tokio::test]
    async fn text_and_image_without_ocr_falls_back_to_text() {
        let page = Page::new(
            2,
            PagePayload::TextAndImage {
                text: "Header".into(),
                image: vec![0],
            },
        );
        let out = DefaultExtractor::text_only().extract_page(&page).await.unwrap();
        assert_eq!(out.text, "Header");
        assert_eq!(out.method, ExtractionMethod::EmbeddedText);
        assert!(out.degraded);
    }

    #[tokio::test]
    async fn unreadable_page_is_page_error() {
        let page = Page::new(
            5,
            PagePayload::Unreadable {
                detail: "bitmap allocation failed".into(),
            },
        );
        let err = DefaultExtractor::text_only().extract_page(&page).await.unwrap_err();
        assert!(matches!(err, ExtractionError::RenderFailed { page: 5, .. }));
        assert!(err.to_string().contains("bitmap allocation failed"));
    }

    #[tokio::test]
    async fn identical_pages_are_extracted_once() {
        let extractor = Counting {
            calls: AtomicUsize::new(0),
        };
        let cache: Arc<dyn ExtractionCache> = Arc::new(MemoryExtractionCache::new());
        let a = Page::new(1, PagePayload::Image(b"cover".to_vec()));
        let b = Page::new(7, PagePayload::Image(b"cover".to_vec()));

        let first = extract_page_cached(&extractor, &cache, &a).await.unwrap();
        let second = extract_page_cached(&extractor, &cache, &b).await.unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.text, "page 1");
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disk_cache_serves_second_lookup() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache: Arc<dyn ExtractionCache> = Arc::new(DiskExtractionCache::open(dir.path()).unwrap());
        let extractor = Counting {
            calls: AtomicUsize::new(0),
        };
        let page = Page::new(2, PagePayload::Image(b"scan".to_vec()));

        extract_page_cached(&extractor, &cache, &page).await.unwrap();
        let again = extract_page_cached(&extractor, &cache, &page).await.unwrap();

        assert!(again.from_cache);
        assert_eq!(again.text, "page 2");
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().writes, 1);
    }

    #[tokio::test]
    async fn ocr_fallback_is_not_cached() {
        let cache: Arc<dyn ExtractionCache> = Arc::new(MemoryExtractionCache::new());
        let page = Page::new(
            3,
            PagePayload::TextAndImage {
                text: "Header".into(),
                image: vec![9],
            },
        );

        let first = extract_page_cached(&DefaultExtractor::text_only(), &cache, &page)
            .await
            .unwrap();
        assert_eq!(first.text, "Header");
        assert!(!first.from_cache);
        assert!(cache.get(&page.fingerprint).is_none());

        let ocr = Counting {
            calls: AtomicUsize::new(0),
        };
        let second = extract_page_cached(&ocr, &cache, &page).await.unwrap();
        assert!(!second.from_cache);
        assert_eq!(second.text, "page 3");
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
        assert!(cache.get(&page.fingerprint).is_some());
    }
}
