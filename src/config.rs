//! Configuration types for report summarisation.
//!
//! All pipeline behaviour is controlled through [`SummaryConfig`], built via
//! its [`SummaryConfigBuilder`]. Per-run choices (which report style, how many
//! pages) live in [`crate::session::RunOptions`] instead, because they change
//! from one upload to the next while the session config does not.

use crate::error::SummaryError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "llama3:8b-instruct-q4_K_M";

/// Provider used when neither the config nor the environment names one.
pub const DEFAULT_PROVIDER: &str = "ollama";

/// Readiness endpoint of a default local Ollama install.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Configuration for a summarisation session.
///
/// # Example
/// ```rust
/// use edgequake_summarize::SummaryConfig;
///
/// let config = SummaryConfig::builder()
///     .chunk_budget_chars(8_000)
///     .chars_per_page(2_500)
///     .model("llama3:8b-instruct-q4_K_M")
///     .build()
///     .unwrap();
/// assert_eq!(config.chunk_budget_chars, 8_000);
/// ```
#[derive(Clone)]
pub struct SummaryConfig {
    /// Maximum characters of page text per chunk. Default: 12 000.
    ///
    /// Roughly 2 000 words, which leaves room for the prompt and the answer in
    /// an 8k-token context window. A single page larger than this still forms
    /// its own chunk; page text is never truncated.
    pub chunk_budget_chars: usize,

    /// Characters per rendered A4 page used for page-count estimates. Default: 3 000.
    pub chars_per_page: usize,

    /// Pages a final summary may exceed its budget before a condense pass. Default: 1.
    pub page_tolerance: u32,

    /// Re-issue the final call once with a "condense further" instruction
    /// when the draft overruns the budget. Default: true.
    pub condense_on_overrun: bool,

    /// Extra attempts per model call after the first failure. Default: 1.
    pub chunk_retries: u32,

    /// Delay before each retry in milliseconds. Default: 500.
    pub retry_backoff_ms: u64,

    /// Readiness probes before a run gives up on the backend. Default: 10.
    pub readiness_attempts: u32,

    /// Delay between readiness probes in milliseconds. Default: 1 000.
    pub readiness_backoff_ms: u64,

    /// HTTP URL answering `200 OK` once the model server is up.
    /// If None and the provider is Ollama, [`DEFAULT_OLLAMA_URL`] (or `OLLAMA_HOST`) is probed.
    pub probe_url: Option<String>,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "ollama", "openai"). If None, uses [`DEFAULT_PROVIDER`].
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens per completion. Default: 2048.
    pub max_tokens: usize,

    /// Per-call timeout in seconds. Default: 600.
    ///
    /// Local 8B models on CPU can take minutes for a long chunk.
    pub api_timeout_secs: u64,

    /// Directory of the persistent extraction cache. None keeps it in memory.
    pub cache_dir: Option<PathBuf>,

    /// Prune cache entries older than this many days when a session starts.
    pub cache_max_age_days: Option<u64>,

    /// Directory holding `<slug>_prompt.txt` / `final_<slug>_prompt.txt`
    /// templates. None uses the built-in templates.
    pub prompt_dir: Option<PathBuf>,

    /// When to run OCR on a page. Default: [`OcrMode::Fallback`].
    pub ocr_mode: OcrMode,

    /// Rendering DPI for OCR rasterisation. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            chunk_budget_chars: 12_000,
            chars_per_page: 3_000,
            page_tolerance: 1,
            condense_on_overrun: true,
            chunk_retries: 1,
            retry_backoff_ms: 500,
            readiness_attempts: 10,
            readiness_backoff_ms: 1_000,
            probe_url: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 2048,
            api_timeout_secs: 600,
            cache_dir: None,
            cache_max_age_days: None,
            prompt_dir: None,
            ocr_mode: OcrMode::default(),
            dpi: 150,
            max_rendered_pixels: 2000,
            password: None,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for SummaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummaryConfig")
            .field("chunk_budget_chars", &self.chunk_budget_chars)
            .field("chars_per_page", &self.chars_per_page)
            .field("page_tolerance", &self.page_tolerance)
            .field("condense_on_overrun", &self.condense_on_overrun)
            .field("chunk_retries", &self.chunk_retries)
            .field("readiness_attempts", &self.readiness_attempts)
            .field("probe_url", &self.probe_url)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("cache_dir", &self.cache_dir)
            .field("prompt_dir", &self.prompt_dir)
            .field("ocr_mode", &self.ocr_mode)
            .finish()
    }
}

impl SummaryConfig {
    /// Create a new builder for `SummaryConfig`.
    pub fn builder() -> SummaryConfigBuilder {
        SummaryConfigBuilder {
            config: Self::default(),
        }
    }

    /// Provider name after applying the default.
    pub fn effective_provider_name(&self) -> &str {
        self.provider_name.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }

    /// Model name after applying the default.
    pub fn effective_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`SummaryConfig`].
#[derive(Debug)]
pub struct SummaryConfigBuilder {
    config: SummaryConfig,
}

impl SummaryConfigBuilder {
    pub fn chunk_budget_chars(mut self, n: usize) -> Self {
        self.config.chunk_budget_chars = n;
        self
    }

    pub fn chars_per_page(mut self, n: usize) -> Self {
        self.config.chars_per_page = n;
        self
    }

    pub fn page_tolerance(mut self, pages: u32) -> Self {
        self.config.page_tolerance = pages;
        self
    }

    pub fn condense_on_overrun(mut self, v: bool) -> Self {
        self.config.condense_on_overrun = v;
        self
    }

    pub fn chunk_retries(mut self, n: u32) -> Self {
        self.config.chunk_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn readiness_attempts(mut self, n: u32) -> Self {
        self.config.readiness_attempts = n.max(1);
        self
    }

    pub fn readiness_backoff_ms(mut self, ms: u64) -> Self {
        self.config.readiness_backoff_ms = ms;
        self
    }

    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.config.probe_url = Some(url.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    pub fn cache_max_age_days(mut self, days: u64) -> Self {
        self.config.cache_max_age_days = Some(days);
        self
    }

    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.prompt_dir = Some(dir.into());
        self
    }

    pub fn ocr_mode(mut self, mode: OcrMode) -> Self {
        self.config.ocr_mode = mode;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SummaryConfig, SummaryError> {
        let c = &self.config;
        if c.chunk_budget_chars == 0 {
            return Err(SummaryError::InvalidConfig(
                "chunk budget must be ≥ 1 character".into(),
            ));
        }
        if c.chars_per_page == 0 {
            return Err(SummaryError::InvalidConfig(
                "characters per page must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(SummaryError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Summary style selector. Each report type owns one chunk-level and one
/// final-synthesis prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    /// Monthly Progress Report.
    MonthlyProgress,
    BoardReport,
    FinancialReport,
    AuditReport,
    /// Anything else; generic executive summary.
    #[default]
    Other,
}

impl ReportType {
    pub const ALL: [ReportType; 5] = [
        ReportType::MonthlyProgress,
        ReportType::BoardReport,
        ReportType::FinancialReport,
        ReportType::AuditReport,
        ReportType::Other,
    ];

    /// Short identifier used in template file names and on the command line.
    pub fn slug(self) -> &'static str {
        match self {
            ReportType::MonthlyProgress => "mpr",
            ReportType::BoardReport => "board",
            ReportType::FinancialReport => "finance",
            ReportType::AuditReport => "audit",
            ReportType::Other => "other",
        }
    }

    /// Human-readable name.
    pub fn label(self) -> &'static str {
        match self {
            ReportType::MonthlyProgress => "Monthly Progress Report",
            ReportType::BoardReport => "Board Report",
            ReportType::FinancialReport => "Financial Report",
            ReportType::AuditReport => "Audit Report",
            ReportType::Other => "Other",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ReportType {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ReportType::ALL
            .into_iter()
            .find(|t| t.slug() == wanted || t.label().to_lowercase() == wanted)
            .ok_or_else(|| SummaryError::InvalidConfig(format!("unknown report type '{s}'")))
    }
}

/// Target length of the final summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageBudget {
    /// Estimated from the chunk summaries' lengths.
    #[default]
    Auto,
    /// At most this many A4 pages.
    Pages(u32),
}

impl PageBudget {
    /// Resolve to a concrete page count, using `auto_estimate` for [`PageBudget::Auto`].
    pub fn resolve(self, auto_estimate: u32) -> u32 {
        match self {
            PageBudget::Auto => auto_estimate.max(1),
            PageBudget::Pages(n) => n.max(1),
        }
    }
}

impl FromStr for PageBudget {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "auto" {
            return Ok(PageBudget::Auto);
        }
        match s.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(PageBudget::Pages(n)),
            _ => Err(SummaryError::InvalidConfig(format!(
                "page budget must be 'auto' or a whole number ≥ 1, got '{s}'"
            ))),
        }
    }
}

/// When to send a page image to the vision model for OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrMode {
    /// OCR only pages without usable embedded text. (default)
    #[default]
    Fallback,
    /// OCR every page and merge lines not already present in the embedded text.
    Always,
}
