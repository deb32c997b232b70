//! Model backend: the `complete(prompt) -> text` collaborator.
//!
//! The pipeline only ever needs plain text completion, so [`ModelBackend`] is
//! deliberately narrow. [`LlmBackend`] adapts any edgequake-llm provider
//! (Ollama by default) to it; tests plug in scripted backends.
//!
//! ## Retry Strategy
//!
//! A local model server fails in two different ways. When it is down the
//! connection is refused and retrying quickly is pointless, so those errors
//! are classified [`BackendError::Unavailable`] and surface as
//! `BackendUnavailable`. When it is up but a request fails (timeout, 500,
//! out-of-memory) the same prompt is retried after `retry_backoff_ms * 2^n`.

use crate::cancel::CancellationToken;
use crate::config::{SummaryConfig, DEFAULT_OLLAMA_URL};
use crate::error::SummaryError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// A failed backend call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached at all.
    #[error("backend unreachable: {0}")]
    Unavailable(String),
    /// The backend was reached but the call failed.
    #[error("completion failed: {0}")]
    Failed(String),
}

impl BackendError {
    pub fn detail(&self) -> &str {
        match self {
            BackendError::Unavailable(d) | BackendError::Failed(d) => d,
        }
    }
}

/// Text-completion service used for chunk summaries and final synthesis.
///
/// Calls are issued one at a time; implementations need not support
/// concurrent requests.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Complete `prompt` and return the model's text.
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;

    /// Succeeds once the backend can accept requests.
    async fn ready(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Short label for logs.
    fn name(&self) -> &str {
        "backend"
    }
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// [`ModelBackend`] over an edgequake-llm provider.
pub struct LlmBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
    options: CompletionOptions,
    call_timeout: Duration,
    probe_url: Option<String>,
    http: reqwest::Client,
}

impl LlmBackend {
    /// Wrap an existing provider.
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
            options: CompletionOptions::default(),
            call_timeout: Duration::from_secs(600),
            probe_url: None,
            http: reqwest::Client::new(),
        }
    }

    /// Build the backend described by `config`.
    pub fn from_config(config: &SummaryConfig) -> Result<Self, SummaryError> {
        let (provider, provider_name, model) = resolve_provider(config)?;
        let probe_url = config.probe_url.clone().or_else(|| {
            (provider_name == "ollama").then(|| {
                std::env::var("OLLAMA_HOST")
                    .ok()
                    .filter(|h| !h.is_empty())
                    .map(|h| normalise_host(&h))
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
            })
        });
        info!("Model backend: {} / {}", provider_name, model);
        Ok(Self::new(provider, format!("{provider_name}/{model}"))
            .with_options(build_options(config))
            .with_timeout(Duration::from_secs(config.api_timeout_secs))
            .with_probe_url(probe_url))
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, t: Duration) -> Self {
        self.call_timeout = t;
        self
    }

    pub fn with_probe_url(mut self, url: Option<String>) -> Self {
        self.probe_url = url;
        self
    }

    /// The wrapped provider, e.g. to share it with OCR.
    pub fn provider(&self) -> Arc<dyn LLMProvider> {
        Arc::clone(&self.provider)
    }
}

#[async_trait]
impl ModelBackend for LlmBackend {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let messages = vec![ChatMessage::user(prompt)];
        let start = Instant::now();
        let call = self.provider.chat(&messages, Some(&self.options));
        match timeout(self.call_timeout, call).await {
            Ok(Ok(response)) => {
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    self.label,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                Ok(response.content)
            }
            Ok(Err(e)) => Err(classify(&e.to_string())),
            Err(_) => Err(BackendError::Failed(format!(
                "no response within {}s",
                self.call_timeout.as_secs()
            ))),
        }
    }

    async fn ready(&self) -> Result<(), BackendError> {
        let Some(url) = self.probe_url.as_deref() else {
            return Ok(());
        };
        let response = self
            .http
            .get(url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Unavailable(format!(
                "{} answered HTTP {}",
                url,
                response.status()
            )))
        }
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Build `CompletionOptions` from the session config.
pub fn build_options(config: &SummaryConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Map a provider error message onto reachability.
///
/// Timeouts are retryable failures even when the transport also reports a
/// send error.
fn classify(message: &str) -> BackendError {
    const UNREACHABLE: [&str; 6] = [
        "connection refused",
        "error sending request",
        "failed to connect",
        "dns error",
        "unreachable",
        "connection reset",
    ];
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        BackendError::Failed(message.to_string())
    } else if UNREACHABLE.iter().any(|m| lower.contains(m)) {
        BackendError::Unavailable(message.to_string())
    } else {
        BackendError::Failed(message.to_string())
    }
}

fn normalise_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or the default model.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Local default**: Ollama serving [`crate::config::DEFAULT_MODEL`] (or `config.model`).
///
/// Unlike a cloud tool there is no API-key auto-detection step: the
/// summariser is meant to run against a local server unless told otherwise.
fn resolve_provider(
    config: &SummaryConfig,
) -> Result<(Arc<dyn LLMProvider>, String, String), SummaryError> {
    let model = config.effective_model().to_string();

    if let Some(ref provider) = config.provider {
        let name = config
            .provider_name
            .clone()
            .unwrap_or_else(|| "custom".to_string());
        return Ok((Arc::clone(provider), name, model));
    }

    if let Some(ref name) = config.provider_name {
        return Ok((create_provider(name, &model)?, name.clone(), model));
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return Ok((create_provider(&prov, &env_model)?, prov, env_model));
        }
    }

    let name = config.effective_provider_name();
    Ok((create_provider(name, &model)?, name.to_string(), model))
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, SummaryError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        SummaryError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

// ── Call helpers ─────────────────────────────────────────────────────────

/// Outcome of a retried call: the value or last error, plus attempts used.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, BackendError>,
    pub attempts: u32,
}

/// Call `backend.complete(prompt)`, retrying call failures up to `retries` times.
///
/// The prompt is identical on every attempt. An [`BackendError::Unavailable`]
/// result is returned immediately; readiness was already established, so a
/// refused connection means the server went away.
pub async fn complete_with_retry(
    backend: &dyn ModelBackend,
    prompt: &str,
    retries: u32,
    backoff_ms: u64,
    what: &str,
) -> Attempted<String> {
    let mut last_err = BackendError::Failed("no attempt made".to_string());
    for attempt in 0..=retries {
        if attempt > 0 {
            let backoff = backoff_ms.saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!("{}: retry {}/{} after {}ms", what, attempt, retries, backoff);
            sleep(Duration::from_millis(backoff)).await;
        }
        match backend.complete(prompt).await {
            Ok(text) => {
                return Attempted {
                    result: Ok(text),
                    attempts: attempt + 1,
                }
            }
            Err(e @ BackendError::Unavailable(_)) => {
                warn!("{}: backend unreachable: {}", what, e.detail());
                return Attempted {
                    result: Err(e),
                    attempts: attempt + 1,
                };
            }
            Err(e) => {
                warn!("{}: attempt {} failed: {}", what, attempt + 1, e.detail());
                last_err = e;
            }
        }
    }
    Attempted {
        result: Err(last_err),
        attempts: retries + 1,
    }
}

/// Outcome of [`wait_until_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// `cancel` was set before the backend answered.
    Cancelled,
}

/// Probe `backend` until it is ready, up to `attempts` times.
///
/// `cancel` is checked before every attempt.
pub async fn wait_until_ready(
    backend: &dyn ModelBackend,
    attempts: u32,
    backoff_ms: u64,
    cancel: &CancellationToken,
) -> Result<Readiness, SummaryError> {
    let attempts = attempts.max(1);
    let mut last = String::new();
    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            debug!("{}: readiness wait cancelled after {} attempt(s)", backend.name(), attempt - 1);
            return Ok(Readiness::Cancelled);
        }
        match backend.ready().await {
            Ok(()) => {
                debug!("{} ready after {} probe(s)", backend.name(), attempt);
                return Ok(Readiness::Ready);
            }
            Err(e) => {
                warn!(
                    "{} not ready ({}/{}): {}",
                    backend.name(),
                    attempt,
                    attempts,
                    e.detail()
                );
                last = e.detail().to_string();
            }
        }
        if attempt < attempts {
            sleep(Duration::from_millis(backoff_ms)).await;
        }
    }
    Err(SummaryError::BackendUnavailable {
        attempts,
        detail: last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<Vec<Result<String, BackendError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<String, BackendError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelBackend for Scripted {
        async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(BackendError::Failed("script exhausted".into())))
        }
    }

    struct NeverReady(AtomicU32);

    #[async_trait]
    impl ModelBackend for NeverReady {
        async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
            unreachable!()
        }
        async fn ready(&self) -> Result<(), BackendError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn retry_succeeds_with_identical_prompt() {
        let backend = Scripted::new(vec![
            Err(BackendError::Failed("HTTP 500".into())),
            Ok("summary".into()),
        ]);
        let out = complete_with_retry(&backend, "P", 1, 1, "chunk 1").await;
        assert_eq!(out.result.unwrap(), "summary");
        assert_eq!(out.attempts, 2);
        assert_eq!(*backend.prompts.lock().unwrap(), vec!["P", "P"]);
    }

    #[tokio::test]
    async fn retry_gives_up_after_budget() {
        let backend = Scripted::new(vec![
            Err(BackendError::Failed("one".into())),
            Err(BackendError::Failed("two".into())),
            Ok("late".into()),
        ]);
        let out = complete_with_retry(&backend, "P", 1, 1, "chunk 1").await;
        assert_eq!(out.result.unwrap_err(), BackendError::Failed("two".into()));
        assert_eq!(out.attempts, 2);
    }

    #[tokio::test]
    async fn unavailable_is_not_retried() {
        let backend = Scripted::new(vec![Err(BackendError::Unavailable("refused".into()))]);
        let out = complete_with_retry(&backend, "P", 3, 1, "chunk 1").await;
        assert!(matches!(out.result, Err(BackendError::Unavailable(_))));
        assert_eq!(out.attempts, 1);
    }

    #[tokio::test]
    async fn readiness_exhausts_attempts() {
        let backend = NeverReady(AtomicU32::new(0));
        let err = wait_until_ready(&backend, 3, 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SummaryError::BackendUnavailable { attempts: 3, .. }));
        assert_eq!(backend.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn readiness_stops_when_cancelled() {
        let backend = NeverReady(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = wait_until_ready(&backend, 3, 1, &cancel).await.unwrap();
        assert_eq!(out, Readiness::Cancelled);
        assert_eq!(backend.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn classify_connection_errors() {
        assert!(matches!(
            classify("error sending request for url (http://localhost:11434/api/chat)"),
            BackendError::Unavailable(_)
        ));
        assert!(matches!(classify("HTTP 500: model crashed"), BackendError::Failed(_)));
    }

    #[test]
    fn classify_timeout_as_retryable() {
        assert!(matches!(
            classify("error sending request for url (http://localhost:11434/api/chat): operation timed out"),
            BackendError::Failed(_)
        ));
        assert!(matches!(classify("request timeout after 600s"), BackendError::Failed(_)));
    }

    #[test]
    fn normalise_ollama_host() {
        assert_eq!(normalise_host("127.0.0.1:11434"), "http://127.0.0.1:11434");
        assert_eq!(normalise_host("http://gpu-box:11434/"), "http://gpu-box:11434");
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&SummaryConfig::default());
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(2048));
    }
}
