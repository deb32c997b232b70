//! CLI binary for edgequake-summarize.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `SummaryConfig`, drives one run through a `SummarySession` and prints
//! the final summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_summarize::{
    load_document, write_summary, ChunkSummary, ExtractionMethod, OcrMode, PageBudget,
    ProgressCallback, ReportType, RunId, RunOptions, RunPhase, RunState, SummaryConfig,
    SummaryProgressCallback, SummarySession,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while pages are extracted, then a bar over
/// chunks, then a spinner again during synthesis.
struct CliProgressCallback {
    bar: ProgressBar,
    chunk_started: Mutex<Option<Instant>>,
    page_errors: AtomicUsize,
    ocr_pages: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(Self::spinner_style());
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            chunk_started: Mutex::new(None),
            page_errors: AtomicUsize::new(0),
            ocr_pages: AtomicUsize::new(0),
        })
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS)
    }

    fn chunk_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Summarizing");
        self.bar.reset_eta();
    }
}

impl SummaryProgressCallback for CliProgressCallback {
    fn on_run_start(&self, _run_id: RunId, total_pages: usize) {
        self.bar.set_prefix("Extracting");
        self.bar.set_message(format!("{total_pages} pages"));
    }

    fn on_phase_change(&self, phase: RunPhase) {
        if phase == RunPhase::Synthesizing {
            self.bar.set_style(Self::spinner_style());
            self.bar.set_prefix("Synthesizing");
            self.bar.set_message("merging chunk summaries…");
        }
    }

    fn on_page_extracted(
        &self,
        page: usize,
        total_pages: usize,
        method: ExtractionMethod,
        from_cache: bool,
    ) {
        if method == ExtractionMethod::OpticalCharacterRecognition {
            self.ocr_pages.fetch_add(1, Ordering::SeqCst);
        }
        let source = if from_cache { "cached" } else { "read" };
        self.bar
            .set_message(format!("page {page}/{total_pages} {}", dim(source)));
    }

    fn on_page_error(&self, page: usize, total_pages: usize, error: &str) {
        self.page_errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page,
            total_pages,
            red(&msg),
        ));
    }

    fn on_chunks_ready(&self, total_chunks: usize) {
        self.chunk_bar(total_chunks);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Summarising {total_chunks} chunk(s)…"))
        ));
    }

    fn on_chunk_start(&self, index: usize, _total: usize) {
        if let Ok(mut started) = self.chunk_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("chunk {index}"));
    }

    fn on_chunk_complete(&self, completed: usize, total: usize, summary: &ChunkSummary) {
        let elapsed = self
            .chunk_started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or_default();
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {:<12}  {}  {}",
            green("✓"),
            completed,
            total,
            dim(&page_span(&summary.pages)),
            dim(&format!("{:>5} chars", summary.text.chars().count())),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, state: &RunState) {
        self.bar.finish_and_clear();
        let errors = self.page_errors.load(Ordering::SeqCst);
        let ocr = self.ocr_pages.load(Ordering::SeqCst);
        let pages = format!(
            "{} pages ({} OCR, {} cached{})",
            state.page_count,
            ocr,
            state.cache_hits,
            if errors > 0 {
                format!(", {} unreadable", red(&errors.to_string()))
            } else {
                String::new()
            }
        );
        match state.phase {
            RunPhase::Completed => eprintln!("{} {}", green("✔"), pages),
            RunPhase::Cancelled => eprintln!("{} cancelled after {}", cyan("⚠"), pages),
            _ => eprintln!("{} failed after {}", red("✘"), pages),
        }
    }
}

fn page_span(pages: &[usize]) -> String {
    match (pages.first(), pages.last()) {
        (Some(a), Some(b)) if a == b => format!("p. {a}"),
        (Some(a), Some(b)) => format!("pp. {a}–{b}"),
        _ => String::new(),
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Summarise a board pack with the local Ollama model
  pdfsum --report-type board board-pack.pdf

  # Two-page financial summary written to a file
  pdfsum --report-type finance --pages 2 q3-accounts.pdf -o q3-summary.md

  # Scanned monthly progress report, OCR every page, cache extractions
  pdfsum --report-type mpr --ocr-mode always --cache-dir ~/.cache/pdfsum scan.pdf

  # Custom prompt templates ({mpr,board,finance,audit,other}_prompt.txt and final_*_prompt.txt)
  pdfsum --prompt-dir ./prompts audit.pdf

  # Full run state as JSON (chunk summaries, timings, errors)
  pdfsum --json report.pdf > run.json

REPORT TYPES:
  mpr       Monthly Progress Report
  board     Board Report
  finance   Financial Report
  audit     Audit Report
  other     Anything else (default)

ENVIRONMENT VARIABLES:
  EDGEQUAKE_LLM_PROVIDER  Override provider (ollama, openai, anthropic, …)
  EDGEQUAKE_MODEL         Override model ID
  OLLAMA_HOST             Ollama server URL (default http://localhost:11434)
  RUST_LOG                Log filter, e.g. RUST_LOG=edgequake_summarize=debug

SETUP:
  1. Start the model server:  ollama serve
  2. Pull the model:          ollama pull llama3:8b-instruct-q4_K_M
  3. Summarise:               pdfsum report.pdf

  Rendering uses the system pdfium library (libpdfium) for scanned pages.
"#;

/// Summarise PDF reports with a local LLM.
#[derive(Parser, Debug)]
#[command(
    name = "pdfsum",
    version,
    about = "Summarise PDF reports into length-bounded narratives with a local LLM",
    long_about = "Summarise long PDF reports (local files or URLs) with a local LLM. Pages are \
read from the text layer or OCR'd with a vision model, grouped into chunks, summarised chunk by \
chunk with a report-type-specific prompt, and merged into one final summary under a page budget.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Report type: mpr, board, finance, audit, other.
    #[arg(short, long, env = "PDFSUM_REPORT_TYPE", default_value = "other")]
    report_type: String,

    /// Final summary length in A4 pages, or "auto".
    #[arg(short, long, env = "PDFSUM_PAGES", default_value = "auto")]
    pages: String,

    /// Write the summary to this file instead of stdout.
    #[arg(short, long, env = "PDFSUM_OUTPUT")]
    output: Option<PathBuf>,

    /// Also print every chunk summary before the final summary.
    #[arg(long, env = "PDFSUM_SHOW_CHUNKS")]
    show_chunks: bool,

    /// Print the final run state as JSON instead of the summary.
    #[arg(long, env = "PDFSUM_JSON")]
    json: bool,

    /// Persist extracted page text here, keyed by content fingerprint.
    #[arg(long, env = "PDFSUM_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Drop cache entries older than this many days at startup.
    #[arg(long, env = "PDFSUM_CACHE_MAX_AGE_DAYS")]
    cache_max_age_days: Option<u64>,

    /// Directory with prompt template files overriding the built-ins.
    #[arg(long, env = "PDFSUM_PROMPT_DIR")]
    prompt_dir: Option<PathBuf>,

    /// Chunk size budget in characters.
    #[arg(long, env = "PDFSUM_CHUNK_BUDGET", default_value_t = 12_000)]
    chunk_budget: usize,

    /// Characters per A4 page used for length estimates.
    #[arg(long, env = "PDFSUM_CHARS_PER_PAGE", default_value_t = 3_000)]
    chars_per_page: usize,

    /// When to OCR pages: fallback (pages without text) or always.
    #[arg(long, env = "PDFSUM_OCR_MODE", value_enum, default_value = "fallback")]
    ocr_mode: OcrModeArg,

    /// LLM model ID.
    #[arg(
        long,
        env = "EDGEQUAKE_MODEL",
        long_help = "Model to use. Default: llama3:8b-instruct-q4_K_M on Ollama.\n\
          Image-only pages need a vision-capable model for OCR (e.g. llama3.2-vision)."
    )]
    model: Option<String>,

    /// LLM provider: ollama, openai, anthropic, gemini, …
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// HTTP endpoint probed before summarising.
    #[arg(long, env = "PDFSUM_PROBE_URL")]
    probe_url: Option<String>,

    /// Rendering DPI for OCR (72–400).
    #[arg(long, env = "PDFSUM_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFSUM_PASSWORD")]
    password: Option<String>,

    /// Max LLM output tokens per call.
    #[arg(long, env = "PDFSUM_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDFSUM_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDFSUM_API_TIMEOUT", default_value_t = 600)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFSUM_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "PDFSUM_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFSUM_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFSUM_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OcrModeArg {
    Fallback,
    Always,
}

impl From<OcrModeArg> for OcrMode {
    fn from(v: OcrModeArg) -> Self {
        match v {
            OcrModeArg::Fallback => OcrMode::Fallback,
            OcrModeArg::Always => OcrMode::Always,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build session ────────────────────────────────────────────────────
    let report_type: ReportType = cli.report_type.parse().context("Invalid --report-type")?;
    let page_budget: PageBudget = cli.pages.parse().context("Invalid --pages")?;
    let config = build_config(&cli)?;
    let session = SummarySession::from_config(config).context("Failed to set up session")?;

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn SummaryProgressCallback>)
    } else {
        None
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let started = Instant::now();
    let document = load_document(&cli.input, session.config())
        .await
        .context("Failed to load PDF")?;

    let mut options = RunOptions::new(report_type).page_budget(page_budget);
    if let Some(cb) = progress {
        options = options.progress(cb);
    }
    let run = session.submit(document, options).context("Failed to start run")?;

    let interrupt = {
        let session = session.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{} cancelling after the current step…", cyan("⚠"));
                session.cancel(run);
            }
        })
    };
    let state = session.wait(run).await.context("Run was lost")?;
    interrupt.abort();

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&state).context("Failed to serialise run state")?
        );
    }

    match state.phase {
        RunPhase::Completed => {}
        RunPhase::Cancelled => {
            if !cli.quiet {
                eprintln!(
                    "{} Run cancelled ({} of {} chunk summaries kept)",
                    cyan("⚠"),
                    state.chunk_summaries.len(),
                    state.chunks.len()
                );
            }
            std::process::exit(130);
        }
        _ => {
            let message = state
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| format!("run ended {}", state.phase));
            anyhow::bail!("Summarisation failed: {message}");
        }
    }

    let summary = state
        .summary_for(run)
        .context("Run completed without a final summary")?;

    if cli.json {
        if let Some(ref path) = cli.output {
            write_summary(path, &summary.text).await?;
        }
        return Ok(());
    }

    if cli.show_chunks {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        for chunk in &state.chunk_summaries {
            writeln!(
                handle,
                "## Chunk {} ({})\n\n{}\n",
                chunk.index,
                page_span(&chunk.pages),
                chunk.text
            )
            .context("Failed to write to stdout")?;
        }
        writeln!(handle, "## Final summary\n").context("Failed to write to stdout")?;
    }

    if let Some(ref path) = cli.output {
        write_summary(path, &summary.text).await?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(summary.text.as_bytes())
            .context("Failed to write to stdout")?;
        if !summary.text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        eprintln!(
            "{}  {} pages → {} chunk(s) → ~{} page(s) (budget {}{})  {:.1}s{}",
            green("✔"),
            state.page_count,
            state.chunks.len(),
            summary.estimated_pages,
            summary.page_budget,
            if summary.condensed { ", condensed" } else { "" },
            started.elapsed().as_secs_f64(),
            cli.output
                .as_ref()
                .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                .unwrap_or_default(),
        );
    }

    Ok(())
}

/// Map CLI args to `SummaryConfig`.
fn build_config(cli: &Cli) -> Result<SummaryConfig> {
    let mut builder = SummaryConfig::builder()
        .chunk_budget_chars(cli.chunk_budget)
        .chars_per_page(cli.chars_per_page)
        .ocr_mode(cli.ocr_mode.clone().into())
        .dpi(cli.dpi)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref dir) = cli.cache_dir {
        builder = builder.cache_dir(dir);
    }
    if let Some(days) = cli.cache_max_age_days {
        builder = builder.cache_max_age_days(days);
    }
    if let Some(ref dir) = cli.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref url) = cli.probe_url {
        builder = builder.probe_url(url);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }

    builder.build().context("Invalid configuration")
}
