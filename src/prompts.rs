//! Prompt templates for chunk summaries and final synthesis.
//!
//! Every [`ReportType`] owns two templates: one applied to each chunk of page
//! text, one applied to the joined chunk summaries. Templates are plain text
//! with placeholder markers:
//!
//! | Marker | Replaced with |
//! |--------|---------------|
//! | `{text}` | chunk text, or the chunk summaries joined by blank lines |
//! | `{page_budget}` | target page count (final templates only, optional) |
//!
//! A final template without `{page_budget}` gets an explicit length sentence
//! appended, so the budget always reaches the model.
//!
//! Built-in templates ship with the crate; a prompt directory holding
//! `<slug>_prompt.txt` and `final_<slug>_prompt.txt` replaces them.

use crate::config::ReportType;
use crate::error::SummaryError;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Placeholder for the text being summarised.
pub const TEXT_MARKER: &str = "{text}";

/// Placeholder for the target page count.
pub const PAGE_BUDGET_MARKER: &str = "{page_budget}";

/// Appended to the final prompt when the first draft overran its budget.
pub const CONDENSE_INSTRUCTION: &str = "\n\nYour previous draft was too long. Condense further: keep only the most decision-relevant facts, merge overlapping points and drop background detail, so the whole summary fits within the page limit above.";

/// Instruction sent with a page image to the vision model for OCR.
pub const OCR_PROMPT: &str = r#"Transcribe all text visible in this scanned document page.

Rules:
- Preserve the reading order a human would follow
- Keep table rows on one line each, cells separated by " | "
- Keep numbers, dates, currency amounts and units exactly as printed
- Ignore decorative borders, logos and stamps without text
- Output ONLY the transcribed text, with no commentary"#;

// ── Built-in templates ───────────────────────────────────────────────────

const MPR_CHUNK: &str = r#"You are summarising part of a Monthly Progress Report for senior management.

From the text below, extract:
- Work completed this period and percentage progress against plan
- Schedule status, slippages and their causes
- Cost and budget position
- Key risks, issues and the mitigation in place
- Decisions or support requested from management

Be factual and concise. Keep figures, dates and names exactly as written. Do not invent information.

Text:
{text}"#;

const MPR_FINAL: &str = r#"Below are section summaries of one Monthly Progress Report, in document order.

Write a single executive summary of the report with these headings:
1. Overall Status
2. Progress This Period
3. Schedule and Cost
4. Risks and Issues
5. Actions Required

Remove repetition between sections and keep every figure consistent with the summaries. The summary must not exceed {page_budget} A4 page(s).

Section summaries:
{text}"#;

const BOARD_CHUNK: &str = r#"You are summarising part of a Board Report for a board member who has not read it.

From the text below, extract:
- Matters presented for decision or approval
- Strategic updates and performance against objectives
- Governance, compliance and risk matters
- Resolutions, recommendations and their owners

Be factual and concise. Keep figures, dates and names exactly as written. Do not invent information.

Text:
{text}"#;

const BOARD_FINAL: &str = r#"Below are section summaries of one Board Report, in document order.

Write a single board briefing with these headings:
1. Purpose of the Report
2. Matters for Decision
3. Strategic and Performance Highlights
4. Risk and Governance
5. Recommendations

Remove repetition between sections and keep every figure consistent with the summaries. The briefing must not exceed {page_budget} A4 page(s).

Section summaries:
{text}"#;

const FINANCE_CHUNK: &str = r#"You are summarising part of a Financial Report for a finance executive.

From the text below, extract:
- Revenue, expenditure, margins and their movement against budget and prior period
- Cash flow, liquidity and funding position
- Significant variances and their explanations
- Forecast changes, provisions and one-off items

Be factual and concise. Keep every amount, currency and period exactly as written. Do not invent information.

Text:
{text}"#;

const FINANCE_FINAL: &str = r#"Below are section summaries of one Financial Report, in document order.

Write a single financial summary with these headings:
1. Headline Results
2. Income and Expenditure
3. Cash and Balance Sheet
4. Variances and Explanations
5. Outlook

Remove repetition between sections and keep every amount consistent with the summaries. The summary must not exceed {page_budget} A4 page(s).

Section summaries:
{text}"#;

const AUDIT_CHUNK: &str = r#"You are summarising part of an Audit Report for an audit committee member.

From the text below, extract:
- Audit scope, period and opinion
- Findings, their risk rating and root cause
- Management responses and agreed actions with owners and deadlines
- Status of previously reported findings

Be factual and concise. Keep ratings, amounts and dates exactly as written. Do not invent information.

Text:
{text}"#;

const AUDIT_FINAL: &str = r#"Below are section summaries of one Audit Report, in document order.

Write a single audit summary with these headings:
1. Scope and Opinion
2. Key Findings (highest risk first)
3. Management Actions
4. Follow-up of Prior Findings

Remove repetition between sections and keep every rating consistent with the summaries. The summary must not exceed {page_budget} A4 page(s).

Section summaries:
{text}"#;

const OTHER_CHUNK: &str = r#"Summarise the following part of a report for a busy executive.

Capture the main points, key figures, conclusions and any actions or decisions required. Be factual and concise. Keep figures, dates and names exactly as written. Do not invent information.

Text:
{text}"#;

const OTHER_FINAL: &str = r#"Below are section summaries of one report, in document order.

Combine them into a single coherent executive summary: a short overview paragraph followed by the key points, conclusions and required actions. Remove repetition and keep every figure consistent with the summaries. The summary must not exceed {page_budget} A4 page(s).

Section summaries:
{text}"#;

fn builtin_templates(report_type: ReportType) -> (&'static str, &'static str) {
    match report_type {
        ReportType::MonthlyProgress => (MPR_CHUNK, MPR_FINAL),
        ReportType::BoardReport => (BOARD_CHUNK, BOARD_FINAL),
        ReportType::FinancialReport => (FINANCE_CHUNK, FINANCE_FINAL),
        ReportType::AuditReport => (AUDIT_CHUNK, AUDIT_FINAL),
        ReportType::Other => (OTHER_CHUNK, OTHER_FINAL),
    }
}

// ── Resolver ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct TemplatePair {
    chunk: Option<String>,
    last: Option<String>,
}

/// Selects and fills templates for a report type.
#[derive(Debug, Clone)]
pub struct PromptResolver {
    templates: HashMap<ReportType, TemplatePair>,
    source: String,
}

impl PromptResolver {
    /// Resolver over the templates compiled into the crate.
    pub fn builtin() -> Self {
        let templates = ReportType::ALL
            .into_iter()
            .map(|t| {
                let (chunk, last) = builtin_templates(t);
                (
                    t,
                    TemplatePair {
                        chunk: Some(chunk.to_string()),
                        last: Some(last.to_string()),
                    },
                )
            })
            .collect();
        Self {
            templates,
            source: "built-in".to_string(),
        }
    }

    /// Resolver over `<slug>_prompt.txt` / `final_<slug>_prompt.txt` in `dir`.
    ///
    /// Missing files are not an error here; [`PromptResolver::validate`]
    /// reports them for the report type a run actually selects.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, SummaryError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(SummaryError::Configuration(format!(
                "prompt directory '{}' does not exist",
                dir.display()
            )));
        }
        let read = |name: String| -> Result<Option<String>, SummaryError> {
            let path = dir.join(name);
            match std::fs::read_to_string(&path) {
                Ok(s) => Ok(Some(s)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(SummaryError::Configuration(format!(
                    "cannot read prompt template '{}': {}",
                    path.display(),
                    e
                ))),
            }
        };
        let mut templates = HashMap::new();
        for t in ReportType::ALL {
            let pair = TemplatePair {
                chunk: read(format!("{}_prompt.txt", t.slug()))?,
                last: read(format!("final_{}_prompt.txt", t.slug()))?,
            };
            debug!(
                "Prompt templates for {}: chunk={} final={}",
                t.slug(),
                pair.chunk.is_some(),
                pair.last.is_some()
            );
            templates.insert(t, pair);
        }
        Ok(Self {
            templates,
            source: dir.display().to_string(),
        })
    }

    /// Check both templates of `report_type` exist, are non-empty and carry `{text}`.
    pub fn validate(&self, report_type: ReportType) -> Result<(), SummaryError> {
        let pair = self.templates.get(&report_type);
        let check = |stage: &str, file: String, t: Option<&String>| -> Result<(), SummaryError> {
            match t {
                None => Err(SummaryError::Configuration(format!(
                    "{} template for '{}' is missing ({} in {})",
                    stage, report_type, file, self.source
                ))),
                Some(s) if s.trim().is_empty() => Err(SummaryError::Configuration(format!(
                    "{} template for '{}' is empty",
                    stage, report_type
                ))),
                Some(s) if !s.contains(TEXT_MARKER) => Err(SummaryError::Configuration(format!(
                    "{} template for '{}' has no {} placeholder",
                    stage, report_type, TEXT_MARKER
                ))),
                Some(_) => Ok(()),
            }
        };
        check(
            "chunk",
            format!("{}_prompt.txt", report_type.slug()),
            pair.and_then(|p| p.chunk.as_ref()),
        )?;
        check(
            "final",
            format!("final_{}_prompt.txt", report_type.slug()),
            pair.and_then(|p| p.last.as_ref()),
        )
    }

    /// Prompt for summarising one chunk.
    pub fn resolve_chunk_prompt(
        &self,
        report_type: ReportType,
        chunk_text: &str,
    ) -> Result<String, SummaryError> {
        self.validate(report_type)?;
        let template = self.template(report_type, |p| p.chunk.as_deref())?;
        Ok(template.replace(TEXT_MARKER, chunk_text))
    }

    /// Prompt for the final synthesis over `summaries` (already in chunk order).
    pub fn resolve_final_prompt<S: AsRef<str>>(
        &self,
        report_type: ReportType,
        summaries: &[S],
        page_budget: u32,
    ) -> Result<String, SummaryError> {
        self.validate(report_type)?;
        let template = self.template(report_type, |p| p.last.as_deref())?;
        let combined = summaries
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join("\n\n");

        // Budget first: chunk summaries may themselves contain the marker text.
        let mut prompt = if template.contains(PAGE_BUDGET_MARKER) {
            template.replace(PAGE_BUDGET_MARKER, &page_budget.to_string())
        } else {
            format!(
                "{template}\n\nThe final summary should be concise and not exceed {page_budget} A4 pages."
            )
        };
        prompt = prompt.replace(TEXT_MARKER, &combined);
        Ok(prompt)
    }

    fn template<'a>(
        &'a self,
        report_type: ReportType,
        pick: impl Fn(&'a TemplatePair) -> Option<&'a str>,
    ) -> Result<&'a str, SummaryError> {
        self.templates
            .get(&report_type)
            .and_then(pick)
            .ok_or_else(|| SummaryError::Configuration(format!("no template for '{report_type}'")))
    }
}

impl Default for PromptResolver {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builtin_templates_validate_for_every_type() {
        let resolver = PromptResolver::builtin();
        for t in ReportType::ALL {
            resolver.validate(t).unwrap();
        }
    }

    #[test]
    fn chunk_prompt_injects_text() {
        let p = PromptResolver::builtin()
            .resolve_chunk_prompt(ReportType::BoardReport, "The board approved X.")
            .unwrap();
        assert!(p.contains("The board approved X."));
        assert!(!p.contains(TEXT_MARKER));
        assert!(p.contains("Board Report"));
    }

    #[test]
    fn final_prompt_orders_summaries_and_states_budget() {
        let p = PromptResolver::builtin()
            .resolve_final_prompt(ReportType::Other, &["first", "second", "third"], 2)
            .unwrap();
        let a = p.find("first").unwrap();
        let b = p.find("second").unwrap();
        let c = p.find("third").unwrap();
        assert!(a < b && b < c);
        assert!(p.contains("first\n\nsecond\n\nthird"));
        assert!(p.contains("not exceed 2 A4 page"));
        assert!(!p.contains(PAGE_BUDGET_MARKER));
    }

    #[test]
    fn final_template_without_budget_marker_gets_sentence() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("other_prompt.txt"), "Summarise: {text}").unwrap();
        std::fs::write(dir.path().join("final_other_prompt.txt"), "Combine: {text}").unwrap();
        let r = PromptResolver::from_dir(dir.path()).unwrap();
        let p = r.resolve_final_prompt(ReportType::Other, &["s"], 4).unwrap();
        assert_eq!(
            p,
            "Combine: s\n\nThe final summary should be concise and not exceed 4 A4 pages."
        );
    }

    #[test]
    fn missing_template_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("audit_prompt.txt"), "Audit: {text}").unwrap();
        let r = PromptResolver::from_dir(dir.path()).unwrap();
        let err = r.validate(ReportType::AuditReport).unwrap_err();
        assert!(matches!(err, SummaryError::Configuration(_)));
        assert!(err.to_string().contains("final_audit_prompt.txt"));
        assert!(r.resolve_chunk_prompt(ReportType::AuditReport, "x").is_err());
    }

    #[test]
    fn template_without_text_marker_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("mpr_prompt.txt"), "Summarise this").unwrap();
        std::fs::write(dir.path().join("final_mpr_prompt.txt"), "Final {text}").unwrap();
        let r = PromptResolver::from_dir(dir.path()).unwrap();
        let err = r.validate(ReportType::MonthlyProgress).unwrap_err();
        assert!(err.to_string().contains("{text}"));
    }

    #[test]
    fn empty_template_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("board_prompt.txt"), "  \n").unwrap();
        std::fs::write(dir.path().join("final_board_prompt.txt"), "{text}").unwrap();
        let r = PromptResolver::from_dir(dir.path()).unwrap();
        assert!(r.validate(ReportType::BoardReport).unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn missing_dir_is_configuration_error() {
        let err = PromptResolver::from_dir("/definitely/not/here").unwrap_err();
        assert!(matches!(err, SummaryError::Configuration(_)));
    }
}
