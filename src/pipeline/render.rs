//! PDF loading: read each page's text layer and rasterise pages that need OCR.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so the
//! runtime's workers never stall on a 300-page scan.
//!
//! ## Which pages are rasterised?
//!
//! Rendering is the expensive part, so a page is only turned into a PNG when
//! its text layer is blank (a scan) or when [`OcrMode::Always`] asks for OCR
//! everywhere. Digitally generated pages travel as text only.
//!
//! A page that fails to render keeps its text layer if it has one; otherwise
//! it becomes [`PagePayload::Unreadable`] and shows up as a page failure in
//! the run instead of failing the whole document.

use crate::config::{OcrMode, SummaryConfig};
use crate::document::{Document, PagePayload};
use crate::error::SummaryError;
use crate::pipeline::encode::encode_png;
use crate::pipeline::input::{resolve_input, ResolvedInput};
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Resolve `input` (path or URL) and load it into a [`Document`].
pub async fn load_document(input: &str, config: &SummaryConfig) -> Result<Document, SummaryError> {
    let resolved = resolve_input(input, config.download_timeout_secs).await?;
    load_resolved(&resolved, config).await
}

/// Load an already-resolved PDF.
pub async fn load_resolved(
    resolved: &ResolvedInput,
    config: &SummaryConfig,
) -> Result<Document, SummaryError> {
    let path = resolved.path().to_path_buf();
    let options = RenderOptions {
        dpi: config.dpi,
        max_pixels: config.max_rendered_pixels,
        ocr_mode: config.ocr_mode,
    };
    let password = config.password.clone();

    let payloads = tokio::task::spawn_blocking(move || {
        load_pages_blocking(&path, password.as_deref(), options)
    })
    .await
    .map_err(|e| SummaryError::Internal(format!("Render task panicked: {}", e)))??;

    let document = Document::new(resolved.fingerprint.clone(), payloads);
    info!(
        "Loaded {} pages ({} need OCR)",
        document.len(),
        document.pages.iter().filter(|p| p.payload.image().is_some()).count()
    );
    Ok(document)
}

#[derive(Debug, Clone, Copy)]
struct RenderOptions {
    dpi: u32,
    max_pixels: u32,
    ocr_mode: OcrMode,
}

fn load_pages_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    options: RenderOptions,
) -> Result<Vec<PagePayload>, SummaryError> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| map_load_error(pdf_path, password, e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(options.dpi as f32 / 72.0)
        .set_maximum_width(options.max_pixels as i32)
        .set_maximum_height(options.max_pixels as i32);

    let mut payloads = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let text = page.text().map(|t| t.all()).unwrap_or_default();
        let has_text = !text.trim().is_empty();

        if has_text && options.ocr_mode == OcrMode::Fallback {
            payloads.push(PagePayload::Text(text));
            continue;
        }

        let rendered = page
            .render_with_config(&render_config)
            .map_err(|e| format!("{:?}", e))
            .and_then(|bitmap| {
                let image = bitmap.as_image();
                debug!(
                    "Rendered page {} → {}x{} px ({} text chars)",
                    page_num,
                    image.width(),
                    image.height(),
                    text.len()
                );
                encode_png(&image).map_err(|e| format!("PNG encoding failed: {}", e))
            });

        payloads.push(match rendered {
            Ok(png) if has_text => PagePayload::TextAndImage { text, image: png },
            Ok(png) => PagePayload::Image(png),
            Err(detail) => {
                warn!("Page {}: rasterisation failed: {}", page_num, detail);
                unrendered_payload(text, detail)
            }
        });
    }

    Ok(payloads)
}

/// Payload for a page whose rasterisation failed.
fn unrendered_payload(text: String, detail: String) -> PagePayload {
    if text.trim().is_empty() {
        PagePayload::Unreadable { detail }
    } else {
        PagePayload::Text(text)
    }
}

fn map_load_error(pdf_path: &Path, password: Option<&str>, e: PdfiumError) -> SummaryError {
    let err_str = format!("{:?}", e);
    if err_str.to_lowercase().contains("password") {
        if password.is_some() {
            SummaryError::WrongPassword {
                path: pdf_path.to_path_buf(),
            }
        } else {
            SummaryError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        }
    } else {
        SummaryError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: err_str,
        }
    }
}
