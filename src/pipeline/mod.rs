//! Pipeline stages for report summarisation.
//!
//! Each submodule implements exactly one transformation step, so every stage
//! can be tested with plain data and scripted collaborators.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ extract ──▶ chunk ──▶ summarize ──▶ synthesize
//! (URL/path) (pdfium)  (cache/OCR)  (pages)   (1 call/chunk)  (1–2 calls)
//! ```
//!
//! 1. [`input`]      — canonicalise the path or URL to a local, validated PDF
//! 2. [`render`]     — read text layers and rasterise pages needing OCR;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]     — PNG-encode page images and wrap them for the vision model
//! 4. [`extract`]    — page text via the extraction cache, embedded text or OCR
//! 5. [`chunk`]      — group page texts into page-aligned, size-bounded chunks
//! 6. [`summarize`]  — one model call per chunk, strictly in order
//! 7. [`synthesize`] — merge chunk summaries under a page budget
//! 8. [`postprocess`] — deterministic cleanup of extracted text and model output

pub mod chunk;
pub mod encode;
pub mod extract;
pub mod input;
pub mod postprocess;
pub mod render;
pub mod summarize;
pub mod synthesize;
