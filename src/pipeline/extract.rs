//! Policy text extraction via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so the
//! Tokio workers serving other requests never stall on a large document.

use crate::error::PolicyLensError;
use crate::pipeline::input::check_pdf_magic;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Fewer trimmed characters than this means the PDF carries no usable text
/// (typically a scanned document with no text layer).
pub const MIN_MEANINGFUL_CHARS: usize = 10;

/// Turns a staged policy document into plain text.
///
/// The server holds one behind an `Arc`; [`PdfiumExtractor`] is the default.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String, PolicyLensError>;
}

/// Page text via pdfium.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumExtractor;

#[async_trait]
impl TextExtractor for PdfiumExtractor {
    async fn extract(&self, path: &Path) -> Result<String, PolicyLensError> {
        extract_policy_text(path).await
    }
}

/// Extract the text of every page, each followed by a newline.
///
/// Fails with [`PolicyLensError::NoExtractableText`] when the result is
/// near-empty.
pub async fn extract_policy_text(pdf_path: &Path) -> Result<String, PolicyLensError> {
    let path = pdf_path.to_path_buf();

    let text = tokio::task::spawn_blocking(move || extract_text_blocking(&path))
        .await
        .map_err(|e| PolicyLensError::Internal(format!("Extraction task panicked: {}", e)))??;

    ensure_meaningful(text)
}

/// Reject text with fewer than [`MIN_MEANINGFUL_CHARS`] after trimming.
pub fn ensure_meaningful(text: String) -> Result<String, PolicyLensError> {
    let chars = text.trim().chars().count();
    if chars < MIN_MEANINGFUL_CHARS {
        warn!("PDF yielded only {} characters of text", chars);
        return Err(PolicyLensError::NoExtractableText { chars });
    }
    Ok(text)
}

/// Bind pdfium: a library next to the binary first, then the system one.
fn bind_pdfium() -> Result<Pdfium, PolicyLensError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| PolicyLensError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of text extraction.
fn extract_text_blocking(pdf_path: &Path) -> Result<String, PolicyLensError> {
    check_pdf_magic(pdf_path)?;

    let pdfium = bind_pdfium()?;

    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| PolicyLensError::CorruptPdf {
                detail: format!("{:?}", e),
            })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut text = String::new();
    for (idx, page) in pages.iter().enumerate() {
        let page_text = page.text().map_err(|e| PolicyLensError::CorruptPdf {
            detail: format!("page {}: {:?}", idx + 1, e),
        })?;
        let content = page_text.all();
        debug!("Page {}: {} chars", idx + 1, content.len());
        text.push_str(&content);
        text.push('\n');
    }

    Ok(text)
}
