//! Error types for the policylens library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`PolicyLensError`] — **Fatal**: the request cannot be analysed at all
//!   (bad upload, unreadable PDF, gateway not configured, deadline exceeded).
//!   The HTTP surface maps each variant onto a 4xx/5xx status.
//!
//! * [`GenerationError`] — **Non-fatal**: the model call failed (quota, auth,
//!   transport). It never reaches the caller as an error; the classifier in
//!   [`crate::pipeline::classify`] turns it into a degraded
//!   [`crate::output::AnalysisResult`] so the response contract holds.
//!
//! * [`NormalizeError`] — the model answered, but with something that is not
//!   a JSON object. Also converted into a degraded result by the analyzer.

use crate::pipeline::input::UploadField;
use thiserror::Error;

/// All fatal errors returned by the policylens library.
#[derive(Debug, Error)]
pub enum PolicyLensError {
    // ── Upload validation ─────────────────────────────────────────────────
    /// A required multipart field was absent or had no file name.
    #[error("{field} is required")]
    MissingUpload { field: UploadField },

    /// The uploaded file name does not end in an allowed extension.
    #[error("{field} must be one of: {allowed}")]
    InvalidExtension { field: UploadField, allowed: String },

    /// The uploaded file is larger than the configured ceiling.
    #[error("{field} size exceeds maximum allowed size of {:.1}MB", mib(.limit))]
    FileTooLarge { field: UploadField, limit: usize },

    /// The multipart body itself could not be read.
    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The file was read, but is not a PDF.
    #[error("Failed to extract text from PDF: file is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { magic: [u8; 4] },

    /// The PDF engine could not open or walk the document.
    #[error("Failed to extract text from PDF: {detail}")]
    CorruptPdf { detail: String },

    /// Extraction succeeded but yielded (almost) no text, e.g. a scanned PDF.
    #[error(
        "Could not extract meaningful text from PDF. Please ensure the PDF contains readable text."
    )]
    NoExtractableText { chars: usize },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Place libpdfium next to the binary or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Model gateway ─────────────────────────────────────────────────────
    /// The model provider could not be constructed (missing API key etc.).
    #[error("Model provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The analysis did not finish within the request deadline.
    #[error(
        "Analysis request timed out after {secs} seconds. Please try again with a smaller document."
    )]
    AnalysisTimeout { secs: u64 },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PolicyLensError {
    /// `true` for failures caused by what the client sent.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingUpload { .. }
                | Self::InvalidExtension { .. }
                | Self::FileTooLarge { .. }
                | Self::MalformedUpload(_)
                | Self::NotAPdf { .. }
                | Self::CorruptPdf { .. }
                | Self::NoExtractableText { .. }
        )
    }
}

fn mib(bytes: &usize) -> f64 {
    *bytes as f64 / (1024.0 * 1024.0)
}

/// A failed call to the hosted model.
///
/// Both the `Display` message and the `Debug` representation are inspected
/// by the classifier, so variants keep the upstream status and body intact.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// The API answered with a non-success status.
    #[error("Model API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The request never produced an HTTP response.
    #[error("Request to model API failed: {0}")]
    Transport(String),

    /// The API answered 2xx but the body could not be decoded.
    #[error("Unexpected model API response: {0}")]
    InvalidResponse(String),
}

/// Why raw model output could not be normalized.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Not valid JSON, even after stripping a markdown fence.
    #[error("Invalid JSON response from model: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
        excerpt: String,
    },

    /// Valid JSON, but the top-level value is not an object.
    #[error("Result must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },
}
