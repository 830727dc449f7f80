//! Pipeline stages for policy impact analysis.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. another model gateway) without touching the
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──┐
//! (upload)  (pdfium)  ├──▶ llm ──▶ postprocess ──▶ result
//!     demographics ───┘    │          (normalize)
//!     (csv/calamine)       └──▶ classify (on failure) ──▶ degraded result
//! ```
//!
//! 1. [`input`]        — validate uploads and stage them as temp files
//! 2. [`extract`]      — PDF text; runs in `spawn_blocking` because pdfium is
//!    not async-safe
//! 3. [`demographics`] — table → indicator digest
//! 4. [`llm`]          — the `TextGenerator` seam and the single model call
//! 5. [`postprocess`]  — deterministic normalization of the model's JSON
//! 6. [`classify`]     — upstream failures → degraded results
//! 7. [`regions`]      — city → state alias table used by `postprocess`

pub mod classify;
pub mod demographics;
pub mod extract;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod regions;
