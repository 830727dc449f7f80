//! # policylens
//!
//! Assess the demographic and regional impact of a policy document with a
//! hosted large language model.
//!
//! ## Why this crate?
//!
//! Asking a model "who does this policy hurt?" is easy; getting an answer a
//! dashboard can render every time is not. Hosted models wrap JSON in
//! fences, return seven groups when asked for three, invent risk levels and
//! name cities where states were requested. Upstream failures (quota, bad
//! keys) arrive as free-form text. This crate puts a deterministic
//! normalizer and an error classifier around the model call so every
//! response has the same bounded, de-duplicated shape.
//!
//! ## Pipeline Overview
//!
//! ```text
//! policy.pdf  [demographics.csv|xlsx]
//!  │               │
//!  ├─ 1. Input     validate extension/size, stage to temp files
//!  ├─ 2. Extract   PDF text via pdfium (spawn_blocking)
//!  │               └─ Summarize  table → indicator digest (csv / calamine)
//!  ├─ 3. Prompt    system rules + one of two task templates
//!  ├─ 4. Model     Gemini generateContent under a deadline
//!  ├─ 5. Normalize fence recovery, truncation, risk/region repair
//!  └─ 6. Output    envelope, or a degraded result for upstream failures
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use policylens::{AnalysisConfig, AnalysisRequest, GeminiGenerator, PolicyAnalyzer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnalysisConfig::default();
//!     let generator = GeminiGenerator::from_env(&config.model)?;
//!     let analyzer = PolicyAnalyzer::new(Arc::new(generator), config);
//!
//!     let request = AnalysisRequest::new("Fuel prices rise by 20% from April.", None);
//!     let outcome = analyzer.analyze(&request).await;
//!     println!("{}", serde_json::to_string_pretty(outcome.result())?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `policylens` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding only the library:
//! ```toml
//! policylens = { version = "0.2", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod gemini;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_files, run_with_deadline, AnalysisRequest, PolicyAnalyzer};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, CorsOrigins, ServerConfig, ServerConfigBuilder};
pub use error::{GenerationError, NormalizeError, PolicyLensError};
pub use gemini::GeminiGenerator;
pub use output::{
    AffectedGroup, AnalysisOutcome, AnalysisResponse, AnalysisResult, ErrorCategory, RiskLevel,
};
pub use pipeline::extract::{PdfiumExtractor, TextExtractor};
pub use pipeline::llm::{GenerationRequest, TextGenerator};
pub use server::{build_router, serve, AppState};
