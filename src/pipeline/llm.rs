//! Model interaction: issue the composed prompt and shape the answer.
//!
//! This module turns a composed prompt into an [`AnalysisOutcome`]. It is
//! intentionally thin: prompt wording lives in [`crate::prompts`], the
//! concrete HTTP client in [`crate::gemini`], and output repair in
//! [`super::postprocess`], so each can change without touching the others.
//!
//! ## No retries
//!
//! A quota failure from a hosted model usually carries a retry hint measured
//! in tens of seconds, longer than a caller wants a request held open. The
//! hint is surfaced in the degraded result instead of being acted on here.

use crate::config::AnalysisConfig;
use crate::error::GenerationError;
use crate::output::AnalysisOutcome;
use crate::pipeline::{classify, postprocess};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info};

/// MIME type requested from the model.
pub const JSON_MIME_TYPE: &str = "application/json";

/// One generation call: system instruction, task payload and sampling knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub response_mime_type: String,
}

impl GenerationRequest {
    pub fn new(
        system_instruction: impl Into<String>,
        prompt: impl Into<String>,
        config: &AnalysisConfig,
    ) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            prompt: prompt.into(),
            temperature: config.temperature,
            top_p: config.top_p,
            response_mime_type: JSON_MIME_TYPE.to_string(),
        }
    }
}

/// Anything that can turn a prompt into raw model text.
///
/// Implemented by [`crate::gemini::GeminiGenerator`]; tests substitute a
/// scripted implementation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Send the request and return the model's raw text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Run one generation and normalize its output.
///
/// Always returns an outcome and never propagates the error upward: upstream
/// failures and unparseable output become degraded results, so the caller
/// always has the three schema fields to return.
pub async fn run_generation(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
    config: &AnalysisConfig,
) -> AnalysisOutcome {
    let start = Instant::now();
    debug!(
        "Calling {} (system {} chars, prompt {} chars)",
        generator.name(),
        request.system_instruction.len(),
        request.prompt.len()
    );

    let raw = match generator.generate(request).await {
        Ok(text) => text,
        Err(e) => {
            let (result, category) = classify::degraded_result(&e);
            return AnalysisOutcome::Degraded(result, category);
        }
    };

    debug!(
        "{} answered with {} chars in {:?}",
        generator.name(),
        raw.len(),
        start.elapsed()
    );

    match postprocess::normalize_model_output(&raw, config) {
        Ok(result) => {
            info!(
                "Analysis completed: {} groups, {} mitigations",
                result.affected_groups.len(),
                result.mitigations.len()
            );
            AnalysisOutcome::Completed(result)
        }
        Err(e) => {
            let (result, category) = classify::degraded_from_normalize(&e);
            AnalysisOutcome::Degraded(result, category)
        }
    }
}
