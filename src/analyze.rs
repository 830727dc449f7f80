//! Analysis entry points.
//!
//! [`PolicyAnalyzer`] owns the model gateway and the analysis configuration
//! and turns an [`AnalysisRequest`] into an [`AnalysisOutcome`]. It never
//! returns an error for upstream trouble: quota, auth, transport and
//! unparseable output all come back as degraded outcomes. Fatal problems
//! (bad input, timeouts) are `Err(PolicyLensError)` from the surrounding
//! helpers.
//!
//! The HTTP surface and the `analyze` CLI subcommand share
//! [`run_with_deadline`] and [`demographic_digest`], so both paths behave
//! identically.

use crate::config::{AnalysisConfig, ServerConfig};
use crate::error::PolicyLensError;
use crate::output::{AnalysisOutcome, AnalysisResponse};
use crate::pipeline::demographics::{
    is_usable_digest, load_demographics, NO_DATA_EXTRACTED, NO_DATA_PROVIDED,
};
use crate::pipeline::input::{resolve_local, UploadField};
use crate::pipeline::llm::{run_generation, GenerationRequest, TextGenerator};
use crate::pipeline::extract;
use crate::prompts::{compose_prompt, system_instruction, PromptBranch};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Inputs of one analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub policy_text: String,
    /// Digest text, placeholder or error string. Only a usable digest is
    /// sent to the model.
    pub demographic_digest: Option<String>,
}

impl AnalysisRequest {
    pub fn new(policy_text: impl Into<String>, demographic_digest: Option<String>) -> Self {
        Self {
            policy_text: policy_text.into(),
            demographic_digest,
        }
    }

    pub fn has_demographics(&self) -> bool {
        self.demographic_digest
            .as_deref()
            .is_some_and(is_usable_digest)
    }
}

/// Runs analyses against one model gateway.
pub struct PolicyAnalyzer {
    generator: Arc<dyn TextGenerator>,
    config: AnalysisConfig,
    system_instruction: String,
}

impl PolicyAnalyzer {
    pub fn new(generator: Arc<dyn TextGenerator>, config: AnalysisConfig) -> Self {
        let system_instruction = system_instruction(&config);
        Self {
            generator,
            config,
            system_instruction,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Analyze one request. Always yields a schema-shaped result.
    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalysisOutcome {
        let (prompt, branch) = compose_prompt(
            &request.policy_text,
            request.demographic_digest.as_deref(),
            &self.config,
        );
        match branch {
            PromptBranch::WithDemographics => info!("Analyzing policy with demographic context"),
            PromptBranch::PolicyOnly => info!("Analyzing policy without demographic data"),
        }

        let gen_request = GenerationRequest::new(&self.system_instruction, prompt, &self.config);
        run_generation(self.generator.as_ref(), &gen_request, &self.config).await
    }
}

/// Run an analysis as its own task and wait at most `deadline` for it.
///
/// On timeout the wait is dropped but the task is left to finish on its own;
/// the outbound call is not cancelled.
pub async fn run_with_deadline(
    analyzer: Arc<PolicyAnalyzer>,
    request: AnalysisRequest,
    deadline: Duration,
) -> Result<AnalysisOutcome, PolicyLensError> {
    let start = Instant::now();
    let task = tokio::spawn(async move { analyzer.analyze(&request).await });

    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(outcome)) => {
            debug!("Analysis finished in {:?}", start.elapsed());
            Ok(outcome)
        }
        Ok(Err(join_err)) => Err(PolicyLensError::Internal(format!(
            "Analysis task failed: {}",
            join_err
        ))),
        Err(_) => {
            warn!("Analysis exceeded {}s deadline", deadline.as_secs());
            Err(PolicyLensError::AnalysisTimeout {
                secs: deadline.as_secs(),
            })
        }
    }
}

/// Digest for an optional demographic file.
///
/// No file → [`NO_DATA_PROVIDED`]; an unreadable or empty file →
/// [`NO_DATA_EXTRACTED`]. Neither is sent to the model.
pub async fn demographic_digest(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return NO_DATA_PROVIDED.to_string();
    };
    let digest = load_demographics(path).await;
    if digest.trim().is_empty() || digest.contains("Error loading file") {
        warn!("Demographic file unusable: {}", digest);
        return NO_DATA_EXTRACTED.to_string();
    }
    digest
}

/// Whether the response may claim demographic data was used.
pub fn demographics_used(file_supplied: bool, digest: &str) -> bool {
    file_supplied && is_usable_digest(digest)
}

/// Analyze local files: the `analyze` CLI path.
///
/// Applies the same validation, extraction, digest and deadline rules as
/// the HTTP surface.
pub async fn analyze_files(
    analyzer: Arc<PolicyAnalyzer>,
    policy_path: &Path,
    demographic_path: Option<&Path>,
    server: &ServerConfig,
) -> Result<AnalysisResponse, PolicyLensError> {
    let policy_path = resolve_local(
        UploadField::Policy,
        policy_path,
        &server.policy_extensions,
        server.max_file_size,
    )?;
    let demographic_path = demographic_path
        .map(|p| {
            resolve_local(
                UploadField::Demographic,
                p,
                &server.demographic_extensions,
                server.max_file_size,
            )
        })
        .transpose()?;

    let policy_text = extract::extract_policy_text(&policy_path).await?;
    info!("Extracted {} characters of policy text", policy_text.len());

    let digest = demographic_digest(demographic_path.as_deref()).await;
    let used = demographics_used(demographic_path.is_some(), &digest);

    let request = AnalysisRequest::new(policy_text, Some(digest));
    let outcome = run_with_deadline(analyzer, request, server.request_timeout()).await?;
    Ok(AnalysisResponse::from_outcome(outcome, used))
}
