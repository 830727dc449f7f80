//! Result types: what an analysis produces and what the API returns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk level of an affected group.
///
/// The normalizer only ever produces `Low`, `Medium` or `High`. `Unknown` is
/// reserved for degraded results synthesized from upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskLevel {
    /// Map a model-supplied risk string onto the three-level scale.
    ///
    /// Returns `None` for anything outside the recognised aliases; callers
    /// default that to [`RiskLevel::Medium`].
    pub fn from_model(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" | "l" => Some(RiskLevel::Low),
            "medium" | "med" | "m" => Some(RiskLevel::Medium),
            "high" | "h" => Some(RiskLevel::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One population group the policy affects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedGroup {
    pub group: String,
    pub risk_level: RiskLevel,
    pub regions: Vec<String>,
}

impl AffectedGroup {
    pub(crate) fn synthetic(name: &str) -> Self {
        Self {
            group: name.to_string(),
            risk_level: RiskLevel::Unknown,
            regions: Vec::new(),
        }
    }
}

/// Why a result is degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    QuotaExceeded,
    AuthenticationError,
    GenericError,
    ParseError,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::QuotaExceeded => "quota_exceeded",
            ErrorCategory::AuthenticationError => "authentication_error",
            ErrorCategory::GenericError => "generic_error",
            ErrorCategory::ParseError => "parse_error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A schema-conformant analysis.
///
/// The three content fields are always present, including on degraded
/// results, so callers can render any result the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub affected_groups: Vec<AffectedGroup>,
    pub mitigations: Vec<String>,
    pub reasoning_summary: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorCategory>,
}

impl AnalysisResult {
    /// A successful, possibly empty result.
    pub fn new(
        affected_groups: Vec<AffectedGroup>,
        mitigations: Vec<String>,
        reasoning_summary: impl Into<String>,
    ) -> Self {
        Self {
            affected_groups,
            mitigations,
            reasoning_summary: reasoning_summary.into(),
            is_error: false,
            error_type: None,
        }
    }

    pub(crate) fn degraded(
        category: ErrorCategory,
        group: &str,
        mitigations: Vec<String>,
        reasoning_summary: impl Into<String>,
    ) -> Self {
        Self {
            affected_groups: vec![AffectedGroup::synthetic(group)],
            mitigations,
            reasoning_summary: reasoning_summary.into(),
            is_error: true,
            error_type: Some(category),
        }
    }
}

/// Outcome of one analysis: either the model's normalized answer, or a
/// degraded result standing in for an upstream failure.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Completed(AnalysisResult),
    Degraded(AnalysisResult, ErrorCategory),
}

impl AnalysisOutcome {
    pub fn result(&self) -> &AnalysisResult {
        match self {
            AnalysisOutcome::Completed(r) | AnalysisOutcome::Degraded(r, _) => r,
        }
    }

    pub fn into_result(self) -> AnalysisResult {
        match self {
            AnalysisOutcome::Completed(r) | AnalysisOutcome::Degraded(r, _) => r,
        }
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            AnalysisOutcome::Completed(_) => None,
            AnalysisOutcome::Degraded(_, c) => Some(*c),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AnalysisOutcome::Degraded(..))
    }
}

/// Public response envelope of `POST /api/analyze`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub affected_groups: Vec<AffectedGroup>,
    pub mitigations: Vec<String>,
    pub reasoning_summary: String,
    /// Error category of a degraded result; `null` on success.
    pub error: Option<String>,
    /// Whether a usable demographic digest went into the prompt.
    pub demographics_used: bool,
}

impl AnalysisResponse {
    pub fn from_outcome(outcome: AnalysisOutcome, demographics_used: bool) -> Self {
        let error = outcome.category().map(|c| c.as_str().to_string());
        let result = outcome.into_result();
        Self {
            affected_groups: result.affected_groups,
            mitigations: result.mitigations,
            reasoning_summary: result.reasoning_summary,
            error,
            demographics_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_aliases() {
        assert_eq!(RiskLevel::from_model("l"), Some(RiskLevel::Low));
        assert_eq!(RiskLevel::from_model("LOW"), Some(RiskLevel::Low));
        assert_eq!(RiskLevel::from_model("Low "), Some(RiskLevel::Low));
        assert_eq!(RiskLevel::from_model("Med"), Some(RiskLevel::Medium));
        assert_eq!(RiskLevel::from_model("h"), Some(RiskLevel::High));
        assert_eq!(RiskLevel::from_model("critical"), None);
        assert_eq!(RiskLevel::from_model("unknown"), None);
    }

    #[test]
    fn risk_level_serializes_as_title_case() {
        let json = serde_json::to_string(&RiskLevel::Medium).unwrap();
        assert_eq!(json, "\"Medium\"");
    }

    #[test]
    fn successful_result_omits_error_fields() {
        let r = AnalysisResult::new(vec![], vec![], "Analysis completed.");
        let v = serde_json::to_value(&r).unwrap();
        assert!(v.get("is_error").is_none());
        assert!(v.get("error_type").is_none());
        assert_eq!(v["affected_groups"], serde_json::json!([]));
    }

    #[test]
    fn degraded_result_serializes_category() {
        let r = AnalysisResult::degraded(
            ErrorCategory::QuotaExceeded,
            "API Quota Exceeded",
            vec!["Retry after 60 seconds.".into()],
            "quota",
        );
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["is_error"], true);
        assert_eq!(v["error_type"], "quota_exceeded");
        assert_eq!(v["affected_groups"][0]["risk_level"], "Unknown");
    }

    #[test]
    fn envelope_carries_category() {
        let r = AnalysisResult::degraded(ErrorCategory::GenericError, "x", vec![], "y");
        let env = AnalysisResponse::from_outcome(
            AnalysisOutcome::Degraded(r, ErrorCategory::GenericError),
            false,
        );
        assert_eq!(env.error.as_deref(), Some("generic_error"));
        assert!(!env.demographics_used);

        let ok = AnalysisResponse::from_outcome(
            AnalysisOutcome::Completed(AnalysisResult::new(vec![], vec![], "fine")),
            true,
        );
        assert!(ok.error.is_none());
        assert!(ok.demographics_used);
    }
}
