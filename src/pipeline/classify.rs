//! Failure classification: turn a model-call error into a degraded result.
//!
//! ## Why an ordered rule table?
//!
//! Upstream failures arrive as free-form text: a Gemini 429 body, a proxy's
//! HTML error page, a TLS failure. The only reliable signal is substrings in
//! the error's display message and its `Debug` representation. Rules are
//! checked in order and the first match wins, so a body that mentions both
//! `quota` and `403` is treated as quota exhaustion, the more actionable of
//! the two. Each rule is unit-tested against literal captured messages.

use crate::error::{GenerationError, NormalizeError};
use crate::output::{AnalysisResult, ErrorCategory};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Retry delay suggested when the upstream message names none.
pub const DEFAULT_RETRY_SECS: u64 = 60;

/// Maximum characters of an upstream message echoed in a generic result.
const GENERIC_MESSAGE_CHARS: usize = 150;

/// Both renderings of an error, prepared once for the rule predicates.
pub struct ErrorText {
    display: String,
    debug: String,
    combined_lower: String,
}

impl ErrorText {
    pub fn new(display: impl Into<String>, debug: impl Into<String>) -> Self {
        let display = display.into();
        let debug = debug.into();
        let combined_lower = format!("{} {}", display, debug).to_lowercase();
        Self {
            display,
            debug,
            combined_lower,
        }
    }

    pub fn from_error(err: &GenerationError) -> Self {
        Self::new(err.to_string(), format!("{:?}", err))
    }

    fn either_contains(&self, needle: &str) -> bool {
        self.display.contains(needle) || self.debug.contains(needle)
    }
}

type Rule = (fn(&ErrorText) -> bool, ErrorCategory);

/// Ordered `(predicate, category)` pairs; first match wins.
static RULES: &[Rule] = &[
    (is_quota, ErrorCategory::QuotaExceeded),
    (is_auth, ErrorCategory::AuthenticationError),
];

fn is_quota(t: &ErrorText) -> bool {
    t.either_contains("429")
        || t.combined_lower.contains("resource_exhausted")
        || t.combined_lower.contains("quota")
}

fn is_auth(t: &ErrorText) -> bool {
    t.display.contains("401")
        || t.display.contains("403")
        || t.combined_lower.contains("authentication")
        || t.combined_lower.contains("invalid api key")
}

/// Category of an upstream failure; `GenericError` when no rule matches.
pub fn classify(text: &ErrorText) -> ErrorCategory {
    RULES
        .iter()
        .find(|(pred, _)| pred(text))
        .map(|(_, cat)| *cat)
        .unwrap_or(ErrorCategory::GenericError)
}

static RE_RETRY_DELAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"retry in (\d+\.?\d*)\s*s").unwrap());

/// Whole seconds from a `retry in <n>s` hint, else [`DEFAULT_RETRY_SECS`].
pub fn retry_delay_secs(text: &ErrorText) -> u64 {
    RE_RETRY_DELAY
        .captures(&text.combined_lower)
        .and_then(|c| c[1].parse::<f64>().ok())
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f.trunc() as u64)
        .unwrap_or(DEFAULT_RETRY_SECS)
}

/// Build the degraded result standing in for a failed model call.
pub fn degraded_result(err: &GenerationError) -> (AnalysisResult, ErrorCategory) {
    let text = ErrorText::from_error(err);
    let category = classify(&text);
    warn!("Model call failed ({}): {}", category, err);
    (degraded_for(category, &text), category)
}

fn degraded_for(category: ErrorCategory, text: &ErrorText) -> AnalysisResult {
    match category {
        ErrorCategory::QuotaExceeded => {
            let secs = retry_delay_secs(text);
            AnalysisResult::degraded(
                category,
                "API Quota Exceeded",
                vec![
                    "API quota limit reached. Please wait before retrying.".into(),
                    format!("Retry after {} seconds.", secs),
                    "Check your Gemini API quota and billing details at https://ai.dev/usage"
                        .into(),
                    "Consider upgrading your API plan for higher limits".into(),
                ],
                format!(
                    "API quota exceeded. Please retry after {} seconds or upgrade your API plan.",
                    secs
                ),
            )
        }
        ErrorCategory::AuthenticationError => AnalysisResult::degraded(
            category,
            "API Authentication Error",
            vec![
                "Invalid or expired API key.".into(),
                "Please check your Gemini API key configuration.".into(),
                "Update the API key in environment variables or config.".into(),
            ],
            "API authentication failed. Please verify your API key.",
        ),
        ErrorCategory::GenericError => AnalysisResult::degraded(
            category,
            "Error analyzing data",
            vec![
                "Please try again. If the error persists, check your API configuration.".into(),
            ],
            sanitize_message(&text.display),
        ),
        ErrorCategory::ParseError => parse_error_result(),
    }
}

/// An `{"error": ...}` / `{'error': ...}` object, pretty-printed or not.
static RE_ERROR_DUMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\{\s*['"]error['"]\s*:"#).unwrap());

/// Cap an upstream message and hide raw structured error dumps.
pub fn sanitize_message(msg: &str) -> String {
    if RE_ERROR_DUMP.is_match(msg) {
        return "An unexpected error occurred during analysis.".to_string();
    }
    msg.chars().take(GENERIC_MESSAGE_CHARS).collect()
}

/// Degraded result for model output that could not be normalized.
pub fn parse_error_result() -> AnalysisResult {
    AnalysisResult::degraded(
        ErrorCategory::ParseError,
        "Error parsing response",
        vec!["Please try again. The AI response was invalid.".into()],
        "Error occurred while parsing AI response.",
    )
}

/// Degraded result for a [`NormalizeError`].
pub fn degraded_from_normalize(err: &NormalizeError) -> (AnalysisResult, ErrorCategory) {
    warn!("Model output could not be normalized: {}", err);
    (parse_error_result(), ErrorCategory::ParseError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RiskLevel;

    // Body captured from a free-tier generateContent 429.
    const GEMINI_429: &str = r#"{
  "error": {
    "code": 429,
    "message": "You exceeded your current quota, please check your plan and billing details. Please retry in 12.5s.",
    "status": "RESOURCE_EXHAUSTED"
  }
}"#;

    const GEMINI_403: &str = r#"{
  "error": {
    "code": 403,
    "message": "Method doesn't allow unregistered callers (callers without established identity). Please use API Key or other form of API consumer identity to call this API.",
    "status": "PERMISSION_DENIED"
  }
}"#;

    const GEMINI_400_BAD_KEY: &str = r#"{
  "error": {
    "code": 400,
    "message": "API key not valid. Please pass a valid API key.",
    "status": "INVALID_ARGUMENT",
    "details": [{"reason": "API_KEY_INVALID"}]
  }
}"#;

    fn api(status: u16, body: &str) -> GenerationError {
        GenerationError::Api {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_quota_from_captured_429() {
        let (result, cat) = degraded_result(&api(429, GEMINI_429));
        assert_eq!(cat, ErrorCategory::QuotaExceeded);
        assert_eq!(result.error_type, Some(ErrorCategory::QuotaExceeded));
        assert!(result.is_error);
        assert_eq!(result.affected_groups[0].group, "API Quota Exceeded");
        assert_eq!(result.affected_groups[0].risk_level, RiskLevel::Unknown);
        assert!(result.affected_groups[0].regions.is_empty());
        assert!(result
            .mitigations
            .contains(&"Retry after 12 seconds.".to_string()));
    }

    #[test]
    fn test_quota_default_delay() {
        let text = ErrorText::new("RESOURCE_EXHAUSTED", "");
        assert_eq!(classify(&text), ErrorCategory::QuotaExceeded);
        assert_eq!(retry_delay_secs(&text), 60);
    }

    #[test]
    fn test_quota_detected_in_debug_only() {
        let text = ErrorText::new("upstream failed", "Api { status: 429, body: \"\" }");
        assert_eq!(classify(&text), ErrorCategory::QuotaExceeded);
    }

    #[test]
    fn test_auth_from_captured_403() {
        let (result, cat) = degraded_result(&api(403, GEMINI_403));
        assert_eq!(cat, ErrorCategory::AuthenticationError);
        assert_eq!(result.affected_groups[0].group, "API Authentication Error");
        assert_eq!(
            result.reasoning_summary,
            "API authentication failed. Please verify your API key."
        );
    }

    #[test]
    fn test_invalid_api_key_phrase() {
        let text = ErrorText::new("Invalid API key supplied", "");
        assert_eq!(classify(&text), ErrorCategory::AuthenticationError);
    }

    #[test]
    fn test_bad_key_400_is_generic_and_sanitized() {
        let (result, cat) = degraded_result(&api(400, GEMINI_400_BAD_KEY));
        assert_eq!(cat, ErrorCategory::GenericError);
        assert_eq!(result.affected_groups[0].group, "Error analyzing data");
        assert_eq!(
            result.reasoning_summary,
            "An unexpected error occurred during analysis."
        );
        assert!(!result.reasoning_summary.contains("INVALID_ARGUMENT"));
    }

    #[test]
    fn test_pretty_printed_500_body_is_hidden() {
        let body = "{\n  \"error\": {\n    \"code\": 500,\n    \"message\": \"Internal error encountered.\",\n    \"status\": \"INTERNAL\"\n  }\n}\n";
        let (result, cat) = degraded_result(&api(500, body));
        assert_eq!(cat, ErrorCategory::GenericError);
        assert_eq!(
            result.reasoning_summary,
            "An unexpected error occurred during analysis."
        );
    }

    #[test]
    fn test_generic_message_capped() {
        let err = GenerationError::Transport("x".repeat(400));
        let (result, cat) = degraded_result(&err);
        assert_eq!(cat, ErrorCategory::GenericError);
        assert_eq!(result.reasoning_summary.chars().count(), 150);
    }

    #[test]
    fn test_sanitize_structured_dump() {
        assert_eq!(
            sanitize_message("500 Internal: {'error': {'code': 500}}"),
            "An unexpected error occurred during analysis."
        );
        assert_eq!(
            sanitize_message("{ \"error\" : \"backend down\" }"),
            "An unexpected error occurred during analysis."
        );
        assert_eq!(
            sanitize_message("connection reset by peer"),
            "connection reset by peer"
        );
    }

    #[test]
    fn test_quota_rule_precedes_auth() {
        let text = ErrorText::new("403 quota exceeded for project", "");
        assert_eq!(classify(&text), ErrorCategory::QuotaExceeded);
    }

    #[test]
    fn test_parse_error_result() {
        let r = parse_error_result();
        assert_eq!(r.error_type, Some(ErrorCategory::ParseError));
        assert_eq!(
            r.mitigations,
            vec!["Please try again. The AI response was invalid."]
        );
    }
}
