//! Post-processing: deterministic normalization of the model's JSON answer.
//!
//! ## Why is post-processing necessary?
//!
//! Even with a strict schema in the system instruction and
//! `application/json` requested, hosted models regularly return output that
//! is *semantically* fine but *structurally* off:
//!
//! - Wrapping the object in ` ```json ... ``` ` fences
//! - Returning seven affected groups when three were asked for
//! - Spelling risk levels as `"l"`, `"HIGH"` or `"critical"`
//! - Listing a city (`"Mumbai"`) where a state is expected, or the same state
//!   twice in different casing
//! - Multi-line, over-long reasoning summaries
//!
//! Sampling controls (temperature, top-p) do not make a hosted model
//! deterministic. This module does: every answer passes through the same
//! ordered set of pure rules, and the output is a fixed point of them
//! (normalizing a normalized result yields it unchanged).
//!
//! ## Rule Order
//!
//! Groups are truncated before they are repaired so the kept groups are the
//! model's first ones. Region canonicalization runs per group after the risk
//! and name repairs.

use crate::config::AnalysisConfig;
use crate::error::NormalizeError;
use crate::output::{AffectedGroup, AnalysisResult, RiskLevel};
use crate::pipeline::regions::canonicalize_regions;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const DEFAULT_GROUP_NAME: &str = "Unspecified group";
pub const DEFAULT_SUMMARY: &str = "Analysis completed.";
pub const EMPTY_RESPONSE_SUMMARY: &str = "Model returned no text.";

/// Characters of raw output kept in a parse-error excerpt.
const EXCERPT_CHARS: usize = 500;

/// Parse and normalize raw model text in one step.
///
/// An empty or whitespace-only response is not an error: it yields an empty
/// result whose summary says so.
pub fn normalize_model_output(
    raw: &str,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, NormalizeError> {
    if raw.trim().is_empty() {
        warn!("Model returned an empty response");
        return Ok(AnalysisResult::new(
            Vec::new(),
            Vec::new(),
            EMPTY_RESPONSE_SUMMARY,
        ));
    }
    let value = parse_model_output(raw)?;
    normalize(value, config)
}

/// Apply all normalization rules to a parsed JSON value.
///
/// Rules (applied in order):
/// 1. Require a top-level object
/// 2. Truncate `affected_groups` to the configured maximum
/// 3. Repair each group's name and risk level
/// 4. Coerce and canonicalize each group's regions
/// 5. Coerce and truncate `mitigations`
/// 6. Collapse and bound the reasoning summary
pub fn normalize(
    value: Value,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, NormalizeError> {
    let mut obj = match value {
        Value::Object(map) => map,
        other => {
            return Err(NormalizeError::NotAnObject {
                found: json_type_name(&other),
            })
        }
    };

    let groups = take_list(&mut obj, "affected_groups");
    let affected_groups: Vec<AffectedGroup> =
        truncate_logged(groups, config.max_affected_groups, "affected_groups")
            .into_iter()
            .map(repair_group)
            .collect();

    let mitigations = truncate_logged(
        coerce_string_list(obj.remove("mitigations").unwrap_or(Value::Null)),
        config.max_mitigations,
        "mitigations",
    );

    let reasoning_summary = bound_summary(obj.get("reasoning_summary"), config.max_summary_words);

    Ok(AnalysisResult::new(
        affected_groups,
        mitigations,
        reasoning_summary,
    ))
}

// ── Rule 0: Parse with fence recovery ────────────────────────────────────────

static RE_OPEN_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```(?:json)?\s*\n").unwrap());
static RE_CLOSE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n```\s*$").unwrap());

/// Parse model text as JSON, retrying once with markdown fences stripped.
pub fn parse_model_output(raw: &str) -> Result<Value, NormalizeError> {
    let first_err = match serde_json::from_str::<Value>(raw) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };

    let trimmed = raw.trim();
    if trimmed.starts_with("```") {
        let unfenced = strip_json_fences(trimmed);
        if let Ok(v) = serde_json::from_str::<Value>(&unfenced) {
            debug!("Recovered JSON from fenced model output");
            return Ok(v);
        }
    }

    let excerpt: String = raw.chars().take(EXCERPT_CHARS).collect();
    warn!("Invalid JSON from model: {} (excerpt: {})", first_err, excerpt);
    Err(NormalizeError::Parse {
        source: first_err,
        excerpt,
    })
}

fn strip_json_fences(input: &str) -> String {
    let s = RE_OPEN_FENCE.replace(input, "");
    RE_CLOSE_FENCE.replace(&s, "").to_string()
}

// ── Rule 1: Top-level shape ──────────────────────────────────────────────────

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn take_list(obj: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match obj.remove(key) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            warn!("'{}' is a {}, not a list; discarding", key, json_type_name(&other));
            Vec::new()
        }
    }
}

// ── Rule 2 / 5: Truncation ───────────────────────────────────────────────────

fn truncate_logged<T>(mut items: Vec<T>, max: usize, what: &str) -> Vec<T> {
    if items.len() > max {
        debug!("Truncating {} from {} to {}", what, items.len(), max);
        items.truncate(max);
    }
    items
}

// ── Rule 3: Group repair ─────────────────────────────────────────────────────

fn repair_group(entry: Value) -> AffectedGroup {
    let mut obj = match entry {
        Value::Object(map) => map,
        Value::String(name) => {
            let mut map = Map::new();
            map.insert("group".into(), Value::String(name));
            map
        }
        other => {
            warn!("Affected group entry is a {}; using defaults", json_type_name(&other));
            Map::new()
        }
    };

    let group = scalar_to_string(obj.get("group"))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_GROUP_NAME.to_string());

    let risk_level = normalize_risk(obj.get("risk_level"));

    let regions = canonicalize_regions(coerce_regions(obj.remove("regions")));

    AffectedGroup {
        group,
        risk_level,
        regions,
    }
}

/// Map a model risk value to the three-level scale; anything else is Medium.
pub fn normalize_risk(raw: Option<&Value>) -> RiskLevel {
    match raw {
        Some(Value::String(s)) => RiskLevel::from_model(s).unwrap_or_else(|| {
            warn!("Unrecognised risk level '{}', defaulting to Medium", s);
            RiskLevel::Medium
        }),
        other => {
            warn!("Missing or non-string risk level {:?}, defaulting to Medium", other);
            RiskLevel::Medium
        }
    }
}

// ── Rule 4: Region coercion ──────────────────────────────────────────────────

fn coerce_regions(raw: Option<Value>) -> Vec<String> {
    match raw {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| scalar_to_string(Some(v)))
            .collect(),
        Some(v) if is_truthy(&v) => scalar_to_string(Some(&v)).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Strings pass through, numbers and booleans are stringified, everything
/// else (null, containers) is dropped.
fn scalar_to_string(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ── Rule 5: Mitigations ──────────────────────────────────────────────────────

fn coerce_string_list(raw: Value) -> Vec<String> {
    match raw {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| scalar_to_string(Some(v)))
            .collect(),
        Value::String(s) if !s.trim().is_empty() => vec![s],
        Value::Null => Vec::new(),
        other => {
            warn!("'mitigations' is a {}, not a list; discarding", json_type_name(&other));
            Vec::new()
        }
    }
}

// ── Rule 6: Reasoning summary ────────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse whitespace and cap at `max_words`, appending a period when the
/// summary was cut.
pub fn bound_summary(raw: Option<&Value>, max_words: usize) -> String {
    let text = match raw {
        Some(Value::String(s)) => s,
        _ => return DEFAULT_SUMMARY.to_string(),
    };

    let collapsed = RE_WHITESPACE.replace_all(text.trim(), " ");
    let words: Vec<&str> = collapsed.split(' ').filter(|w| !w.is_empty()).collect();
    if words.is_empty() {
        return DEFAULT_SUMMARY.to_string();
    }

    if words.len() <= max_words {
        return words.join(" ");
    }

    let mut summary = words[..max_words].join(" ");
    if !summary.ends_with('.') {
        summary.push('.');
    }
    summary
}
