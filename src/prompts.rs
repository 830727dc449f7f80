//! Prompts for policy impact assessment.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — tightening a rule (risk thresholds, region
//!    naming) requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the composed prompt directly
//!    without calling a model, so prompt regressions are easy to catch.
//!
//! The system instruction is built from [`AnalysisConfig`] so the limits the
//! model is told about are the limits the normalizer enforces.

use crate::config::AnalysisConfig;
use crate::pipeline::demographics::is_usable_digest;
use tracing::warn;

/// Two worked examples appended to the system instruction.
pub const ANCHORING_EXAMPLES: &str = r#"Example 1:
Policy: "Increase in fuel prices by 20%"
Demographics: "Rural population: 60%, Urban: 40%"
Output:
{
  "affected_groups": [
    {"group": "Rural low-income households", "risk_level": "High", "regions": ["Bihar", "Uttar Pradesh", "Madhya Pradesh"]},
    {"group": "Urban middle-class commuters", "risk_level": "Medium", "regions": ["Maharashtra", "Karnataka", "Tamil Nadu"]}
  ],
  "mitigations": [
    "Provide fuel subsidies for rural areas",
    "Improve public transportation infrastructure",
    "Introduce income-based fuel vouchers"
  ],
  "reasoning_summary": "Fuel price increase disproportionately affects rural low-income households and urban commuters, requiring targeted subsidies and transport improvements."
}

Example 2:
Policy: "Mandatory digital payment for all government services"
Demographics: "Digital literacy: 45%, Rural: 65%"
Output:
{
  "affected_groups": [
    {"group": "Rural elderly population", "risk_level": "High", "regions": ["Rajasthan", "Bihar", "Odisha"]},
    {"group": "Low digital literacy population", "risk_level": "Medium", "regions": ["Uttar Pradesh", "Madhya Pradesh"]}
  ],
  "mitigations": [
    "Provide digital literacy training programs",
    "Maintain offline alternatives for essential services",
    "Establish community digital assistance centers"
  ],
  "reasoning_summary": "Digital payment mandate excludes rural elderly and low-literacy populations, necessitating training and offline alternatives."
}"#;

const JSON_SCHEMA: &str = r#"{
  "affected_groups": [
    {"group": "", "risk_level": "", "regions": []}
  ],
  "mitigations": [],
  "reasoning_summary": ""
}"#;

/// Build the system instruction for the configured limits.
pub fn system_instruction(config: &AnalysisConfig) -> String {
    let groups = config.max_affected_groups;
    let mitigations = config.max_mitigations;
    let words = config.max_summary_words;
    format!(
        r#"You are an autonomous policy impact assessment agent with deterministic rules.

DETERMINISTIC RULES (MUST FOLLOW):
1. Risk Level Assessment:
   - Low: Policy affects <10% population, minimal economic impact, reversible changes, adequate support exists
   - Medium: Policy affects 10-30% population, moderate economic impact, some irreversible changes, partial support
   - High: Policy affects >30% population, significant economic impact, mostly irreversible, limited/no support

2. Group Identification Priority:
   - Vulnerable populations first: elderly, children, low-income, rural residents
   - Consider intersectionality: multiple overlapping characteristics
   - Maximum {groups} groups per analysis

3. Region Mapping:
   - Use Indian state or district names ONLY
   - Map cities to their states automatically
   - Do NOT use city, zone, or metro names

4. Output Constraints:
   - Maximum {mitigations} mitigation strategies
   - Reasoning summary: {words} words or less
   - Single paragraph, no line breaks

ANCHORING EXAMPLES:
{examples}

You will be given:
- A policy description (PRIMARY INPUT - MANDATORY)
- Demographic data summary (SUPPORTING EVIDENCE - OPTIONAL)

When demographic data is provided:
- Use it to identify which population segments are most affected
- Map policy impact to regions based on demographic distribution
- Consider vulnerability indicators (rural %, internet penetration, unemployment, income levels)
- Integrate demographic insights into risk assessment

Your tasks:
1. Identify population groups affected by the policy (max {groups})
2. Assign risk level to each group using the deterministic rules (Low, Medium, High ONLY)
3. Identify impacted regions (Indian states/districts only)
4. Suggest practical mitigation measures (max {mitigations})

Output rules (STRICT AND NON-NEGOTIABLE):
- Output VALID JSON only
- Do not include any text outside the JSON
- Follow the exact JSON schema provided
- Use short, clear, non-technical phrases
- Use the anchoring examples as reference for format

JSON Schema (must match exactly):
{schema}"#,
        examples = ANCHORING_EXAMPLES,
        schema = JSON_SCHEMA,
    )
}

/// Which task template a request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptBranch {
    WithDemographics,
    PolicyOnly,
}

/// Truncate to at most `max` characters, logging at WARN when cut.
pub fn truncate_chars(text: &str, max: usize, what: &str) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => {
            warn!(
                "{} truncated from {} to {} characters",
                what,
                text.chars().count(),
                max
            );
            text[..byte_idx].to_string()
        }
        None => text.to_string(),
    }
}

/// Compose the task payload for one analysis.
///
/// Returns the prompt and the branch taken. The digest is used only when it
/// is usable (non-empty and free of error/placeholder markers).
pub fn compose_prompt(
    policy_text: &str,
    demographic_digest: Option<&str>,
    config: &AnalysisConfig,
) -> (String, PromptBranch) {
    let policy = truncate_chars(policy_text, config.max_policy_chars, "Policy text");

    match demographic_digest.filter(|d| is_usable_digest(d)) {
        Some(digest) => {
            let digest =
                truncate_chars(digest, config.max_demographic_chars, "Demographic digest");
            let prompt = format!(
                r#"Analyze the following policy using the provided demographic data.

POLICY DOCUMENT (PRIMARY INPUT):
{policy}

DEMOGRAPHIC DATA (SUPPORTING EVIDENCE):
{digest}

Instructions:
- The policy document is the primary input; base the analysis on its provisions.
- Use the demographic data to infer impact magnitude, affected regions and vulnerable segments.
- Prefer regions and groups that the demographic data shows to be most exposed.
- If demographic data shows high rural population, prioritize rural groups.
- If demographic data shows low internet penetration in certain regions, consider digital policies' impact there.

Return the analysis as JSON following the schema exactly."#
            );
            (prompt, PromptBranch::WithDemographics)
        }
        None => {
            let prompt = format!(
                r#"Analyze the following policy.

POLICY DOCUMENT:
{policy}

No demographic data was provided. Use general knowledge of Indian demographics to identify affected groups, regions and risk levels.

Return the analysis as JSON following the schema exactly."#
            );
            (prompt, PromptBranch::PolicyOnly)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demographic_branch_carries_guidance() {
        let (prompt, _) = compose_prompt(
            "All welfare applications move online.",
            Some("Demographic Context:\nRural population: 70.0%, Urban population: 30.0%"),
            &AnalysisConfig::default(),
        );
        assert!(prompt.contains("high rural population, prioritize rural groups"));
        assert!(prompt.contains("low internet penetration"));
    }

    #[test]
    fn test_system_instruction_reflects_limits() {
        let cfg = AnalysisConfig::builder()
            .max_affected_groups(4)
            .max_mitigations(6)
            .max_summary_words(30)
            .build()
            .unwrap();
        let s = system_instruction(&cfg);
        assert!(s.contains("Maximum 4 groups per analysis"));
        assert!(s.contains("Maximum 6 mitigation strategies"));
        assert!(s.contains("30 words or less"));
        assert!(s.contains("Example 2:"));
        assert!(s.contains("\"reasoning_summary\": \"\""));
    }

    #[test]
    fn test_branch_selection() {
        let cfg = AnalysisConfig::default();
        let policy = "Subsidy reform for LPG cylinders.";

        let (_, b) = compose_prompt(policy, None, &cfg);
        assert_eq!(b, PromptBranch::PolicyOnly);

        let (_, b) = compose_prompt(policy, Some("Error loading file: bad zip"), &cfg);
        assert_eq!(b, PromptBranch::PolicyOnly);

        let (_, b) = compose_prompt(policy, Some("No demographic data provided"), &cfg);
        assert_eq!(b, PromptBranch::PolicyOnly);

        let (p, b) = compose_prompt(
            policy,
            Some("Demographic Context:\nTotal records: 3"),
            &cfg,
        );
        assert_eq!(b, PromptBranch::WithDemographics);
        assert!(p.contains("Total records: 3"));
        assert!(p.contains(policy));
    }

    #[test]
    fn test_policy_truncated() {
        let cfg = AnalysisConfig::builder().max_policy_chars(10).build().unwrap();
        let (p, _) = compose_prompt("abcdefghijKLMNOP", None, &cfg);
        assert!(p.contains("abcdefghij"));
        assert!(!p.contains("KLMNOP"));
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("₹₹₹₹", 2, "x"), "₹₹");
        assert_eq!(truncate_chars("short", 10, "x"), "short");
    }
}
