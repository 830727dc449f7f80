//! End-to-end tests for policylens.
//!
//! These tests use real policy PDFs in `./test_cases/` and make live Gemini
//! calls. They are gated behind the `E2E_ENABLED` environment variable so
//! they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 GEMINI_API_KEY=... LD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture
//!
//! Expected files:
//!   test_cases/fuel_price_policy.pdf   any text-layer policy document
//!   test_cases/census_sample.csv       any table with a population column

use policylens::{
    analyze_files, AnalysisConfig, AnalysisRequest, GeminiGenerator, PolicyAnalyzer, RiskLevel,
    ServerConfig,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test unless E2E_ENABLED is set and an API key is present.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        match GeminiGenerator::from_env(&AnalysisConfig::default().model) {
            Ok(g) => g,
            Err(e) => {
                println!("SKIP — {e}");
                return;
            }
        }
    }};
}

/// Skip this test if the file at `path` is missing.
macro_rules! skip_unless_exists {
    ($path:expr) => {{
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn analyzer(generator: GeminiGenerator) -> Arc<PolicyAnalyzer> {
    Arc::new(PolicyAnalyzer::new(
        Arc::new(generator),
        AnalysisConfig::default(),
    ))
}

/// Assert the response obeys every bound the normalizer guarantees.
fn assert_bounded(
    groups: usize,
    mitigations: usize,
    summary: &str,
    context: &str,
) {
    let cfg = AnalysisConfig::default();
    assert!(
        groups <= cfg.max_affected_groups,
        "[{context}] {groups} groups exceeds {}",
        cfg.max_affected_groups
    );
    assert!(
        mitigations <= cfg.max_mitigations,
        "[{context}] {mitigations} mitigations exceeds {}",
        cfg.max_mitigations
    );
    let words = summary.split_whitespace().count();
    assert!(
        words <= cfg.max_summary_words,
        "[{context}] summary has {words} words"
    );
    assert!(!summary.trim().is_empty(), "[{context}] empty summary");
    println!("[{context}] ✓  {groups} groups, {mitigations} mitigations, {words} words");
}

// ── Model only (no PDF) ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_live_analysis_from_text() {
    let generator = e2e_skip_unless_enabled!();
    let analyzer = analyzer(generator);

    let request = AnalysisRequest::new(
        "Notification: The retail price of diesel and petrol will increase by 20% \
         across all states from 1 April. Subsidies for LPG cylinders are withdrawn \
         for households with annual income above 5 lakh.",
        None,
    );
    let outcome = analyzer.analyze(&request).await;
    if outcome.is_degraded() {
        println!("SKIP — model unavailable: {:?}", outcome.category());
        return;
    }

    let result = outcome.result();
    assert!(!result.affected_groups.is_empty());
    for g in &result.affected_groups {
        assert_ne!(g.risk_level, RiskLevel::Unknown);
        assert!(!g.group.trim().is_empty());
    }
    assert_bounded(
        result.affected_groups.len(),
        result.mitigations.len(),
        &result.reasoning_summary,
        "text-only",
    );
}

// ── Full pipeline (PDF + optional table) ─────────────────────────────────────

#[tokio::test]
async fn test_live_policy_pdf() {
    let generator = e2e_skip_unless_enabled!();
    let pdf = skip_unless_exists!(test_cases_dir().join("fuel_price_policy.pdf"));

    let response = analyze_files(analyzer(generator), &pdf, None, &ServerConfig::default())
        .await
        .expect("analysis should succeed");

    assert!(!response.demographics_used);
    assert_bounded(
        response.affected_groups.len(),
        response.mitigations.len(),
        &response.reasoning_summary,
        "pdf",
    );
    println!("{}", serde_json::to_string_pretty(&response).unwrap());
}

#[tokio::test]
async fn test_live_policy_pdf_with_census() {
    let generator = e2e_skip_unless_enabled!();
    let pdf = skip_unless_exists!(test_cases_dir().join("fuel_price_policy.pdf"));
    let csv = skip_unless_exists!(test_cases_dir().join("census_sample.csv"));

    let response = analyze_files(
        analyzer(generator),
        &pdf,
        Some(&csv),
        &ServerConfig::default(),
    )
    .await
    .expect("analysis should succeed");

    assert!(response.demographics_used);
    assert_bounded(
        response.affected_groups.len(),
        response.mitigations.len(),
        &response.reasoning_summary,
        "pdf+csv",
    );
}

#[tokio::test]
async fn test_live_bad_key_is_degraded() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let generator = GeminiGenerator::new("not-a-real-key", &AnalysisConfig::default().model)
        .expect("non-blank key is accepted");
    let outcome = analyzer(generator)
        .analyze(&AnalysisRequest::new("Water tariffs double.", None))
        .await;

    assert!(outcome.is_degraded());
    let result = outcome.result();
    assert_eq!(result.affected_groups.len(), 1);
    assert_eq!(result.affected_groups[0].risk_level, RiskLevel::Unknown);
    println!("[bad-key] category = {:?}", outcome.category());
}
