//! CLI binary for policylens.
//!
//! A thin shim over the library crate: `serve` runs the HTTP surface,
//! `analyze` runs one local PDF (and optional table) through the same
//! pipeline and prints the response envelope as JSON.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use policylens::{
    analyze_files, serve, AnalysisConfig, AnalysisResponse, AppState, CorsOrigins,
    GeminiGenerator, PolicyAnalyzer, ServerConfig,
};
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the API on 0.0.0.0:8000
  policylens serve

  # Analyze a policy with census data
  policylens analyze fuel_policy.pdf --demographics census.csv

  # Policy only, custom model
  policylens analyze --model gemini-2.5-pro scheme.pdf > result.json

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Gemini API key (GOOGLE_API_KEY is used as fallback)
  GEMINI_MODEL            Model ID (default gemini-2.5-flash)
  API_HOST / API_PORT     Bind address for `serve`
  CORS_ORIGINS            Comma-separated allowed origins (default *)
  RUST_LOG                Overrides the log filter

SETUP:
  pdfium is loaded from the working directory first, then from the system
  library path. Download a build from bblanchon/pdfium-binaries if needed."#;

/// Assess the demographic impact of policy documents with Gemini.
#[derive(Parser, Debug)]
#[command(
    name = "policylens",
    version,
    about = "Assess the demographic and regional impact of policy documents",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "POLICYLENS_VERBOSE")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Analyze one local policy PDF and print the result as JSON.
    Analyze(AnalyzeArgs),
}

/// Options shared by both subcommands.
#[derive(Args, Debug)]
struct CommonArgs {
    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini model ID.
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.5-flash")]
    model: String,

    /// Sampling temperature (advisory).
    #[arg(long, env = "AGENT_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Nucleus-sampling threshold (advisory).
    #[arg(long, env = "AGENT_TOP_P", default_value_t = 0.95)]
    top_p: f32,

    /// Maximum affected groups per result.
    #[arg(long, env = "POLICYLENS_MAX_AFFECTED_GROUPS", default_value_t = 3)]
    max_affected_groups: usize,

    /// Maximum mitigations per result.
    #[arg(long, env = "POLICYLENS_MAX_MITIGATIONS", default_value_t = 5)]
    max_mitigations: usize,

    /// Maximum words in the reasoning summary.
    #[arg(long, env = "POLICYLENS_SUMMARY_MAX_WORDS", default_value_t = 35)]
    summary_max_words: usize,

    /// Per-file upload ceiling in bytes.
    #[arg(long, env = "POLICYLENS_MAX_FILE_SIZE", default_value_t = 10 * 1024 * 1024)]
    max_file_size: usize,

    /// Analysis deadline in seconds.
    #[arg(long, env = "POLICYLENS_REQUEST_TIMEOUT", default_value_t = 300)]
    timeout: u64,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Bind address.
    #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Bind port.
    #[arg(long, env = "API_PORT", default_value_t = 8000)]
    port: u16,

    /// Allowed CORS origins, comma-separated; `*` allows any.
    #[arg(long, env = "CORS_ORIGINS", default_value = "*")]
    cors_origins: String,

    /// Cloud project (carried for deployments).
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT", default_value = "")]
    cloud_project: String,

    /// Cloud location (carried for deployments).
    #[arg(long, env = "VERTEX_AI_LOCATION", default_value = "us-central1")]
    cloud_location: String,

    /// Deployment label.
    #[arg(long, env = "ENVIRONMENT", default_value = "development")]
    environment: String,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Policy PDF.
    policy: PathBuf,

    /// Demographic table (.csv, .xlsx, .xls).
    #[arg(short, long)]
    demographics: Option<PathBuf>,

    /// Write JSON to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn analysis_config(common: &CommonArgs) -> Result<AnalysisConfig> {
    AnalysisConfig::builder()
        .model(&common.model)
        .temperature(common.temperature)
        .top_p(common.top_p)
        .max_affected_groups(common.max_affected_groups)
        .max_mitigations(common.max_mitigations)
        .max_summary_words(common.summary_max_words)
        .build()
        .context("Invalid analysis configuration")
}

fn build_analyzer(
    common: &CommonArgs,
    config: AnalysisConfig,
) -> Result<PolicyAnalyzer, policylens::PolicyLensError> {
    let generator = match common.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => GeminiGenerator::new(key, &config.model)?,
        None => GeminiGenerator::from_env(&config.model)?,
    };
    Ok(PolicyAnalyzer::new(Arc::new(generator), config))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Analyze(args) => run_analyze(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let server_config = ServerConfig::builder()
        .host(args.host)
        .port(args.port)
        .max_file_size(args.common.max_file_size)
        .request_timeout_secs(args.common.timeout)
        .cors_origins(CorsOrigins::parse(&args.cors_origins))
        .cloud_project(args.cloud_project)
        .cloud_location(args.cloud_location)
        .environment(args.environment)
        .build()
        .context("Invalid server configuration")?;

    let analysis = analysis_config(&args.common)?;
    // A missing key must not stop the server: /health reports it instead.
    let state = AppState::from_analyzer(build_analyzer(&args.common, analysis), server_config);

    serve(state).await.context("Server exited with an error")
}

async fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let server_config = ServerConfig::builder()
        .max_file_size(args.common.max_file_size)
        .request_timeout_secs(args.common.timeout)
        .build()
        .context("Invalid configuration")?;

    let analysis = analysis_config(&args.common)?;
    let analyzer = build_analyzer(&args.common, analysis).context("Model gateway unavailable")?;

    let response = analyze_files(
        Arc::new(analyzer),
        &args.policy,
        args.demographics.as_deref(),
        &server_config,
    )
    .await
    .with_context(|| format!("Failed to analyze {}", args.policy.display()))?;

    let json = serde_json::to_string_pretty(&response).context("Failed to serialize result")?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} wrote {}", green("✔"), path.display());
        }
        None => println!("{json}"),
    }

    report(&response);
    Ok(())
}

/// One-line status on stderr so piping stdout stays clean.
fn report(response: &AnalysisResponse) {
    match &response.error {
        None => eprintln!(
            "{} {} groups, {} mitigations{}",
            green("✔"),
            bold(&response.affected_groups.len().to_string()),
            bold(&response.mitigations.len().to_string()),
            if response.demographics_used {
                " (with demographic data)"
            } else {
                ""
            }
        ),
        Some(category) => eprintln!(
            "{} degraded result ({}): {}",
            red("✘"),
            category,
            response.reasoning_summary
        ),
    }
}
