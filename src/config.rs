//! Configuration types for policy analysis and the HTTP surface.
//!
//! Analysis behaviour is controlled through [`AnalysisConfig`], the server
//! through [`ServerConfig`]. Both are built via a validating builder so the
//! binary can map CLI/env values onto them one field at a time and rely on
//! documented defaults for everything else.

use crate::error::PolicyLensError;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Allowed extensions for the policy document upload.
pub const POLICY_EXTENSIONS: &[&str] = &[".pdf"];

/// Allowed extensions for the optional demographic upload.
pub const DEMOGRAPHIC_EXTENSIONS: &[&str] = &[".csv", ".xlsx", ".xls"];

/// Configuration for a single policy analysis.
///
/// # Example
/// ```rust
/// use policylens::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .model("gemini-2.5-flash")
///     .max_affected_groups(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_mitigations, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Model identifier sent to the gateway. Default: `gemini-2.5-flash`.
    pub model: String,

    /// Sampling temperature. Default: 0.3.
    ///
    /// Advisory only: the hosted model is free to ignore it. Output stability
    /// comes from the normalizer, not from sampling controls.
    pub temperature: f32,

    /// Nucleus-sampling threshold. Default: 0.95. Advisory, like `temperature`.
    pub top_p: f32,

    /// Maximum affected groups kept in a result. Default: 3.
    pub max_affected_groups: usize,

    /// Maximum mitigation strings kept in a result. Default: 5.
    pub max_mitigations: usize,

    /// Maximum words in the reasoning summary. Default: 35.
    pub max_summary_words: usize,

    /// Policy text is truncated to this many characters. Default: 20 000.
    pub max_policy_chars: usize,

    /// Demographic digest is truncated to this many characters. Default: 5 000.
    pub max_demographic_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.3,
            top_p: 0.95,
            max_affected_groups: 3,
            max_mitigations: 5,
            max_summary_words: 35,
            max_policy_chars: 20_000,
            max_demographic_chars: 5_000,
        }
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn max_affected_groups(mut self, n: usize) -> Self {
        self.config.max_affected_groups = n;
        self
    }

    pub fn max_mitigations(mut self, n: usize) -> Self {
        self.config.max_mitigations = n;
        self
    }

    pub fn max_summary_words(mut self, n: usize) -> Self {
        self.config.max_summary_words = n;
        self
    }

    pub fn max_policy_chars(mut self, n: usize) -> Self {
        self.config.max_policy_chars = n;
        self
    }

    pub fn max_demographic_chars(mut self, n: usize) -> Self {
        self.config.max_demographic_chars = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, PolicyLensError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(PolicyLensError::InvalidConfig(
                "Model identifier must not be empty".into(),
            ));
        }
        if c.max_affected_groups == 0 {
            return Err(PolicyLensError::InvalidConfig(
                "max_affected_groups must be ≥ 1".into(),
            ));
        }
        if c.max_summary_words == 0 {
            return Err(PolicyLensError::InvalidConfig(
                "max_summary_words must be ≥ 1".into(),
            ));
        }
        if c.max_policy_chars == 0 {
            return Err(PolicyLensError::InvalidConfig(
                "max_policy_chars must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Server ───────────────────────────────────────────────────────────────

/// Which origins the CORS layer admits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorsOrigins {
    /// `*` (default).
    #[default]
    Any,
    /// An explicit allow-list.
    List(Vec<String>),
}

impl CorsOrigins {
    /// Parse a comma-separated origin list; `*` or an empty list means any.
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            CorsOrigins::Any
        } else {
            CorsOrigins::List(origins)
        }
    }
}

/// Configuration for the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default: `0.0.0.0`.
    pub host: IpAddr,

    /// Bind port. Default: 8000.
    pub port: u16,

    /// Per-file upload ceiling in bytes. Default: 10 MiB.
    pub max_file_size: usize,

    /// Allowed policy extensions (lower-case, with dot).
    pub policy_extensions: Vec<String>,

    /// Allowed demographic extensions (lower-case, with dot).
    pub demographic_extensions: Vec<String>,

    /// Deadline for the model-facing part of a request. Default: 300 s.
    pub request_timeout_secs: u64,

    /// CORS origin policy.
    pub cors_origins: CorsOrigins,

    /// Cloud project; carried for deployments, unused by the analysis.
    pub cloud_project: Option<String>,

    /// Cloud location; carried for deployments, unused by the analysis.
    pub cloud_location: String,

    /// Free-form deployment label (`development`, `production`, …).
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
            max_file_size: 10 * 1024 * 1024,
            policy_extensions: POLICY_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            demographic_extensions: DEMOGRAPHIC_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            request_timeout_secs: 300,
            cors_origins: CorsOrigins::default(),
            cloud_project: None,
            cloud_location: "us-central1".to_string(),
            environment: "development".to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a new builder for `ServerConfig`.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn cors_origins(mut self, origins: CorsOrigins) -> Self {
        self.config.cors_origins = origins;
        self
    }

    pub fn cloud_project(mut self, project: impl Into<String>) -> Self {
        let project = project.into();
        self.config.cloud_project = (!project.is_empty()).then_some(project);
        self
    }

    pub fn cloud_location(mut self, location: impl Into<String>) -> Self {
        self.config.cloud_location = location.into();
        self
    }

    pub fn environment(mut self, env: impl Into<String>) -> Self {
        self.config.environment = env.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServerConfig, PolicyLensError> {
        let c = &self.config;
        if c.max_file_size == 0 {
            return Err(PolicyLensError::InvalidConfig(
                "max_file_size must be ≥ 1 byte".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(PolicyLensError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
