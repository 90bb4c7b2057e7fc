use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Main configuration structure loaded from technique_rag.toml and environment variables
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub pipeline: PipelineConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: SocketAddr,
}

/// Configuration for the external analysis pipeline process.
///
/// The script location is injected here rather than resolved relative to the
/// binary, so tests and deployments can point at their own collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Interpreter the script is run with ("python" in production)
    pub interpreter: String,
    /// Path to the pipeline script
    pub script: PathBuf,
    /// Hard deadline for one pipeline invocation
    pub timeout_ms: u64,
    /// Stdout capture bound; output beyond this fails the request
    pub max_output_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787"
                .parse()
                .expect("default bind address should parse"),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            script: PathBuf::from("models/ctiPipeline.py"),
            // CTI-BERT loads on every invocation, so the deadline is generous
            timeout_ms: 120_000,
            max_output_bytes: 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables.
    /// Uses TRAG_CONFIG environment variable or defaults to "technique_rag.toml";
    /// env overrides win over the file.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::from_path(".env");

        let config_path =
            std::env::var("TRAG_CONFIG").unwrap_or_else(|_| "technique_rag.toml".to_string());

        let mut config: Config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            toml::from_str(&content)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(bind) = std::env::var("TRAG_HTTP_BIND") {
            self.http.bind = bind
                .parse()
                .map_err(|e| anyhow::anyhow!("TRAG_HTTP_BIND '{}' is not a socket address: {}", bind, e))?;
        }
        if let Ok(interp) = std::env::var("TRAG_PIPELINE_INTERPRETER") {
            self.pipeline.interpreter = interp;
        }
        if let Ok(script) = std::env::var("TRAG_PIPELINE_SCRIPT") {
            self.pipeline.script = PathBuf::from(script);
        }
        if let Ok(raw) = std::env::var("TRAG_PIPELINE_TIMEOUT_MS") {
            match raw.parse::<u64>() {
                Ok(timeout_ms) => self.pipeline.timeout_ms = timeout_ms,
                Err(_) => tracing::warn!(
                    "Ignoring TRAG_PIPELINE_TIMEOUT_MS '{}': not a valid number",
                    raw
                ),
            }
        }
        if let Ok(raw) = std::env::var("TRAG_PIPELINE_MAX_OUTPUT_BYTES") {
            match raw.parse::<usize>() {
                Ok(max_bytes) => self.pipeline.max_output_bytes = max_bytes,
                Err(_) => tracing::warn!(
                    "Ignoring TRAG_PIPELINE_MAX_OUTPUT_BYTES '{}': not a valid number",
                    raw
                ),
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pipeline.interpreter.trim().is_empty() {
            anyhow::bail!("pipeline.interpreter must not be empty");
        }
        if self.pipeline.script.as_os_str().is_empty() {
            anyhow::bail!("pipeline.script must not be empty");
        }
        if self.pipeline.timeout_ms == 0 {
            anyhow::bail!("pipeline.timeout_ms must be greater than 0");
        }
        if self.pipeline.max_output_bytes == 0 {
            anyhow::bail!("pipeline.max_output_bytes must be greater than 0");
        }
        Ok(())
    }
}
