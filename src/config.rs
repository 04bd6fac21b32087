//! @ai:module:intent Configuration structs for the pipeline
//! @ai:module:layer infrastructure
//! @ai:module:public_api PipelineConfig, ApiConfig, RunConfig, RetryPolicy, PathConfig
//! @ai:module:stateless true

use crate::error::ConfigurationError;
use crate::normalize::{ExecutionCountSource, ParserKind};
use crate::tools::ToolSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// @ai:intent Main configuration passed explicitly into every stage
/// @ai:effects pure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

/// @ai:intent Text-generation capability settings
/// @ai:effects pure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Environment variable holding the bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_rate_limit")]
    pub requests_per_minute: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// @ai:intent Batch execution settings shared by all stages
/// @ai:effects pure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Worker-pool size per stage
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub dry_run: bool,
    /// Keep artifacts and invocations whose ids left the catalog
    #[serde(default)]
    pub keep_stale: bool,
    /// Exit successfully even when items failed
    #[serde(default)]
    pub ignore_failures: bool,
    /// Wall-clock bound for a whole stage
    #[serde(default)]
    pub stage_timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// @ai:intent Bounded retry-with-backoff for transient generation errors
/// @ai:effects pure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub initial_backoff_ms: u64,
}

/// @ai:intent Input/output locations
/// @ai:effects pure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            requests_per_minute: default_rate_limit(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            dry_run: false,
            keep_stale: false,
            ignore_failures: false,
            stage_timeout_secs: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_backoff_ms(),
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_rate_limit() -> u32 {
    60
}

fn default_request_timeout() -> u64 {
    120
}

fn default_concurrency() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_catalog() -> PathBuf {
    PathBuf::from("prompts.json")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

impl RetryPolicy {
    /// @ai:intent Delay before the given retry (1-based attempt that just failed)
    /// @ai:effects pure
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

impl RunConfig {
    /// @ai:intent Stage timeout as a duration, if configured
    /// @ai:effects pure
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

impl PipelineConfig {
    /// @ai:intent Load configuration from a TOML file
    /// @ai:pre path exists and is readable
    /// @ai:effects fs:read
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigurationError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// @ai:intent Save configuration to a TOML file
    /// @ai:effects fs:write
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// @ai:intent Reject configurations that would fail every item
    /// @ai:effects pure
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.run.concurrency == 0 {
            return Err(ConfigurationError::Capability(
                "run.concurrency must be at least 1".to_string(),
            ));
        }

        if self.run.retry.max_attempts == 0 {
            return Err(ConfigurationError::Capability(
                "run.retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if !self.run.dry_run && self.api.requests_per_minute == 0 {
            return Err(ConfigurationError::Capability(
                "api.requests_per_minute must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();

        for tool in &self.tools {
            tool.validate()?;

            if !seen.insert(tool.name.as_str()) {
                return Err(ConfigurationError::InvalidTool {
                    tool: tool.name.clone(),
                    reason: "duplicate tool name".to_string(),
                });
            }
        }

        Ok(())
    }

    /// @ai:intent Starter configuration written by `llmfuzz init`
    /// @ai:effects pure
    pub fn example() -> Self {
        Self {
            tools: vec![
                ToolSpec {
                    args: vec![
                        "-V".to_string(),
                        "60".to_string(),
                        "-i".to_string(),
                        "{input_dir}".to_string(),
                        "-o".to_string(),
                        "{output}".to_string(),
                        "--".to_string(),
                        "./target_harness".to_string(),
                    ],
                    timeout_secs: 120,
                    report_file: Some("{output}/default/fuzzer_stats".to_string()),
                    parser: ParserKind::AflStats {
                        executions: ExecutionCountSource::Reported,
                    },
                    ..ToolSpec::new("afl", "afl-fuzz")
                },
                ToolSpec {
                    args: vec![
                        "--json".to_string(),
                        "--config".to_string(),
                        "auto".to_string(),
                        "{input}".to_string(),
                    ],
                    findings_exit_codes: vec![1],
                    parser: ParserKind::JsonAlerts,
                    ..ToolSpec::new("semgrep", "semgrep")
                },
                ToolSpec {
                    args: vec!["./replay_requests.sh".to_string(), "{input}".to_string()],
                    parser: ParserKind::DosLog,
                    ..ToolSpec::new("dos", "bash")
                },
            ],
            ..Default::default()
        }
    }
}
