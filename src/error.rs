//! @ai:module:intent Error taxonomy for every pipeline stage
//! @ai:module:layer domain
//! @ai:module:public_api GenerationError, ToolExecutionError, ParseError, ConfigurationError
//! @ai:module:stateless true

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// @ai:intent Per-item failure while producing an artifact from a prompt
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum GenerationError {
    #[error("generation capability unreachable: {0}")]
    Unreachable(String),

    #[error("rate limited by generation capability: {0}")]
    RateLimited(String),

    #[error("generation request timed out")]
    Timeout,

    #[error("generation request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed completion: {0}")]
    MalformedResponse(String),

    #[error("completion was empty")]
    EmptyResponse,

    #[error("failed to persist artifact: {0}")]
    Persist(String),

    #[error("generation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// @ai:intent Whether another attempt may succeed
    /// @ai:effects pure
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::Unreachable(_) | GenerationError::RateLimited(_) | GenerationError::Timeout
        )
    }
}

/// @ai:intent Per-item failure while running an external tool against an artifact
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ToolExecutionError {
    #[error("executable not found: {0}")]
    MissingExecutable(String),

    #[error("failed to spawn tool: {0}")]
    Spawn(String),

    #[error("tool exited with status {0}")]
    NonZeroExit(i32),

    #[error("tool timed out after {0}s")]
    Timeout(u64),

    #[error("tool killed by signal {0}")]
    Signal(i32),

    #[error("tool invocation cancelled")]
    Cancelled,
}

/// @ai:intent A single record that could not be parsed from raw tool output
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    /// 1-based line (or entry) number in the raw output
    pub line: usize,
    pub reason: String,
}

impl ParseError {
    /// @ai:intent Create a parse error for a line
    /// @ai:effects pure
    pub fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// @ai:intent Fatal error detected before any stage runs
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("invalid catalog {path}: {reason}")]
    InvalidCatalog { path: PathBuf, reason: String },

    #[error("output path {path} is not writable: {source}")]
    OutputPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid tool spec '{tool}': {reason}")]
    InvalidTool { tool: String, reason: String },

    #[error("failed to read config {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("generation capability misconfigured: {0}")]
    Capability(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GenerationError::Timeout.is_transient());
        assert!(GenerationError::RateLimited("429".to_string()).is_transient());
        assert!(!GenerationError::EmptyResponse.is_transient());
        assert!(!GenerationError::Rejected {
            status: 401,
            body: "bad key".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_generation_error_roundtrips_through_json() {
        let err = GenerationError::Rejected {
            status: 400,
            body: "bad".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: GenerationError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
