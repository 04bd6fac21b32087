//! @ai:module:intent Record of one tool run against one artifact
//! @ai:module:layer domain
//! @ai:module:public_api ToolInvocation, InvocationOutcome
//! @ai:module:stateless true

use crate::error::ToolExecutionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit status recorded when the process ran out of time
pub const EXIT_TIMEOUT: i32 = 124;
/// Exit status recorded when the process could not be executed
pub const EXIT_NOT_EXECUTABLE: i32 = 126;
/// Exit status recorded when the program was not found
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit status recorded when the run was cancelled
pub const EXIT_CANCELLED: i32 = 130;

/// @ai:intent Classification of how an invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationOutcome {
    SuccessWithFindings,
    SuccessNoFindings,
    Timeout,
    Crash,
    MalformedInvocation,
    Cancelled,
}

impl InvocationOutcome {
    /// @ai:intent Whether the tool ran to completion and its output is trustworthy
    /// @ai:effects pure
    pub fn is_success(self) -> bool {
        matches!(
            self,
            InvocationOutcome::SuccessWithFindings | InvocationOutcome::SuccessNoFindings
        )
    }
}

impl fmt::Display for InvocationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InvocationOutcome::SuccessWithFindings => "success-with-findings",
            InvocationOutcome::SuccessNoFindings => "success-no-findings",
            InvocationOutcome::Timeout => "timeout",
            InvocationOutcome::Crash => "crash",
            InvocationOutcome::MalformedInvocation => "malformed-invocation",
            InvocationOutcome::Cancelled => "cancelled",
        };
        write!(f, "{label}")
    }
}

/// @ai:intent Everything observed while running a tool against one artifact
/// @ai:invariant outcome is success iff error is None
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub target_artifact_id: String,
    /// Stdout, or the report file contents when the tool writes one
    pub raw_output: String,
    #[serde(default)]
    pub stderr: String,
    pub exit_status: i32,
    pub outcome: InvocationOutcome,
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<ToolExecutionError>,
    pub recorded_at: DateTime<Utc>,
}

impl ToolInvocation {
    /// @ai:intent Invocation that never produced process output
    /// @ai:effects pure
    pub fn failed(
        tool_name: &str,
        artifact_id: &str,
        outcome: InvocationOutcome,
        exit_status: i32,
        error: ToolExecutionError,
    ) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            target_artifact_id: artifact_id.to_string(),
            raw_output: String::new(),
            stderr: String::new(),
            exit_status,
            outcome,
            duration_ms: 0,
            error: Some(error),
            recorded_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// @ai:intent Map a finished process's exit code onto an outcome
/// @ai:post SuccessNoFindings for 0, SuccessWithFindings for a declared findings code, Crash otherwise
/// @ai:effects pure
pub fn classify_exit(
    code: i32,
    findings_exit_codes: &[i32],
) -> (InvocationOutcome, Option<ToolExecutionError>) {
    if code == 0 {
        (InvocationOutcome::SuccessNoFindings, None)
    } else if findings_exit_codes.contains(&code) {
        (InvocationOutcome::SuccessWithFindings, None)
    } else {
        (InvocationOutcome::Crash, Some(ToolExecutionError::NonZeroExit(code)))
    }
}
