//! @ai:module:intent Per-run record of stages, failures and results
//! @ai:module:layer domain
//! @ai:module:public_api RunSummary, StageReport, StageStatus, FailureEntry, Stage
//! @ai:module:stateless true

use crate::error::{GenerationError, ToolExecutionError};
use crate::metrics::ComparisonTable;
use crate::normalize::NormalizeStats;
use crate::tools::ToolInvocation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// @ai:intent Batch stages, in execution order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Generate,
    RunTools,
    Normalize,
    Export,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Generate, Stage::RunTools, Stage::Normalize, Stage::Export];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Generate => "generate",
            Stage::RunTools => "run-tools",
            Stage::Normalize => "normalize",
            Stage::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// @ai:intent How a stage ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    CompletedWithFailures,
    /// Stage-level error; later stages were not run
    Failed,
    Cancelled,
    /// Not run because an earlier stage stopped the pipeline
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageStatus::Completed => "completed",
            StageStatus::CompletedWithFailures => "completed with failures",
            StageStatus::Failed => "failed",
            StageStatus::Cancelled => "cancelled",
            StageStatus::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    /// Items attempted: prompts, invocations, or records
    pub items: usize,
    pub failures: usize,
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

/// @ai:intent One failed item, attributable to an id and (for tools) a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub stage: Stage,
    pub id: String,
    #[serde(default)]
    pub tool: Option<String>,
    /// Short machine-friendly label such as `timeout` or `rate_limited`
    pub kind: String,
    pub reason: String,
}

impl FailureEntry {
    pub fn generation(id: &str, error: &GenerationError) -> Self {
        let kind = serde_json::to_value(error)
            .ok()
            .and_then(|v| v.get("kind").and_then(|k| k.as_str()).map(str::to_string))
            .unwrap_or_else(|| "generation".to_string());

        Self {
            stage: Stage::Generate,
            id: id.to_string(),
            tool: None,
            kind,
            reason: error.to_string(),
        }
    }

    pub fn invocation(invocation: &ToolInvocation) -> Self {
        let reason = match &invocation.error {
            Some(ToolExecutionError::NonZeroExit(code)) if !invocation.stderr.trim().is_empty() => {
                format!(
                    "tool exited with status {code}: {}",
                    last_line(&invocation.stderr)
                )
            }
            Some(error) => error.to_string(),
            None => invocation.outcome.to_string(),
        };

        Self {
            stage: Stage::RunTools,
            id: invocation.target_artifact_id.clone(),
            tool: Some(invocation.tool_name.clone()),
            kind: invocation.outcome.to_string(),
            reason,
        }
    }
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
}

/// @ai:intent Everything a run did, serialized as summary.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub model: String,
    pub dry_run: bool,
    pub ignore_failures: bool,
    pub stages: Vec<StageReport>,
    pub failures: Vec<FailureEntry>,
    #[serde(default)]
    pub normalize: BTreeMap<String, NormalizeStats>,
    pub record_count: usize,
    #[serde(default)]
    pub tables: Vec<ComparisonTable>,
}

impl RunSummary {
    pub fn new(model: &str, dry_run: bool, ignore_failures: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            model: model.to_string(),
            dry_run,
            ignore_failures,
            stages: Vec::new(),
            failures: Vec::new(),
            normalize: BTreeMap::new(),
            record_count: 0,
            tables: Vec::new(),
        }
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// @ai:intent Any item or stage failure at all, ignored or not
    /// @ai:effects pure
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
            || self.stages.iter().any(|s| {
                matches!(s.status, StageStatus::Failed | StageStatus::Cancelled)
            })
    }

    /// @ai:intent Process exit code: 1 when failures were recorded and not ignored
    /// @ai:effects pure
    pub fn exit_code(&self) -> u8 {
        if self.has_failures() && !self.ignore_failures {
            1
        } else {
            0
        }
    }

    /// @ai:intent Failures grouped by id for reporting
    /// @ai:effects pure
    pub fn failures_by_id(&self) -> BTreeMap<&str, Vec<&FailureEntry>> {
        let mut grouped: BTreeMap<&str, Vec<&FailureEntry>> = BTreeMap::new();
        for failure in &self.failures {
            grouped.entry(failure.id.as_str()).or_default().push(failure);
        }
        grouped
    }
}
