//! @ai:module:intent Parse raw tool output into the common metric schema
//! @ai:module:layer application
//! @ai:module:public_api OutputParser, ParserKind, ParserRegistry, ParseOutcome, ParseInput
//! @ai:module:stateless true

pub mod afl_stats;
pub mod csv_table;
pub mod dos_log;
pub mod json_alerts;
pub mod registry;

use crate::error::ParseError;
use crate::metrics::MetricRecord;
use crate::tools::InvocationOutcome;
use serde::{Deserialize, Serialize};

pub use registry::{NormalizeStats, ParserRegistry};

/// @ai:intent Where the execution count for crash-rate metrics comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionCountSource {
    /// Read from the tool output
    #[default]
    Reported,
    /// Externally tracked count, used when the tool does not report one
    Fixed(u64),
}

/// @ai:intent Which adapter normalizes a tool's output
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ParserKind {
    CsvTable {
        #[serde(default)]
        executions: ExecutionCountSource,
    },
    JsonAlerts,
    DosLog,
    AflStats {
        #[serde(default)]
        executions: ExecutionCountSource,
    },
    /// Findings = 1/0 from the invocation outcome
    #[default]
    ExitStatus,
}

impl ParserKind {
    /// @ai:intent Instantiate the adapter for this format
    /// @ai:effects pure
    pub fn build(&self) -> Box<dyn OutputParser> {
        match self {
            ParserKind::CsvTable { executions } => Box::new(csv_table::CsvTableParser::new(*executions)),
            ParserKind::JsonAlerts => Box::new(json_alerts::JsonAlertsParser),
            ParserKind::DosLog => Box::new(dos_log::DosLogParser::new()),
            ParserKind::AflStats { executions } => Box::new(afl_stats::AflStatsParser::new(*executions)),
            ParserKind::ExitStatus => Box::new(ExitStatusParser),
        }
    }
}

/// @ai:intent Raw output plus the identity it must be traced back to
#[derive(Debug, Clone, Copy)]
pub struct ParseInput<'a> {
    pub tool_name: &'a str,
    pub artifact_id: &'a str,
    pub raw: &'a str,
    pub outcome: InvocationOutcome,
}

impl<'a> ParseInput<'a> {
    /// @ai:intent Input for output known to come from a successful run
    /// @ai:effects pure
    pub fn new(tool_name: &'a str, artifact_id: &'a str, raw: &'a str) -> Self {
        Self {
            tool_name,
            artifact_id,
            raw,
            outcome: InvocationOutcome::SuccessNoFindings,
        }
    }

    /// @ai:effects pure
    pub fn record(&self, target: impl Into<String>, metric: &str, value: f64) -> MetricRecord {
        MetricRecord::new(self.tool_name, target, metric, value, self.artifact_id)
    }
}

/// @ai:intent Records parsed from one output, plus what had to be skipped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    pub records: Vec<MetricRecord>,
    pub skipped: usize,
    pub errors: Vec<ParseError>,
}

impl ParseOutcome {
    /// @ai:intent Count a malformed line and remember why
    /// @ai:effects state:write
    pub fn skip(&mut self, error: ParseError) {
        tracing::trace!("Skipping malformed record: {}", error);
        self.skipped += 1;
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: ParseOutcome) {
        self.records.extend(other.records);
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }
}

/// @ai:intent One output format; never fails as a whole
pub trait OutputParser: Send + Sync {
    /// @ai:post malformed records are counted in `skipped`, never raised
    fn parse(&self, input: &ParseInput<'_>) -> ParseOutcome;

    fn format(&self) -> &'static str;
}

/// @ai:intent Crash rate per hundred executions
/// @ai:post None when there were no executions
/// @ai:effects pure
pub fn crashes_per_100(crashes: f64, executions: f64) -> Option<f64> {
    if executions > 0.0 {
        Some(crashes * 100.0 / executions).filter(|rate| rate.is_finite())
    } else {
        None
    }
}

/// @ai:intent Parse one metric cell; `NaN` and infinities are malformed, not values
/// @ai:effects pure
pub fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Fallback for tools with nothing parseable beyond their exit status
pub struct ExitStatusParser;

impl OutputParser for ExitStatusParser {
    fn parse(&self, input: &ParseInput<'_>) -> ParseOutcome {
        let findings = match input.outcome {
            InvocationOutcome::SuccessWithFindings => 1.0,
            _ => 0.0,
        };

        ParseOutcome {
            records: vec![input.record(input.artifact_id, "Findings", findings)],
            ..Default::default()
        }
    }

    fn format(&self) -> &'static str {
        "exit_status"
    }
}
