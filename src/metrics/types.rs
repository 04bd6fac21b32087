//! @ai:module:intent Common metric schema shared by every tool
//! @ai:module:layer domain
//! @ai:module:public_api MetricRecord, Severity, MetricKind, Aggregation
//! @ai:module:stateless true

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// @ai:intent Closed severity scale that tool-native labels map onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// @ai:intent Map a generic label (canonical name, LOW/MEDIUM/HIGH, Sonar names) case-insensitively
    /// @ai:effects pure
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "INFO" | "INFORMATIONAL" => Some(Severity::Info),
            "LOW" | "MINOR" => Some(Severity::Low),
            "MEDIUM" | "MODERATE" | "WARNING" | "MAJOR" => Some(Severity::Medium),
            "HIGH" | "ERROR" => Some(Severity::High),
            "CRITICAL" | "BLOCKER" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// @ai:intent Semgrep INFO/WARNING/ERROR
    /// @ai:effects pure
    pub fn from_semgrep(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "INFO" => Some(Severity::Info),
            "WARNING" => Some(Severity::Medium),
            "ERROR" => Some(Severity::High),
            _ => Self::from_label(label),
        }
    }

    /// @ai:intent SonarQube INFO/MINOR/MAJOR/CRITICAL/BLOCKER
    /// @ai:effects pure
    pub fn from_sonar(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "INFO" => Some(Severity::Info),
            "MINOR" => Some(Severity::Low),
            "MAJOR" => Some(Severity::Medium),
            "CRITICAL" => Some(Severity::High),
            "BLOCKER" => Some(Severity::Critical),
            _ => Self::from_label(label),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// @ai:intent Whether a metric is additive or a ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Count,
    Rate,
}

impl MetricKind {
    /// @ai:intent Classify a metric by its name
    /// @ai:post Rate for *Per100, *Rate*, *Ms, *Mean; Count otherwise
    /// @ai:effects pure
    pub fn for_metric(name: &str) -> Self {
        if name.ends_with("Per100")
            || name.contains("Rate")
            || name.ends_with("Ms")
            || name.ends_with("Mean")
        {
            MetricKind::Rate
        } else {
            MetricKind::Count
        }
    }

    pub fn aggregation(self) -> Aggregation {
        match self {
            MetricKind::Count => Aggregation::Sum,
            MetricKind::Rate => Aggregation::Mean,
        }
    }
}

/// @ai:intent How a comparison row combined its samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Mean,
}

impl Aggregation {
    pub fn as_str(self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(Aggregation::Sum),
            "mean" => Ok(Aggregation::Mean),
            other => Err(format!("unknown aggregation '{other}'")),
        }
    }
}

/// @ai:intent One normalized measurement, traceable to the invocation that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub tool_name: String,
    /// Module, file, or row label the measurement is about
    pub target: String,
    pub metric_name: String,
    pub value: f64,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub artifact_id: String,
}

impl MetricRecord {
    /// @ai:effects pure
    pub fn new(
        tool_name: impl Into<String>,
        target: impl Into<String>,
        metric_name: impl Into<String>,
        value: f64,
        artifact_id: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            target: target.into(),
            metric_name: metric_name.into(),
            value,
            severity: None,
            artifact_id: artifact_id.into(),
        }
    }

    pub fn with_severity(mut self, severity: Option<Severity>) -> Self {
        self.severity = severity;
        self
    }

    pub fn kind(&self) -> MetricKind {
        MetricKind::for_metric(&self.metric_name)
    }
}
