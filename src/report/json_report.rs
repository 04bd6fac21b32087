//! @ai:module:intent JSON summary and record persistence
//! @ai:module:layer infrastructure
//! @ai:module:public_api JsonReporter
//! @ai:module:stateless true

use crate::metrics::MetricRecord;
use crate::pipeline::RunSummary;
use crate::storage::atomic_write;
use anyhow::{Context, Result};
use std::path::Path;

/// @ai:intent Trait for JSON report generation
pub trait JsonReporterTrait: Send + Sync {
    /// @ai:intent Generate JSON summary file
    fn generate(&self, summary: &RunSummary, output_path: &Path) -> Result<()>;
}

/// @ai:intent Writes run summaries and full record sets as pretty JSON
pub struct JsonReporter;

impl JsonReporter {
    /// @ai:intent Create a new JSON reporter
    /// @ai:effects pure
    pub fn new() -> Self {
        Self
    }

    /// @ai:intent Persist records with their artifact ids for later re-export
    /// @ai:effects fs:write
    pub fn save_records(&self, records: &[MetricRecord], output_path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(records)?;
        atomic_write(output_path, &json)
    }

    /// @ai:effects fs:read
    pub fn load_records(&self, path: &Path) -> Result<Vec<MetricRecord>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid records JSON {}", path.display()))
    }

    /// @ai:effects fs:read
    pub fn load_summary(&self, path: &Path) -> Result<RunSummary> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid summary JSON {}", path.display()))
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonReporterTrait for JsonReporter {
    /// @ai:intent Generate JSON summary to file
    /// @ai:effects fs:write
    fn generate(&self, summary: &RunSummary, output_path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(summary)?;
        atomic_write(output_path, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{aggregate, GroupBy};
    use tempfile::TempDir;

    #[test]
    fn test_generate_json_summary() {
        let reporter = JsonReporter::new();
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("summary.json");

        let records = vec![MetricRecord::new("afl", "t1", "Crashes", 2.0, "t1")];
        let mut summary = RunSummary::new("gpt-4o", false, false);
        summary.record_count = records.len();
        summary.tables.push(aggregate(&records, GroupBy::Tool));

        reporter.generate(&summary, &output).unwrap();

        let content = std::fs::read_to_string(&output).unwrap();
        assert!(content.contains("gpt-4o"));
        assert_eq!(reporter.load_summary(&output).unwrap(), summary);
    }

    #[test]
    fn test_records_json_keeps_artifact_ids() {
        let reporter = JsonReporter::new();
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("records.json");
        let records = vec![MetricRecord::new("semgrep", "a.py", "AlertCount", 1.0, "t7")];

        reporter.save_records(&records, &output).unwrap();
        assert_eq!(reporter.load_records(&output).unwrap(), records);
    }
}
