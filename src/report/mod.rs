//! @ai:module:intent Export of metric records, comparison tables and run reports
//! @ai:module:layer infrastructure
//! @ai:module:public_api ReportGenerator, JsonReporter, MarkdownReporter

pub mod csv;
pub mod json_report;
pub mod markdown_report;
pub mod metrics_csv;

pub use json_report::{JsonReporter, JsonReporterTrait};
pub use markdown_report::{MarkdownReporter, MarkdownReporterTrait};

use crate::metrics::{ComparisonTable, MetricRecord};
use crate::pipeline::RunSummary;
use crate::storage::RunLayout;
use anyhow::Result;

/// @ai:intent Combined report generator
pub struct ReportGenerator {
    json: JsonReporter,
    markdown: MarkdownReporter,
}

impl ReportGenerator {
    /// @ai:intent Create a new report generator
    /// @ai:effects pure
    pub fn new() -> Self {
        Self {
            json: JsonReporter::new(),
            markdown: MarkdownReporter::new(),
        }
    }

    /// @ai:intent Persist normalized records as fixed-column CSV plus full JSON
    /// @ai:effects fs:write
    pub fn save_records(&self, records: &[MetricRecord], layout: &RunLayout) -> Result<()> {
        metrics_csv::save_records(&layout.records_csv(), records)?;
        self.json.save_records(records, &layout.records_json())?;

        tracing::info!(
            "Saved {} metric records to {}",
            records.len(),
            layout.records_csv().display()
        );
        Ok(())
    }

    /// @ai:intent Write one CSV per comparison table
    /// @ai:effects fs:write
    pub fn export_tables(&self, tables: &[ComparisonTable], layout: &RunLayout) -> Result<()> {
        for table in tables {
            metrics_csv::save_table(&layout.comparison_csv(table.group_by.as_str()), table)?;
        }

        tracing::info!(
            "Exported {} comparison tables to {}",
            tables.len(),
            layout.metrics_dir().display()
        );
        Ok(())
    }

    /// @ai:intent Load the most complete record set available for a run
    /// @ai:post prefers records.json (keeps artifact ids) over records.csv
    /// @ai:effects fs:read
    pub fn load_records(&self, layout: &RunLayout) -> Result<Vec<MetricRecord>> {
        let json = layout.records_json();
        if json.exists() {
            return self.json.load_records(&json);
        }
        metrics_csv::load_records(&layout.records_csv())
    }

    /// @ai:intent Write summary.json and report.md
    /// @ai:effects fs:write
    pub fn write_summary(&self, summary: &RunSummary, layout: &RunLayout) -> Result<()> {
        self.json.generate(summary, &layout.summary_json())?;
        self.markdown.generate(summary, &layout.report_md())?;

        tracing::info!("Reports generated in {}", layout.root().display());
        Ok(())
    }
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new()
    }
}
