//! @ai:module:intent Markdown report generation
//! @ai:module:layer infrastructure
//! @ai:module:public_api MarkdownReporter
//! @ai:module:stateless true

use crate::metrics::ComparisonTable;
use crate::pipeline::RunSummary;
use crate::storage::atomic_write;
use anyhow::Result;
use std::fmt::{self, Write as FmtWrite};
use std::path::Path;

/// @ai:intent Trait for Markdown report generation
pub trait MarkdownReporterTrait: Send + Sync {
    /// @ai:intent Generate Markdown report from a run summary
    fn generate(&self, summary: &RunSummary, output_path: &Path) -> Result<()>;
}

/// @ai:intent Renders one table per grouping plus stage and failure sections
pub struct MarkdownReporter;

impl MarkdownReporter {
    /// @ai:intent Create a new Markdown reporter
    /// @ai:effects pure
    pub fn new() -> Self {
        Self
    }

    /// @ai:intent Whole numbers without decimals, everything else to two places
    /// @ai:effects pure
    fn format_value(value: f64) -> String {
        if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{:.0}", value)
        } else {
            format!("{:.2}", value)
        }
    }

    /// @ai:effects pure
    fn cell(text: &str) -> String {
        text.replace('|', "\\|").replace('\n', " ")
    }

    fn write_header(out: &mut String, summary: &RunSummary) -> fmt::Result {
        writeln!(out, "# LLM Fuzzing Run Report")?;
        writeln!(out)?;
        writeln!(out, "**Started:** {}", summary.started_at.to_rfc3339())?;
        if let Some(finished) = summary.finished_at {
            writeln!(out, "**Finished:** {}", finished.to_rfc3339())?;
        }
        writeln!(out, "**Model:** {}", summary.model)?;
        if summary.dry_run {
            writeln!(out, "**Mode:** dry run")?;
        }
        writeln!(out, "**Metric records:** {}", summary.record_count)?;
        writeln!(out)?;
        Ok(())
    }

    fn write_stages(out: &mut String, summary: &RunSummary) -> fmt::Result {
        writeln!(out, "## Stages")?;
        writeln!(out)?;
        writeln!(out, "| Stage | Status | Items | Failures | Duration |")?;
        writeln!(out, "|-------|--------|-------|----------|----------|")?;

        for stage in &summary.stages {
            writeln!(
                out,
                "| {} | {} | {} | {} | {:.1}s |",
                stage.stage,
                stage.status,
                stage.items,
                stage.failures,
                stage.duration_ms as f64 / 1000.0
            )?;
        }

        writeln!(out)?;
        Ok(())
    }

    fn write_table(out: &mut String, table: &ComparisonTable) -> fmt::Result {
        writeln!(out, "## Comparison by {}", table.group_by)?;
        writeln!(out)?;

        if table.is_empty() {
            writeln!(out, "_No metric records._")?;
            writeln!(out)?;
            return Ok(());
        }

        writeln!(out, "| {} | Metric | Aggregation | Value | Samples |", capitalize(table.group_by.as_str()))?;
        writeln!(out, "|-------|--------|-------------|-------|---------|")?;

        for row in &table.rows {
            writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                Self::cell(&row.group),
                Self::cell(&row.metric),
                row.aggregation,
                Self::format_value(row.value),
                row.samples
            )?;
        }

        writeln!(out)?;
        Ok(())
    }

    fn write_normalization(out: &mut String, summary: &RunSummary) -> fmt::Result {
        if summary.normalize.is_empty() {
            return Ok(());
        }

        writeln!(out, "## Normalization")?;
        writeln!(out)?;
        writeln!(out, "| Tool | Invocations | Records | Skipped | Failed Invocations |")?;
        writeln!(out, "|------|-------------|---------|---------|--------------------|")?;

        for (tool, stats) in &summary.normalize {
            writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                Self::cell(tool),
                stats.invocations,
                stats.records,
                stats.skipped,
                stats.failed_invocations
            )?;
        }

        writeln!(out)?;
        Ok(())
    }

    fn write_failures(out: &mut String, summary: &RunSummary) -> fmt::Result {
        writeln!(out, "## Failures")?;
        writeln!(out)?;

        if summary.failures.is_empty() {
            writeln!(out, "No failures recorded.")?;
            return Ok(());
        }

        if summary.ignore_failures {
            writeln!(out, "_Failures were ignored for the exit status._")?;
            writeln!(out)?;
        }

        writeln!(out, "| Id | Stage | Tool | Kind | Reason |")?;
        writeln!(out, "|----|-------|------|------|--------|")?;

        for (id, failures) in summary.failures_by_id() {
            for failure in failures {
                writeln!(
                    out,
                    "| {} | {} | {} | {} | {} |",
                    Self::cell(id),
                    failure.stage,
                    failure.tool.as_deref().map(Self::cell).unwrap_or_else(|| "-".to_string()),
                    Self::cell(&failure.kind),
                    Self::cell(&failure.reason)
                )?;
            }
        }

        Ok(())
    }

    /// @ai:intent Render the full report
    /// @ai:effects pure
    pub fn render(&self, summary: &RunSummary) -> Result<String> {
        let mut out = String::new();

        Self::write_header(&mut out, summary)?;
        Self::write_stages(&mut out, summary)?;
        for table in &summary.tables {
            Self::write_table(&mut out, table)?;
        }
        Self::write_normalization(&mut out, summary)?;
        Self::write_failures(&mut out, summary)?;

        Ok(out)
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Default for MarkdownReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownReporterTrait for MarkdownReporter {
    /// @ai:intent Generate Markdown report to file
    /// @ai:effects fs:write
    fn generate(&self, summary: &RunSummary, output_path: &Path) -> Result<()> {
        let content = self.render(summary)?;
        atomic_write(output_path, content.as_bytes())
    }
}
