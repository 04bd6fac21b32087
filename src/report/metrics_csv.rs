//! @ai:module:intent Fixed-column CSV export and reload of records and comparison tables
//! @ai:module:layer infrastructure
//! @ai:module:public_api save_records, load_records, save_table, load_table
//! @ai:module:stateless true

use crate::metrics::{Aggregation, ComparisonRow, ComparisonTable, GroupBy, MetricRecord, Severity};
use crate::report::csv::{format_line, parse_line};
use crate::storage::atomic_write;
use anyhow::{bail, Context, Result};
use std::path::Path;

pub const RECORD_COLUMNS: [&str; 5] = ["tool", "target", "metric", "value", "severity"];

/// @ai:intent Render records as CSV text, one row per record in input order
/// @ai:effects pure
pub fn records_to_csv(records: &[MetricRecord]) -> Result<String> {
    let mut out = row(RECORD_COLUMNS)?;
    out.push('\n');

    for record in records {
        let value = record.value.to_string();
        let severity = record.severity.map(Severity::as_str).unwrap_or("");
        out.push_str(&row([
            record.tool_name.as_str(),
            record.target.as_str(),
            record.metric_name.as_str(),
            value.as_str(),
            severity,
        ])?);
    }

    Ok(out)
}

/// @ai:effects fs:write
pub fn save_records(path: &Path, records: &[MetricRecord]) -> Result<()> {
    atomic_write(path, records_to_csv(records)?.as_bytes())
}

/// @ai:intent Parse records CSV text back, preserving row order
/// @ai:post artifact_id is empty; the CSV does not carry it
/// @ai:effects pure
pub fn records_from_csv(text: &str) -> Result<Vec<MetricRecord>> {
    let mut rows = data_rows(text, &RECORD_COLUMNS)?;
    let mut records = Vec::new();

    while let Some((line_no, fields)) = rows.next().transpose()? {
        let value = finite(&fields[3])
            .with_context(|| format!("line {line_no}: invalid value '{}'", fields[3]))?;

        let severity = match fields[4].as_str() {
            "" => None,
            s => Some(
                s.parse::<Severity>()
                    .map_err(|e| anyhow::anyhow!("line {line_no}: {e}"))?,
            ),
        };

        let mut fields = fields.into_iter();
        let mut next = || fields.next().unwrap_or_default();
        let (tool_name, target, metric_name) = (next(), next(), next());

        records.push(MetricRecord {
            tool_name,
            target,
            metric_name,
            value,
            severity,
            artifact_id: String::new(),
        });
    }

    Ok(records)
}

/// @ai:effects fs:read
pub fn load_records(path: &Path) -> Result<Vec<MetricRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    records_from_csv(&text).with_context(|| format!("Invalid records CSV {}", path.display()))
}

/// @ai:intent Render a comparison table as CSV text in row order
/// @ai:effects pure
pub fn table_to_csv(table: &ComparisonTable) -> Result<String> {
    let mut out = row(ComparisonTable::COLUMNS)?;
    out.push('\n');

    for table_row in &table.rows {
        let value = table_row.value.to_string();
        let samples = table_row.samples.to_string();
        out.push_str(&row([
            table_row.group.as_str(),
            table_row.metric.as_str(),
            table_row.aggregation.as_str(),
            value.as_str(),
            samples.as_str(),
        ])?);
    }

    Ok(out)
}

/// @ai:effects fs:write
pub fn save_table(path: &Path, table: &ComparisonTable) -> Result<()> {
    atomic_write(path, table_to_csv(table)?.as_bytes())
}

/// @ai:intent Parse comparison-table CSV text back, preserving row order
/// @ai:effects pure
pub fn table_from_csv(text: &str, group_by: GroupBy) -> Result<ComparisonTable> {
    let mut rows = data_rows(text, &ComparisonTable::COLUMNS)?;
    let mut table = ComparisonTable::empty(group_by);

    while let Some((line_no, fields)) = rows.next().transpose()? {
        let aggregation = fields[2]
            .parse::<Aggregation>()
            .map_err(|e| anyhow::anyhow!("line {line_no}: {e}"))?;
        let value = finite(&fields[3])
            .with_context(|| format!("line {line_no}: invalid value '{}'", fields[3]))?;
        let samples: usize = fields[4]
            .parse()
            .with_context(|| format!("line {line_no}: invalid samples '{}'", fields[4]))?;

        let mut fields = fields.into_iter();
        let mut next = || fields.next().unwrap_or_default();
        let (group, metric) = (next(), next());

        table.rows.push(ComparisonRow {
            group,
            metric,
            aggregation,
            value,
            samples,
        });
    }

    Ok(table)
}

/// @ai:effects fs:read
pub fn load_table(path: &Path, group_by: GroupBy) -> Result<ComparisonTable> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    table_from_csv(&text, group_by).with_context(|| format!("Invalid table CSV {}", path.display()))
}

/// @ai:effects pure
fn finite(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// @ai:intent One newline-terminated CSV row
/// @ai:effects pure
fn row<I, S>(fields: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = format_line(fields).map_err(anyhow::Error::msg)?;
    line.push('\n');
    Ok(line)
}

/// @ai:intent Check the header and yield (line number, fields) for each data row
/// @ai:effects pure
fn data_rows<'a>(
    text: &'a str,
    columns: &'a [&'static str],
) -> Result<impl Iterator<Item = Result<(usize, Vec<String>)>> + 'a> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line))
        .filter(|(_, line)| !line.trim().is_empty());

    let header = match lines.next() {
        Some((_, line)) => parse_line(line).map_err(anyhow::Error::msg)?,
        None => bail!("missing header row"),
    };

    if header != columns {
        bail!("expected columns {:?}, found {:?}", columns, header);
    }

    Ok(lines.map(move |(line_no, line)| {
        let fields = parse_line(line).map_err(|e| anyhow::anyhow!("line {line_no}: {e}"))?;
        if fields.len() != columns.len() {
            bail!(
                "line {line_no}: expected {} fields, found {}",
                columns.len(),
                fields.len()
            );
        }
        Ok((line_no, fields))
    }))
}
