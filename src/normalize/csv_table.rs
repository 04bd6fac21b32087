//! @ai:module:intent Normalize label-plus-numeric-columns CSV tables
//! @ai:module:layer application
//! @ai:module:public_api CsvTableParser
//! @ai:module:stateless true

use crate::error::ParseError;
use crate::metrics::{MetricRecord, Severity};
use crate::normalize::{
    crashes_per_100, parse_value, ExecutionCountSource, OutputParser, ParseInput, ParseOutcome,
};
use crate::report::csv;

/// @ai:intent First column labels the row; a `Tool` label names the tool, any other names the target
pub struct CsvTableParser {
    executions: ExecutionCountSource,
}

struct Header {
    names: Vec<String>,
    label_is_tool: bool,
    severity: Option<usize>,
    crashes: Option<usize>,
    executions: Option<usize>,
    has_rate: bool,
}

impl Header {
    fn new(names: Vec<String>) -> Self {
        let find = |wanted: &str| {
            names
                .iter()
                .skip(1)
                .position(|n| n.eq_ignore_ascii_case(wanted))
                .map(|i| i + 1)
        };

        Self {
            label_is_tool: names[0].eq_ignore_ascii_case("tool"),
            severity: find("Severity"),
            crashes: find("Crashes"),
            executions: find("Executions"),
            has_rate: find("CrashesPer100").is_some(),
            names,
        }
    }
}

impl CsvTableParser {
    pub fn new(executions: ExecutionCountSource) -> Self {
        Self { executions }
    }

    /// @ai:intent Validate one data row into (label, severity, [(metric, value)])
    /// @ai:effects pure
    fn parse_row(
        header: &Header,
        fields: &[String],
    ) -> Result<(String, Option<Severity>, Vec<(usize, f64)>), String> {
        if fields.len() != header.names.len() {
            return Err(format!(
                "expected {} fields, found {}",
                header.names.len(),
                fields.len()
            ));
        }

        let label = fields[0].trim();
        if label.is_empty() {
            return Err("empty row label".to_string());
        }

        let severity = match header.severity {
            Some(idx) if !fields[idx].trim().is_empty() => Some(
                Severity::from_label(&fields[idx])
                    .ok_or_else(|| format!("unknown severity '{}'", fields[idx].trim()))?,
            ),
            _ => None,
        };

        let mut values = Vec::with_capacity(fields.len());
        for (idx, raw) in fields.iter().enumerate().skip(1) {
            if Some(idx) == header.severity || raw.trim().is_empty() {
                continue;
            }

            let value = parse_value(raw).ok_or_else(|| {
                format!("{} is not a finite number: '{}'", header.names[idx], raw.trim())
            })?;
            values.push((idx, value));
        }

        Ok((label.to_string(), severity, values))
    }
}

impl OutputParser for CsvTableParser {
    fn parse(&self, input: &ParseInput<'_>) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let mut lines = input
            .raw
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());

        let Some((header_idx, header_line)) = lines.next() else {
            return outcome;
        };

        let header = match csv::parse_line(header_line) {
            Ok(names) => Header::new(names.into_iter().map(|n| n.trim().to_string()).collect()),
            Err(reason) => {
                outcome.skip(ParseError::new(header_idx + 1, format!("bad header: {reason}")));
                return outcome;
            }
        };

        for (idx, line) in lines {
            let line_no = idx + 1;
            let parsed = csv::parse_line(line).and_then(|fields| Self::parse_row(&header, &fields));

            let (label, severity, values) = match parsed {
                Ok(row) => row,
                Err(reason) => {
                    outcome.skip(ParseError::new(line_no, reason));
                    continue;
                }
            };

            let (tool_name, target) = if header.label_is_tool {
                (label.as_str(), input.artifact_id)
            } else {
                (input.tool_name, label.as_str())
            };

            let record = |metric: &str, value: f64| {
                MetricRecord::new(tool_name, target, metric, value, input.artifact_id)
                    .with_severity(severity)
            };

            for &(col, value) in &values {
                outcome.records.push(record(&header.names[col], value));
            }

            if header.has_rate {
                continue;
            }

            let crashes = header
                .crashes
                .and_then(|c| values.iter().find(|(i, _)| *i == c).map(|(_, v)| *v));
            let executions = match self.executions {
                ExecutionCountSource::Reported => header
                    .executions
                    .and_then(|e| values.iter().find(|(i, _)| *i == e).map(|(_, v)| *v)),
                ExecutionCountSource::Fixed(n) => Some(n as f64),
            };

            if let Some(rate) = crashes
                .zip(executions)
                .and_then(|(c, e)| crashes_per_100(c, e))
            {
                outcome.records.push(record("CrashesPer100", rate));
            }
        }

        outcome
    }

    fn format(&self) -> &'static str {
        "csv_table"
    }
}
