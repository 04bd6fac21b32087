//! @ai:module:intent Merge metric records into comparison tables
//! @ai:module:layer application
//! @ai:module:public_api aggregate, aggregate_all, GroupBy, ComparisonTable, ComparisonRow
//! @ai:module:stateless true

use crate::metrics::types::{Aggregation, MetricKind, MetricRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Group label for records without a severity
pub const UNSPECIFIED: &str = "unspecified";

/// @ai:intent Dimension a comparison table is grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Tool,
    Module,
    Severity,
}

impl GroupBy {
    pub const ALL: [GroupBy; 3] = [GroupBy::Tool, GroupBy::Module, GroupBy::Severity];

    pub fn as_str(self) -> &'static str {
        match self {
            GroupBy::Tool => "tool",
            GroupBy::Module => "module",
            GroupBy::Severity => "severity",
        }
    }

    /// @ai:intent Group key of one record under this dimension
    /// @ai:effects pure
    fn key(self, record: &MetricRecord) -> String {
        match self {
            GroupBy::Tool => record.tool_name.clone(),
            GroupBy::Module => record.target.clone(),
            GroupBy::Severity => record
                .severity
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| UNSPECIFIED.to_string()),
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// @ai:intent One aggregated (group, metric) cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub group: String,
    pub metric: String,
    pub aggregation: Aggregation,
    pub value: f64,
    pub samples: usize,
}

/// @ai:intent Derived view over records; always rebuildable from them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonTable {
    pub group_by: GroupBy,
    pub rows: Vec<ComparisonRow>,
}

impl ComparisonTable {
    pub const COLUMNS: [&'static str; 5] = ["group", "metric", "aggregation", "value", "samples"];

    pub fn empty(group_by: GroupBy) -> Self {
        Self {
            group_by,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// @ai:intent Distinct metric names, sorted
    /// @ai:effects pure
    pub fn metrics(&self) -> Vec<&str> {
        let mut metrics: Vec<&str> = self.rows.iter().map(|r| r.metric.as_str()).collect();
        metrics.sort_unstable();
        metrics.dedup();
        metrics
    }

    pub fn get(&self, group: &str, metric: &str) -> Option<&ComparisonRow> {
        self.rows
            .iter()
            .find(|r| r.group == group && r.metric == metric)
    }
}

/// @ai:intent Group records and combine each (group, metric) bucket
/// @ai:post rows ordered by (group, metric) ascending
/// @ai:post counts are summed, rates averaged
/// @ai:effects pure
pub fn aggregate(records: &[MetricRecord], group_by: GroupBy) -> ComparisonTable {
    let mut buckets: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();

    for record in records {
        buckets
            .entry((group_by.key(record), record.metric_name.clone()))
            .or_default()
            .push(record.value);
    }

    let rows = buckets
        .into_iter()
        .map(|((group, metric), values)| {
            let aggregation = MetricKind::for_metric(&metric).aggregation();
            let value = match aggregation {
                Aggregation::Sum => values.iter().sum(),
                Aggregation::Mean => average(values.iter().copied()),
            };

            ComparisonRow {
                group,
                metric,
                aggregation,
                value,
                samples: values.len(),
            }
        })
        .collect();

    ComparisonTable { group_by, rows }
}

/// @ai:intent One table per grouping dimension
/// @ai:effects pure
pub fn aggregate_all(records: &[MetricRecord]) -> Vec<ComparisonTable> {
    GroupBy::ALL
        .iter()
        .map(|&group_by| aggregate(records, group_by))
        .collect()
}

/// @ai:intent Calculate average of an iterator of f64 values
/// @ai:effects pure
fn average<I: Iterator<Item = f64>>(iter: I) -> f64 {
    let (sum, count) = iter.fold((0.0, 0u32), |(s, c), v| (s + v, c + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::types::Severity;
    use pretty_assertions::assert_eq;

    fn record(tool: &str, target: &str, metric: &str, value: f64) -> MetricRecord {
        MetricRecord::new(tool, target, metric, value, "t1")
    }

    #[test]
    fn test_average() {
        let values = vec![10.0, 20.0, 30.0];
        assert!((average(values.into_iter()) - 20.0).abs() < 0.01);
    }

    #[test]
    fn test_average_empty() {
        let values: Vec<f64> = vec![];
        assert!((average(values.into_iter()) - 0.0).abs() < 0.01);
    }

    #[test]
    fn test_counts_sum_and_rates_average() {
        let records = vec![
            record("semgrep", "a.py", "AlertCount", 2.0),
            record("semgrep", "b.py", "AlertCount", 3.0),
            record("afl", "t1", "CrashesPer100", 4.0),
            record("afl", "t2", "CrashesPer100", 6.0),
        ];

        let table = aggregate(&records, GroupBy::Tool);

        assert_eq!(
            table.rows,
            vec![
                ComparisonRow {
                    group: "afl".to_string(),
                    metric: "CrashesPer100".to_string(),
                    aggregation: Aggregation::Mean,
                    value: 5.0,
                    samples: 2,
                },
                ComparisonRow {
                    group: "semgrep".to_string(),
                    metric: "AlertCount".to_string(),
                    aggregation: Aggregation::Sum,
                    value: 5.0,
                    samples: 2,
                },
            ]
        );
    }

    #[test]
    fn test_rows_ordered_by_group_then_metric() {
        let records = vec![
            record("z", "m", "B", 1.0),
            record("a", "m", "B", 1.0),
            record("a", "m", "A", 1.0),
        ];

        let table = aggregate(&records, GroupBy::Tool);
        let keys: Vec<(&str, &str)> = table
            .rows
            .iter()
            .map(|r| (r.group.as_str(), r.metric.as_str()))
            .collect();

        assert_eq!(keys, vec![("a", "A"), ("a", "B"), ("z", "B")]);
    }

    #[test]
    fn test_module_groups_by_target() {
        let records = vec![
            record("semgrep", "auth", "AlertCount", 1.0),
            record("sonar", "auth", "AlertCount", 2.0),
        ];

        let table = aggregate(&records, GroupBy::Module);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].group, "auth");
        assert_eq!(table.rows[0].value, 3.0);
    }

    #[test]
    fn test_missing_severity_is_unspecified() {
        let records = vec![
            record("semgrep", "a", "AlertCount", 1.0).with_severity(Some(Severity::High)),
            record("semgrep", "a", "AlertCount", 1.0),
        ];

        let table = aggregate(&records, GroupBy::Severity);
        let groups: Vec<&str> = table.rows.iter().map(|r| r.group.as_str()).collect();
        assert_eq!(groups, vec!["high", UNSPECIFIED]);
    }

    #[test]
    fn test_empty_input_gives_empty_table() {
        let table = aggregate(&[], GroupBy::Severity);
        assert!(table.is_empty());
        assert_eq!(table.group_by, GroupBy::Severity);
    }

    #[test]
    fn test_aggregate_all_covers_every_grouping() {
        let tables = aggregate_all(&[record("afl", "t1", "Crashes", 1.0)]);
        let groupings: Vec<GroupBy> = tables.iter().map(|t| t.group_by).collect();
        assert_eq!(groupings, GroupBy::ALL.to_vec());
    }
}
