//! @ai:module:intent Normalized metric schema and aggregation
//! @ai:module:layer domain
//! @ai:module:public_api MetricRecord, Severity, ComparisonTable, aggregate

pub mod aggregator;
pub mod types;

pub use aggregator::{aggregate, aggregate_all, ComparisonRow, ComparisonTable, GroupBy};
pub use types::{Aggregation, MetricKind, MetricRecord, Severity};
