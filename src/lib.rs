//! @ai:module:intent LLM-driven security testing pipeline: prompts to inputs to tool runs to metrics
//! @ai:module:layer application
//! @ai:module:public_api catalog, config, generation, tools, normalize, metrics, report, pipeline

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod generation;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod tools;

pub use cancel::CancelToken;
pub use catalog::{PromptCatalog, TestCase};
pub use config::PipelineConfig;
pub use error::{ConfigurationError, GenerationError, ParseError, ToolExecutionError};
pub use generation::{DryRunGenerator, InputGenerator, OpenAiClient, TextGenerator};
pub use metrics::{aggregate, ComparisonTable, GroupBy, MetricRecord, Severity};
pub use normalize::{OutputParser, ParserKind, ParserRegistry};
pub use pipeline::{Pipeline, RunSummary, Stage};
pub use report::ReportGenerator;
pub use tools::{ToolInvocation, ToolRunner, ToolSpec, ToolchainValidator};
