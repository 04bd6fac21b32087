//! @ai:module:intent Ordered batch stages from prompts to comparison reports
//! @ai:module:layer application
//! @ai:module:public_api Pipeline, STAGES, StageSpec, FailurePolicy, RunSummary
//! @ai:module:stateless false

pub mod summary;

pub use summary::{FailureEntry, RunSummary, Stage, StageReport, StageStatus};

use crate::cancel::CancelToken;
use crate::catalog::PromptCatalog;
use crate::config::PipelineConfig;
use crate::error::ConfigurationError;
use crate::generation::{InputGenerator, TextGenerator};
use crate::metrics::{aggregate_all, MetricRecord};
use crate::normalize::ParserRegistry;
use crate::report::ReportGenerator;
use crate::storage::{self, RunLayout};
use crate::tools::{ToolInvocation, ToolRunner, ToolchainValidator};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// @ai:intent What a stage's item failures mean for the stages after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record failures and keep going
    Continue,
    /// Stop the pipeline if every attempted item failed
    StopWhenEmpty,
}

#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    pub stage: Stage,
    pub policy: FailurePolicy,
}

/// Stages in execution order
pub const STAGES: [StageSpec; 4] = [
    StageSpec {
        stage: Stage::Generate,
        policy: FailurePolicy::StopWhenEmpty,
    },
    StageSpec {
        stage: Stage::RunTools,
        policy: FailurePolicy::Continue,
    },
    StageSpec {
        stage: Stage::Normalize,
        policy: FailurePolicy::Continue,
    },
    StageSpec {
        stage: Stage::Export,
        policy: FailurePolicy::Continue,
    },
];

/// Items attempted and failed by one stage
#[derive(Debug, Default)]
struct StageCounts {
    items: usize,
    failures: usize,
}

/// Outputs handed from one stage to the next within a single run
#[derive(Default)]
struct StageData {
    artifacts: Option<Vec<PathBuf>>,
    invocations: Option<Vec<ToolInvocation>>,
    records: Option<Vec<MetricRecord>>,
}

/// @ai:intent Runs the selected stages strictly in sequence against one output directory
pub struct Pipeline<G: TextGenerator> {
    config: PipelineConfig,
    generator: Arc<G>,
    layout: RunLayout,
    cancel: CancelToken,
    reports: ReportGenerator,
}

impl<G: TextGenerator> Pipeline<G> {
    /// @ai:intent Validate configuration and output location before any stage runs
    /// @ai:effects fs:write
    pub fn new(config: PipelineConfig, generator: Arc<G>) -> Result<Self, ConfigurationError> {
        config.validate()?;

        let layout = RunLayout::new(&config.paths.output_dir);
        layout
            .ensure_writable()
            .map_err(|source| ConfigurationError::OutputPath {
                path: config.paths.output_dir.clone(),
                source,
            })?;

        Ok(Self {
            config,
            generator,
            layout,
            cancel: CancelToken::new(),
            reports: ReportGenerator::new(),
        })
    }

    /// @ai:intent Attach a run-wide cancellation token (Ctrl-C)
    /// @ai:effects pure
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// @ai:intent Run the selected stages in canonical order
    /// @ai:pre a catalog is supplied when Generate is selected
    /// @ai:pre at least one tool is configured when RunTools is selected
    /// @ai:post summary.json and report.md describe the run
    /// @ai:effects network, process, fs:write
    pub async fn run(
        &self,
        selected: &[Stage],
        catalog: Option<&PromptCatalog>,
    ) -> Result<RunSummary, ConfigurationError> {
        if selected.contains(&Stage::Generate) && catalog.is_none() {
            return Err(ConfigurationError::InvalidCatalog {
                path: self.config.paths.catalog.clone(),
                reason: "no catalog loaded".to_string(),
            });
        }

        if selected.contains(&Stage::RunTools) && self.config.tools.is_empty() {
            return Err(ConfigurationError::InvalidTool {
                tool: "*".to_string(),
                reason: "no tools configured".to_string(),
            });
        }

        let mut summary = RunSummary::new(
            &self.config.api.model,
            self.config.run.dry_run,
            self.config.run.ignore_failures,
        );
        let mut data = StageData::default();
        let mut stopped = false;

        for spec in STAGES.iter().filter(|s| selected.contains(&s.stage)) {
            if stopped || self.cancel.is_cancelled() {
                tracing::info!("Skipping stage {}", spec.stage);
                summary.stages.push(StageReport {
                    stage: spec.stage,
                    status: StageStatus::Skipped,
                    items: 0,
                    failures: 0,
                    duration_ms: 0,
                    error: None,
                });
                continue;
            }

            tracing::info!("Starting stage {}", spec.stage);
            let started = Instant::now();
            let stage_cancel = self.cancel.child();
            if let Some(timeout) = self.config.run.stage_timeout() {
                stage_cancel.cancel_after(timeout);
            }

            let result = match spec.stage {
                Stage::Generate => {
                    self.generate(catalog, &stage_cancel, &mut data, &mut summary)
                        .await
                }
                Stage::RunTools => {
                    self.run_tools(&stage_cancel, &mut data, &mut summary)
                        .await
                }
                Stage::Normalize => self.normalize(&mut data, &mut summary),
                Stage::Export => self.export(&mut data, &mut summary),
            };

            let timed_out = stage_cancel.is_cancelled();
            // Releases the parent-link and timer tasks
            stage_cancel.cancel();

            let report = match result {
                Ok(counts) => {
                    let status = if self.cancel.is_cancelled() {
                        StageStatus::Cancelled
                    } else if counts.failures > 0 || timed_out {
                        StageStatus::CompletedWithFailures
                    } else {
                        StageStatus::Completed
                    };

                    if spec.policy == FailurePolicy::StopWhenEmpty
                        && counts.items > 0
                        && counts.failures == counts.items
                    {
                        tracing::warn!(
                            "Stage {} produced nothing usable, stopping pipeline",
                            spec.stage
                        );
                        stopped = true;
                    }

                    StageReport {
                        stage: spec.stage,
                        status,
                        items: counts.items,
                        failures: counts.failures,
                        duration_ms: started.elapsed().as_millis() as u64,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::error!("Stage {} failed: {:#}", spec.stage, e);
                    stopped = true;

                    StageReport {
                        stage: spec.stage,
                        status: StageStatus::Failed,
                        items: 0,
                        failures: 0,
                        duration_ms: started.elapsed().as_millis() as u64,
                        error: Some(format!("{e:#}")),
                    }
                }
            };

            tracing::info!(
                "Stage {} {} ({} items, {} failures) in {:.1}s",
                report.stage,
                report.status,
                report.items,
                report.failures,
                report.duration_ms as f64 / 1000.0
            );
            summary.stages.push(report);
        }

        summary.finished_at = Some(Utc::now());

        if let Err(e) = self.reports.write_summary(&summary, &self.layout) {
            tracing::error!("Failed to write run summary: {:#}", e);
        }

        Ok(summary)
    }

    /// @ai:intent Stage 1: one artifact per catalog prompt
    /// @ai:effects network, fs:write
    async fn generate(
        &self,
        catalog: Option<&PromptCatalog>,
        cancel: &CancelToken,
        data: &mut StageData,
        summary: &mut RunSummary,
    ) -> anyhow::Result<StageCounts> {
        let catalog = catalog.ok_or_else(|| anyhow::anyhow!("no catalog loaded"))?;

        let generator = InputGenerator::new(self.generator.clone(), &self.config.run)
            .with_cancel(cancel.clone());
        let report = generator
            .generate(&self.config.api.model, catalog, &self.layout.artifacts_dir())
            .await?;

        summary.failures.extend(
            report
                .failures
                .iter()
                .map(|(id, error)| FailureEntry::generation(id, error)),
        );

        let counts = StageCounts {
            items: report.attempted(),
            failures: report.failures.len(),
        };
        data.artifacts = Some(report.artifact_paths());
        Ok(counts)
    }

    /// @ai:intent Stage 2: every tool against every artifact
    /// @ai:effects process, fs:write
    async fn run_tools(
        &self,
        cancel: &CancelToken,
        data: &mut StageData,
        summary: &mut RunSummary,
    ) -> anyhow::Result<StageCounts> {
        let artifacts = match data.artifacts.take() {
            Some(artifacts) => artifacts,
            None => storage::discover_files(&self.layout.artifacts_dir(), "txt")
                .into_iter()
                .map(|(_, path)| path)
                .collect(),
        };

        if artifacts.is_empty() {
            tracing::warn!("No artifacts found in {}", self.layout.artifacts_dir().display());
        }

        let toolchain = ToolchainValidator::validate(&self.config.tools);
        ToolchainValidator::log_warnings(&toolchain);

        let runner = ToolRunner::new(self.layout.clone(), &self.config.run).with_cancel(cancel.clone());
        let invocations = runner.run_all(&self.config.tools, &artifacts).await?;

        let failed: Vec<FailureEntry> = invocations
            .iter()
            .filter(|i| !i.is_success())
            .map(FailureEntry::invocation)
            .collect();

        let counts = StageCounts {
            items: invocations.len(),
            failures: failed.len(),
        };
        summary.failures.extend(failed);
        data.invocations = Some(invocations);
        Ok(counts)
    }

    /// @ai:intent Stage 3: parse invocations into records and persist them
    /// @ai:effects fs:write
    fn normalize(&self, data: &mut StageData, summary: &mut RunSummary) -> anyhow::Result<StageCounts> {
        let invocations = match data.invocations.take() {
            Some(invocations) => invocations,
            None => self.load_invocations(),
        };

        let registry = ParserRegistry::from_tools(&self.config.tools);
        let (outcome, stats) = registry.normalize_all(&invocations);

        tracing::info!(
            "Normalized {} invocations into {} records ({} malformed skipped)",
            invocations.len(),
            outcome.records.len(),
            outcome.skipped
        );

        self.reports.save_records(&outcome.records, &self.layout)?;

        summary.normalize = stats;
        summary.record_count = outcome.records.len();
        data.records = Some(outcome.records);

        Ok(StageCounts {
            items: invocations.len(),
            failures: 0,
        })
    }

    /// @ai:intent Stage 4: comparison tables for every grouping
    /// @ai:effects fs:write
    fn export(&self, data: &mut StageData, summary: &mut RunSummary) -> anyhow::Result<StageCounts> {
        let records = match data.records.take() {
            Some(records) => records,
            None => self.reports.load_records(&self.layout)?,
        };

        let tables = aggregate_all(&records);
        self.reports.export_tables(&tables, &self.layout)?;

        summary.record_count = records.len();
        summary.tables = tables;

        Ok(StageCounts {
            items: records.len(),
            failures: 0,
        })
    }

    /// @ai:intent Read persisted invocations for every configured tool, in tool then id order
    /// @ai:effects fs:read
    fn load_invocations(&self) -> Vec<ToolInvocation> {
        let mut invocations = Vec::new();

        for tool in &self.config.tools {
            for (id, path) in storage::discover_files(&self.layout.invocations_dir(&tool.name), "json") {
                let loaded = std::fs::read(&path)
                    .map_err(anyhow::Error::from)
                    .and_then(|bytes| Ok(serde_json::from_slice::<ToolInvocation>(&bytes)?));

                match loaded {
                    Ok(invocation) => invocations.push(invocation),
                    Err(e) => tracing::warn!("Skipping invocation {}/{}: {:#}", tool.name, id, e),
                }
            }
        }

        tracing::debug!("Loaded {} recorded invocations", invocations.len());
        invocations
    }
}
