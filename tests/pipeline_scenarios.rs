//! End-to-end runs of the pipeline with the offline generator and shell tools.
#![cfg(unix)]

use llmfuzz::config::PipelineConfig;
use llmfuzz::generation::DryRunGenerator;
use llmfuzz::metrics::GroupBy;
use llmfuzz::normalize::{ExecutionCountSource, ParserKind};
use llmfuzz::pipeline::{Pipeline, Stage, StageStatus};
use llmfuzz::report::metrics_csv;
use llmfuzz::tools::{InvocationOutcome, ToolInvocation, ToolSpec};
use llmfuzz::PromptCatalog;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn catalog() -> PromptCatalog {
    PromptCatalog::from_pairs([
        ("t1", "Generate malformed JSON"),
        ("t2", "Generate an oversized header"),
    ])
    .unwrap()
}

fn crash_table_tool() -> ToolSpec {
    ToolSpec {
        args: vec![
            "-c".to_string(),
            "printf 'Tool,CrashesPer100\\nAFL,5.1\\nLLM,7.4\\n'".to_string(),
            "{input}".to_string(),
        ],
        parser: ParserKind::CsvTable {
            executions: ExecutionCountSource::Reported,
        },
        ..ToolSpec::new("compare", "sh")
    }
}

fn missing_tool() -> ToolSpec {
    ToolSpec::new("ghost", "llmfuzz-no-such-binary")
}

fn config(output: &Path, tools: Vec<ToolSpec>) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.paths.output_dir = output.to_path_buf();
    config.run.dry_run = true;
    config.run.concurrency = 2;
    config.tools = tools;
    config
}

fn read_invocation(path: &Path) -> ToolInvocation {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn full_run_produces_artifacts_records_and_tables() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp.path().join("out"), vec![crash_table_tool()]);
    let pipeline = Pipeline::new(config, Arc::new(DryRunGenerator)).unwrap();

    let summary = pipeline.run(&Stage::ALL, Some(&catalog())).await.unwrap();
    let layout = pipeline.layout();

    assert!(layout.artifact_path("t1").exists());
    assert!(layout.artifact_path("t2").exists());
    assert!(std::fs::read_to_string(layout.artifact_path("t1"))
        .unwrap()
        .contains("Generate malformed JSON"));

    for stage in &summary.stages {
        assert_eq!(stage.status, StageStatus::Completed, "stage {}", stage.stage);
    }
    assert_eq!(summary.record_count, 4);
    assert_eq!(summary.exit_code(), 0);

    let by_tool = summary
        .tables
        .iter()
        .find(|t| t.group_by == GroupBy::Tool)
        .unwrap();
    assert_eq!(by_tool.get("AFL", "CrashesPer100").unwrap().value, 5.1);
    assert_eq!(by_tool.get("LLM", "CrashesPer100").unwrap().value, 7.4);
    assert_eq!(by_tool.get("LLM", "CrashesPer100").unwrap().samples, 2);

    let reloaded = metrics_csv::load_table(&layout.comparison_csv("tool"), GroupBy::Tool).unwrap();
    assert_eq!(&reloaded, by_tool);

    assert!(layout.summary_json().exists());
    let report = std::fs::read_to_string(layout.report_md()).unwrap();
    assert!(report.contains("## Comparison by tool"));
}

#[tokio::test]
async fn missing_executable_is_recorded_without_aborting() {
    let temp = TempDir::new().unwrap();
    let mut config = config(
        &temp.path().join("out"),
        vec![crash_table_tool(), missing_tool()],
    );
    let pipeline = Pipeline::new(config.clone(), Arc::new(DryRunGenerator)).unwrap();

    let summary = pipeline.run(&Stage::ALL, Some(&catalog())).await.unwrap();
    let layout = pipeline.layout();

    let run_tools = summary.stage(Stage::RunTools).unwrap();
    assert_eq!(run_tools.items, 4);
    assert_eq!(run_tools.failures, 2);
    assert_eq!(run_tools.status, StageStatus::CompletedWithFailures);

    let ghost = read_invocation(&layout.invocation_path("ghost", "t1"));
    assert_eq!(ghost.outcome, InvocationOutcome::MalformedInvocation);
    assert_eq!(ghost.exit_status, 127);

    // The working tool still produced its records
    assert_eq!(summary.record_count, 4);
    assert_eq!(summary.normalize["ghost"].failed_invocations, 2);
    assert_eq!(summary.exit_code(), 1);
    assert!(summary
        .failures
        .iter()
        .all(|f| f.tool.as_deref() == Some("ghost")));

    config.run.ignore_failures = true;
    let pipeline = Pipeline::new(config, Arc::new(DryRunGenerator)).unwrap();
    let summary = pipeline.run(&Stage::ALL, Some(&catalog())).await.unwrap();
    assert!(summary.has_failures());
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn rerun_overwrites_instead_of_duplicating() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp.path().join("out"), vec![crash_table_tool()]);
    let pipeline = Pipeline::new(config, Arc::new(DryRunGenerator)).unwrap();

    let first = pipeline.run(&Stage::ALL, Some(&catalog())).await.unwrap();
    let second = pipeline.run(&Stage::ALL, Some(&catalog())).await.unwrap();

    assert_eq!(first.record_count, second.record_count);
    assert_eq!(first.tables, second.tables);

    let artifacts = std::fs::read_dir(pipeline.layout().artifacts_dir()).unwrap().count();
    assert_eq!(artifacts, 2);
    let invocations = std::fs::read_dir(pipeline.layout().invocations_dir("compare"))
        .unwrap()
        .count();
    assert_eq!(invocations, 2);
}

#[tokio::test]
async fn stages_resume_from_disk() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp.path().join("out"), vec![crash_table_tool()]);
    let pipeline = Pipeline::new(config, Arc::new(DryRunGenerator)).unwrap();

    pipeline
        .run(&[Stage::Generate], Some(&catalog()))
        .await
        .unwrap();
    pipeline.run(&[Stage::RunTools], None).await.unwrap();
    pipeline.run(&[Stage::Normalize], None).await.unwrap();
    let summary = pipeline.run(&[Stage::Export], None).await.unwrap();

    assert_eq!(summary.stages.len(), 1);
    assert_eq!(summary.record_count, 4);

    let records = metrics_csv::load_records(&pipeline.layout().records_csv()).unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().any(|r| r.tool_name == "AFL" && r.value == 5.1));
}

#[tokio::test]
async fn configuration_errors_stop_before_any_stage() {
    let temp = TempDir::new().unwrap();
    let pipeline = Pipeline::new(
        config(&temp.path().join("out"), Vec::new()),
        Arc::new(DryRunGenerator),
    )
    .unwrap();

    assert!(pipeline.run(&[Stage::RunTools], None).await.is_err());
    assert!(pipeline.run(&[Stage::Generate], None).await.is_err());
    assert!(!pipeline.layout().summary_json().exists());

    let mut bad = config(&temp.path().join("out2"), vec![crash_table_tool()]);
    bad.tools.push(crash_table_tool());
    assert!(Pipeline::new(bad, Arc::new(DryRunGenerator)).is_err());
}

#[tokio::test]
async fn stage_timeout_cancels_tools_and_later_stages_still_run() {
    let temp = TempDir::new().unwrap();
    let sleepy = ToolSpec {
        args: vec!["-c".to_string(), "sleep 30".to_string(), "{input}".to_string()],
        timeout_secs: 60,
        ..ToolSpec::new("sleepy", "sh")
    };
    let mut config = config(&temp.path().join("out"), vec![sleepy]);
    config.run.stage_timeout_secs = Some(1);
    let pipeline = Pipeline::new(config, Arc::new(DryRunGenerator)).unwrap();

    let started = std::time::Instant::now();
    let summary = pipeline.run(&Stage::ALL, Some(&catalog())).await.unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(20));

    let run_tools = summary.stage(Stage::RunTools).unwrap();
    assert_eq!(run_tools.status, StageStatus::CompletedWithFailures);
    assert_eq!(run_tools.items, 2);
    assert_eq!(run_tools.failures, 2);

    for id in ["t1", "t2"] {
        let invocation = read_invocation(&pipeline.layout().invocation_path("sleepy", id));
        assert_eq!(invocation.outcome, InvocationOutcome::Cancelled);
        assert_eq!(invocation.exit_status, 130);
    }

    for stage in [Stage::Normalize, Stage::Export] {
        let report = summary.stage(stage).unwrap();
        assert!(
            !matches!(report.status, StageStatus::Skipped | StageStatus::Cancelled),
            "stage {stage} was {}",
            report.status
        );
    }
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn relative_output_dir_survives_tool_working_dir() {
    let cwd = std::env::current_dir().unwrap();
    let temp = TempDir::new_in(&cwd).unwrap();
    let relative = temp.path().strip_prefix(&cwd).unwrap().join("out");
    let tool = ToolSpec {
        working_dir: Some(std::env::temp_dir()),
        ..crash_table_tool()
    };
    let pipeline = Pipeline::new(config(&relative, vec![tool]), Arc::new(DryRunGenerator)).unwrap();

    let summary = pipeline.run(&Stage::ALL, Some(&catalog())).await.unwrap();

    assert!(pipeline.layout().root().is_absolute());
    assert_eq!(summary.stage(Stage::RunTools).unwrap().failures, 0);
    assert_eq!(summary.record_count, 4);
}
