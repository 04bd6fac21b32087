//! @ai:module:intent Run external tools against artifacts with bounded concurrency
//! @ai:module:layer infrastructure
//! @ai:module:public_api ToolRunner
//! @ai:module:stateless false

use crate::cancel::CancelToken;
use crate::config::RunConfig;
use crate::error::{ConfigurationError, ToolExecutionError};
use crate::storage::{self, RunLayout};
use crate::tools::invocation::{
    classify_exit, InvocationOutcome, ToolInvocation, EXIT_CANCELLED, EXIT_NOT_EXECUTABLE,
    EXIT_NOT_FOUND, EXIT_TIMEOUT,
};
use crate::tools::spec::{InvocationContext, ToolSpec};
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;

/// @ai:intent Drives tool processes and records one invocation per (tool, artifact)
pub struct ToolRunner {
    layout: RunLayout,
    concurrency: usize,
    keep_stale: bool,
    cancel: CancelToken,
}

impl ToolRunner {
    /// @ai:intent Create a runner writing under `layout`
    /// @ai:effects pure
    pub fn new(layout: RunLayout, run: &RunConfig) -> Self {
        Self {
            layout,
            concurrency: run.concurrency.max(1),
            keep_stale: run.keep_stale,
            cancel: CancelToken::new(),
        }
    }

    /// @ai:intent Attach a cancellation token observed by every worker
    /// @ai:effects pure
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// @ai:intent Run every tool against every artifact, one tool at a time
    /// @ai:post len(result) == len(tools) * len(artifacts)
    /// @ai:effects process, fs:write
    pub async fn run_all(
        &self,
        tools: &[ToolSpec],
        artifacts: &[PathBuf],
    ) -> Result<Vec<ToolInvocation>, ConfigurationError> {
        let mut invocations = Vec::with_capacity(tools.len() * artifacts.len());
        for spec in tools {
            invocations.extend(self.run(spec, artifacts).await?);
        }
        Ok(invocations)
    }

    /// @ai:intent Run one tool against each artifact
    /// @ai:pre spec passes validation
    /// @ai:post exactly one invocation per artifact, ordered by artifact id
    /// @ai:post each invocation is persisted under invocations/<tool>/<id>.json
    /// @ai:effects process, fs:write
    pub async fn run(
        &self,
        spec: &ToolSpec,
        artifacts: &[PathBuf],
    ) -> Result<Vec<ToolInvocation>, ConfigurationError> {
        spec.validate()?;

        let invocations_dir = self.layout.invocations_dir(&spec.name);
        std::fs::create_dir_all(&invocations_dir).map_err(|source| {
            ConfigurationError::OutputPath {
                path: invocations_dir.clone(),
                source,
            }
        })?;

        let mut targets: Vec<(String, PathBuf)> = artifacts
            .iter()
            .map(|path| (artifact_id(path), path.clone()))
            .collect();
        targets.sort();

        tracing::info!(
            "Running {} against {} artifacts (concurrency={}, timeout={}s)",
            spec.name,
            targets.len(),
            self.concurrency,
            spec.timeout_secs
        );

        let spec = Arc::new(spec.clone());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(targets.len());
        let mut invocations = Vec::with_capacity(targets.len());

        for (id, path) in targets {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                handles.push((id.clone(), None));
                continue;
            };

            let spec = spec.clone();
            let cancel = self.cancel.clone();
            let work_dir = self.layout.work_dir(&spec.name, &id);
            let task_id = id.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                invoke_one(&spec, &task_id, &path, &work_dir, &cancel).await
            });
            handles.push((id, Some(handle)));
        }

        for (id, handle) in handles {
            let invocation = match handle {
                Some(handle) => match handle.await {
                    Ok(invocation) => invocation,
                    Err(e) => ToolInvocation::failed(
                        &spec.name,
                        &id,
                        InvocationOutcome::MalformedInvocation,
                        EXIT_NOT_EXECUTABLE,
                        ToolExecutionError::Spawn(format!("worker failed: {e}")),
                    ),
                },
                None => ToolInvocation::failed(
                    &spec.name,
                    &id,
                    InvocationOutcome::Cancelled,
                    EXIT_CANCELLED,
                    ToolExecutionError::Cancelled,
                ),
            };

            if invocation.is_success() {
                tracing::debug!("{} on {}: {}", spec.name, id, invocation.outcome);
            } else {
                tracing::warn!(
                    "{} on {}: {} (exit {})",
                    spec.name,
                    id,
                    invocation.outcome,
                    invocation.exit_status
                );
            }

            self.persist(&invocation);
            invocations.push(invocation);
        }

        if !self.keep_stale {
            let keep: HashSet<&str> = invocations
                .iter()
                .map(|i| i.target_artifact_id.as_str())
                .collect();
            match storage::prune_stale(&invocations_dir, "json", &keep) {
                Ok(pruned) if !pruned.is_empty() => {
                    tracing::info!("Pruned {} stale {} invocations", pruned.len(), spec.name)
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to prune {}: {:#}", invocations_dir.display(), e),
            }
        }

        Ok(invocations)
    }

    /// @ai:intent Record an invocation on disk; failures are logged, not fatal
    /// @ai:effects fs:write
    fn persist(&self, invocation: &ToolInvocation) {
        let path = self
            .layout
            .invocation_path(&invocation.tool_name, &invocation.target_artifact_id);

        let result = serde_json::to_vec_pretty(invocation)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| storage::atomic_write(&path, &bytes));

        if let Err(e) = result {
            tracing::warn!("Failed to record invocation {}: {:#}", path.display(), e);
        }
    }
}

/// @ai:intent Artifact id is the file stem of its path
/// @ai:effects pure
pub fn artifact_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// @ai:intent Run one process to completion, timeout, or cancellation
/// @ai:post never fails; every failure mode is an outcome
/// @ai:effects process, fs:write, time
async fn invoke_one(
    spec: &ToolSpec,
    id: &str,
    artifact: &Path,
    work_dir: &Path,
    cancel: &CancelToken,
) -> ToolInvocation {
    let started = Instant::now();
    let input_dir = work_dir.join("seeds");

    if let Err(e) = prepare_work_dir(spec, artifact, work_dir, &input_dir) {
        return ToolInvocation::failed(
            &spec.name,
            id,
            InvocationOutcome::MalformedInvocation,
            EXIT_NOT_EXECUTABLE,
            ToolExecutionError::Spawn(format!("failed to prepare {}: {e}", work_dir.display())),
        );
    }

    let ctx = InvocationContext {
        id,
        input: artifact,
        input_dir: &input_dir,
        output: work_dir,
    };

    let mut command = Command::new(&spec.program);
    command
        .args(spec.render_args(&ctx))
        .stdin(if spec.stdin { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return spawn_failure(spec, id, e),
    };

    if let Some(mut stdin) = child.stdin.take() {
        let path = artifact.to_path_buf();
        // Feed stdin concurrently so a chatty tool cannot deadlock on a full stdout pipe
        tokio::spawn(async move {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    if let Err(e) = stdin.write_all(&bytes).await {
                        tracing::debug!("stdin closed early for {}: {}", path.display(), e);
                    }
                }
                Err(e) => tracing::warn!("Failed to read {}: {}", path.display(), e),
            }
        });
    }

    // Dropping the wait future drops the child, and kill_on_drop reaps it
    let waited = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = tokio::time::timeout(spec.timeout(), child.wait_with_output()) => Some(result),
    };

    let duration_ms = started.elapsed().as_millis() as u64;

    let output = match waited {
        None => {
            return ToolInvocation {
                duration_ms,
                ..ToolInvocation::failed(
                    &spec.name,
                    id,
                    InvocationOutcome::Cancelled,
                    EXIT_CANCELLED,
                    ToolExecutionError::Cancelled,
                )
            }
        }
        Some(Err(_elapsed)) => {
            return ToolInvocation {
                duration_ms,
                ..ToolInvocation::failed(
                    &spec.name,
                    id,
                    InvocationOutcome::Timeout,
                    EXIT_TIMEOUT,
                    ToolExecutionError::Timeout(spec.timeout_secs),
                )
            }
        }
        Some(Ok(Err(e))) => {
            return ToolInvocation {
                duration_ms,
                ..ToolInvocation::failed(
                    &spec.name,
                    id,
                    InvocationOutcome::MalformedInvocation,
                    EXIT_NOT_EXECUTABLE,
                    ToolExecutionError::Spawn(e.to_string()),
                )
            }
        }
        Some(Ok(Ok(output))) => output,
    };

    let (exit_status, outcome, error) = classify_status(&output.status, &spec.findings_exit_codes);
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

    let raw_output = match spec.render_report_file(&ctx) {
        Some(report) => match std::fs::read(&report) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::warn!(
                    "{} on {}: report {} unreadable ({}), using stdout",
                    spec.name,
                    id,
                    report.display(),
                    e
                );
                stdout
            }
        },
        None => stdout,
    };

    ToolInvocation {
        tool_name: spec.name.clone(),
        target_artifact_id: id.to_string(),
        raw_output,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_status,
        outcome,
        duration_ms,
        error,
        recorded_at: Utc::now(),
    }
}

/// @ai:intent Give each invocation a fresh scratch dir, plus a seed dir when templated
/// @ai:effects fs:write
fn prepare_work_dir(
    spec: &ToolSpec,
    artifact: &Path,
    work_dir: &Path,
    input_dir: &Path,
) -> std::io::Result<()> {
    if work_dir.exists() {
        std::fs::remove_dir_all(work_dir)?;
    }
    std::fs::create_dir_all(work_dir)?;

    if spec.needs_input_dir() {
        std::fs::create_dir_all(input_dir)?;
        let name = artifact.file_name().unwrap_or(artifact.as_os_str());
        std::fs::copy(artifact, input_dir.join(name))?;
    }

    Ok(())
}

/// @ai:effects pure
fn spawn_failure(spec: &ToolSpec, id: &str, error: std::io::Error) -> ToolInvocation {
    let (exit_status, error) = if error.kind() == std::io::ErrorKind::NotFound {
        (
            EXIT_NOT_FOUND,
            ToolExecutionError::MissingExecutable(spec.program.clone()),
        )
    } else {
        (EXIT_NOT_EXECUTABLE, ToolExecutionError::Spawn(error.to_string()))
    };

    ToolInvocation::failed(
        &spec.name,
        id,
        InvocationOutcome::MalformedInvocation,
        exit_status,
        error,
    )
}

/// @ai:intent Exit code (128+signal when killed) with its outcome
/// @ai:effects pure
fn classify_status(
    status: &ExitStatus,
    findings_exit_codes: &[i32],
) -> (i32, InvocationOutcome, Option<ToolExecutionError>) {
    match status.code() {
        Some(code) => {
            let (outcome, error) = classify_exit(code, findings_exit_codes);
            (code, outcome, error)
        }
        None => {
            let signal = terminating_signal(status).unwrap_or(0);
            (
                128 + signal,
                InvocationOutcome::Crash,
                Some(ToolExecutionError::Signal(signal)),
            )
        }
    }
}

#[cfg(unix)]
fn terminating_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn terminating_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
