//! @ai:module:intent Turn catalog prompts into persisted artifacts
//! @ai:module:layer application
//! @ai:module:public_api InputGenerator, GenerationReport
//! @ai:module:stateless false

use crate::cancel::CancelToken;
use crate::catalog::{PromptCatalog, TestCase};
use crate::config::{RetryPolicy, RunConfig};
use crate::error::{ConfigurationError, GenerationError};
use crate::generation::client::TextGenerator;
use crate::storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// @ai:intent One persisted completion, traceable to exactly one test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub test_case_id: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// @ai:intent Outcome of one generation pass over a catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationReport {
    pub model: String,
    /// Successful ids and the artifact each one produced
    pub artifacts: BTreeMap<String, GeneratedArtifact>,
    pub failures: BTreeMap<String, GenerationError>,
    /// Artifacts removed because their id left the catalog
    #[serde(default)]
    pub pruned: Vec<PathBuf>,
}

impl GenerationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.artifacts.len() + self.failures.len()
    }

    /// @ai:intent Artifact files in id order
    /// @ai:effects pure
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        self.artifacts.values().map(|a| a.path.clone()).collect()
    }
}

/// @ai:intent Bounded-concurrency driver around a TextGenerator
pub struct InputGenerator<G: TextGenerator> {
    generator: Arc<G>,
    concurrency: usize,
    retry: RetryPolicy,
    keep_stale: bool,
    cancel: CancelToken,
}

impl<G: TextGenerator> InputGenerator<G> {
    /// @ai:intent Create a generator with the run's pool size and retry policy
    /// @ai:effects pure
    pub fn new(generator: Arc<G>, run: &RunConfig) -> Self {
        Self {
            generator,
            concurrency: run.concurrency.max(1),
            retry: run.retry.clone(),
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

    /// @ai:intent Generate one artifact per catalog entry into `output_dir`
    /// @ai:post every catalog id appears in exactly one of artifacts/failures
    /// @ai:post `output_dir` holds `<id>.txt` only for successful ids (unless keep_stale)
    /// @ai:effects network, fs:write
    pub async fn generate(
        &self,
        model: &str,
        catalog: &PromptCatalog,
        output_dir: &Path,
    ) -> Result<GenerationReport, ConfigurationError> {
        std::fs::create_dir_all(output_dir).map_err(|source| ConfigurationError::OutputPath {
            path: output_dir.to_path_buf(),
            source,
        })?;

        tracing::info!(
            "Generating {} artifacts with {} (model={}, concurrency={})",
            catalog.len(),
            self.generator.name(),
            model,
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(catalog.len());
        let mut report = GenerationReport {
            model: model.to_string(),
            ..Default::default()
        };

        for case in catalog.iter() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                report.failures.insert(case.id, GenerationError::Cancelled);
                continue;
            };

            let generator = self.generator.clone();
            let retry = self.retry.clone();
            let cancel = self.cancel.clone();
            let model = model.to_string();
            let path = output_dir.join(format!("{}.txt", case.id));
            let id = case.id.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(GenerationError::Cancelled),
                    result = generate_one(generator.as_ref(), &model, &case, &path, &retry) => result,
                }
            });
            handles.push((id, handle));
        }

        for (id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(GenerationError::Persist(format!("worker failed: {e}"))),
            };

            match outcome {
                Ok(artifact) => {
                    tracing::debug!("Generated {} -> {}", id, artifact.path.display());
                    report.artifacts.insert(id, artifact);
                }
                Err(e) => {
                    tracing::warn!("Generation failed for {}: {}", id, e);
                    report.failures.insert(id, e);
                }
            }
        }

        if !self.keep_stale {
            let keep: HashSet<&str> = report.artifacts.keys().map(String::as_str).collect();
            report.pruned = storage::prune_stale(output_dir, "txt", &keep).map_err(|e| {
                ConfigurationError::OutputPath {
                    path: output_dir.to_path_buf(),
                    source: std::io::Error::other(e.to_string()),
                }
            })?;
        }

        tracing::info!(
            "Generation finished: {} succeeded, {} failed, {} pruned",
            report.artifacts.len(),
            report.failures.len(),
            report.pruned.len()
        );

        Ok(report)
    }
}

/// @ai:intent Request one completion with bounded retries, then persist it atomically
/// @ai:effects network, fs:write, time
async fn generate_one<G: TextGenerator>(
    generator: &G,
    model: &str,
    case: &TestCase,
    path: &Path,
    retry: &RetryPolicy,
) -> Result<GeneratedArtifact, GenerationError> {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;

    let completion = loop {
        match generator.complete(model, &case.prompt).await {
            Ok(completion) if completion.text.trim().is_empty() => {
                return Err(GenerationError::EmptyResponse)
            }
            Ok(completion) => break completion,
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = retry.backoff(attempt);
                tracing::warn!(
                    "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                    attempt,
                    max_attempts,
                    case.id,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    };

    storage::atomic_write(path, completion.text.as_bytes())
        .map_err(|e| GenerationError::Persist(e.to_string()))?;

    Ok(GeneratedArtifact {
        test_case_id: case.id.clone(),
        path: path.to_path_buf(),
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::client::Completion;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fails prompts containing "FAIL", and fails "FLAKY" prompts on their first call.
    struct ScriptedGenerator {
        calls: Mutex<HashMap<String, u32>>,
    }

    impl ScriptedGenerator {
        fn new() -> Self {
            Self {
                calls: Mutex::new(HashMap::new()),
            }
        }

        fn calls_for(&self, prompt: &str) -> u32 {
            self.calls.lock().unwrap().get(prompt).copied().unwrap_or(0)
        }
    }

    impl TextGenerator for ScriptedGenerator {
        async fn complete(&self, _model: &str, prompt: &str) -> Result<Completion, GenerationError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                let count = calls.entry(prompt.to_string()).or_insert(0);
                *count += 1;
                *count
            };

            if prompt.contains("FAIL") {
                return Err(GenerationError::Rejected {
                    status: 400,
                    body: "refused".to_string(),
                });
            }

            if prompt.contains("FLAKY") && call == 1 {
                return Err(GenerationError::RateLimited("slow down".to_string()));
            }

            if prompt.contains("EMPTY") {
                return Ok(Completion {
                    text: "  \n".to_string(),
                    finish_reason: None,
                });
            }

            Ok(Completion {
                text: format!("output for {prompt}"),
                finish_reason: Some("stop".to_string()),
            })
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn run_config() -> RunConfig {
        RunConfig {
            concurrency: 2,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
            },
            ..Default::default()
        }
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_generate_creates_one_file_per_id() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("outputs");
        let catalog = PromptCatalog::from_pairs([("t1", "prompt A"), ("t2", "prompt B")]).unwrap();

        let generator = InputGenerator::new(Arc::new(ScriptedGenerator::new()), &run_config());
        let report = generator.generate("dummy-model", &catalog, &out).await.unwrap();

        assert!(report.is_clean());
        assert_eq!(file_names(&out), vec!["t1.txt", "t2.txt"]);
        assert_eq!(report.artifacts["t2"].test_case_id, "t2");
        assert_eq!(report.artifact_paths(), vec![out.join("t1.txt"), out.join("t2.txt")]);
        assert_eq!(
            std::fs::read_to_string(out.join("t1.txt")).unwrap(),
            "output for prompt A"
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_ids() {
        let temp = TempDir::new().unwrap();
        let catalog = PromptCatalog::from_pairs([
            ("bad", "FAIL please"),
            ("empty", "EMPTY please"),
            ("good", "fine"),
        ])
        .unwrap();

        let generator = InputGenerator::new(Arc::new(ScriptedGenerator::new()), &run_config());
        let report = generator.generate("m", &catalog, temp.path()).await.unwrap();

        assert_eq!(report.attempted(), 3);
        assert_eq!(report.artifacts.len(), 1);
        assert!(report.artifacts.contains_key("good"));
        assert!(matches!(report.failures["bad"], GenerationError::Rejected { .. }));
        assert_eq!(report.failures["empty"], GenerationError::EmptyResponse);
        assert_eq!(file_names(temp.path()), vec!["good.txt"]);
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let temp = TempDir::new().unwrap();
        let catalog = PromptCatalog::from_pairs([("t1", "FLAKY prompt")]).unwrap();
        let scripted = Arc::new(ScriptedGenerator::new());

        let generator = InputGenerator::new(scripted.clone(), &run_config());
        let report = generator.generate("m", &catalog, temp.path()).await.unwrap();

        assert!(report.is_clean());
        assert_eq!(scripted.calls_for("FLAKY prompt"), 2);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let temp = TempDir::new().unwrap();
        let catalog = PromptCatalog::from_pairs([("t1", "FAIL")]).unwrap();
        let scripted = Arc::new(ScriptedGenerator::new());

        let generator = InputGenerator::new(scripted.clone(), &run_config());
        generator.generate("m", &catalog, temp.path()).await.unwrap();

        assert_eq!(scripted.calls_for("FAIL"), 1);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent_and_prunes_removed_ids() {
        let temp = TempDir::new().unwrap();
        let generator = InputGenerator::new(Arc::new(ScriptedGenerator::new()), &run_config());

        let first = PromptCatalog::from_pairs([("t1", "a"), ("t2", "b")]).unwrap();
        generator.generate("m", &first, temp.path()).await.unwrap();
        generator.generate("m", &first, temp.path()).await.unwrap();
        assert_eq!(file_names(temp.path()), vec!["t1.txt", "t2.txt"]);

        let second = PromptCatalog::from_pairs([("t1", "a"), ("t3", "c")]).unwrap();
        let report = generator.generate("m", &second, temp.path()).await.unwrap();
        assert_eq!(file_names(temp.path()), vec!["t1.txt", "t3.txt"]);
        assert_eq!(report.pruned.len(), 1);
    }

    #[tokio::test]
    async fn test_keep_stale_preserves_previous_artifacts() {
        let temp = TempDir::new().unwrap();
        let config = RunConfig {
            keep_stale: true,
            ..run_config()
        };
        let generator = InputGenerator::new(Arc::new(ScriptedGenerator::new()), &config);

        let first = PromptCatalog::from_pairs([("old", "a")]).unwrap();
        generator.generate("m", &first, temp.path()).await.unwrap();
        let second = PromptCatalog::from_pairs([("new", "b")]).unwrap();
        generator.generate("m", &second, temp.path()).await.unwrap();

        assert_eq!(file_names(temp.path()), vec!["new.txt", "old.txt"]);
    }

    #[tokio::test]
    async fn test_cancelled_run_records_every_id() {
        let temp = TempDir::new().unwrap();
        let catalog = PromptCatalog::from_pairs([("t1", "a"), ("t2", "b")]).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let generator =
            InputGenerator::new(Arc::new(ScriptedGenerator::new()), &run_config()).with_cancel(cancel);
        let report = generator.generate("m", &catalog, temp.path()).await.unwrap();

        assert_eq!(report.failures.len(), 2);
        assert!(report
            .failures
            .values()
            .all(|e| *e == GenerationError::Cancelled));
        assert!(file_names(temp.path()).is_empty());
    }
}
