//! @ai:module:intent Run-directory layout and crash-safe file persistence
//! @ai:module:layer infrastructure
//! @ai:module:public_api RunLayout, atomic_write, prune_stale, discover_files
//! @ai:module:stateless true

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// @ai:intent Addresses every file a run produces under one output directory
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    /// @ai:intent Create a layout rooted at the configured output directory
    /// @ai:post root is absolute, so paths stay valid under a tool's working_dir
    /// @ai:effects fs:read
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            root: std::path::absolute(&root).unwrap_or(root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generated inputs: `<root>/artifacts/<id>.txt`
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.artifacts_dir().join(format!("{id}.txt"))
    }

    /// Recorded invocations: `<root>/invocations/<tool>/<id>.json`
    pub fn invocations_dir(&self, tool: &str) -> PathBuf {
        self.root.join("invocations").join(tool)
    }

    pub fn invocation_path(&self, tool: &str, id: &str) -> PathBuf {
        self.invocations_dir(tool).join(format!("{id}.json"))
    }

    /// Scratch space a tool may write reports into: `<root>/work/<tool>/<id>/`
    pub fn work_dir(&self, tool: &str, id: &str) -> PathBuf {
        self.root.join("work").join(tool).join(id)
    }

    pub fn metrics_dir(&self) -> PathBuf {
        self.root.join("metrics")
    }

    pub fn records_csv(&self) -> PathBuf {
        self.metrics_dir().join("records.csv")
    }

    /// Full records including artifact ids, used to rebuild exports
    pub fn records_json(&self) -> PathBuf {
        self.metrics_dir().join("records.json")
    }

    pub fn comparison_csv(&self, group_by: &str) -> PathBuf {
        self.metrics_dir().join(format!("comparison_{group_by}.csv"))
    }

    pub fn summary_json(&self) -> PathBuf {
        self.root.join("summary.json")
    }

    pub fn report_md(&self) -> PathBuf {
        self.root.join("report.md")
    }

    /// @ai:intent Fail fast when the output directory cannot be created
    /// @ai:effects fs:write
    pub fn ensure_writable(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let probe = tempfile::NamedTempFile::new_in(&self.root)?;
        drop(probe);
        Ok(())
    }
}

/// @ai:intent Write a file so readers never observe a partial write
/// @ai:post on success `path` holds exactly `contents`; on failure it is untouched
/// @ai:effects fs:write
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory {}", parent.display()))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    temp.write_all(contents)?;
    temp.flush()?;
    temp.persist(path)
        .with_context(|| format!("Failed to move temp file into {}", path.display()))?;

    Ok(())
}

/// @ai:intent List `<stem>.<extension>` files directly inside a directory, sorted by stem
/// @ai:effects fs:read
pub fn discover_files(dir: &Path, extension: &str) -> Vec<(String, PathBuf)> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut files: Vec<(String, PathBuf)> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == extension)
                .unwrap_or(false)
        })
        .filter_map(|e| {
            let stem = e.path().file_stem()?.to_str()?.to_string();
            Some((stem, e.path().to_path_buf()))
        })
        .collect();

    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

/// @ai:intent Delete `<stem>.<extension>` files whose stem is not in `keep`
/// @ai:effects fs:write
pub fn prune_stale(dir: &Path, extension: &str, keep: &HashSet<&str>) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();

    for (stem, path) in discover_files(dir, extension) {
        if !keep.contains(stem.as_str()) {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stale file {}", path.display()))?;
            tracing::debug!("Pruned stale file {}", path.display());
            removed.push(path);
        }
    }

    Ok(removed)
}
