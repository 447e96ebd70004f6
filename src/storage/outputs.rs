//! Atomic persistence of finished job artifacts.
//!
//! Every write goes through a temporary sibling file followed by a rename,
//! so a crash mid-write never leaves a partially written artifact at the
//! final path.

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::PipelineResult;

/// Name of the first flow's final copy.
pub const FINAL_A_FILE: &str = "final_A.md";
/// Name of the second flow's final copy.
pub const FINAL_B_FILE: &str = "final_B.md";
/// Name of the structured result file.
pub const RESULT_FILE: &str = "result.json";

/// Errors raised while persisting job outputs.
#[derive(Error, Debug)]
pub enum OutputError {
    /// Filesystem operation failed.
    #[error("Output write failed for {path}: {source}")]
    Io {
        /// Path being written when the failure occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The result could not be serialized to JSON.
    #[error("Result serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Writes finished job artifacts under a per-job directory.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    base_dir: PathBuf,
}

impl OutputWriter {
    /// Creates a writer rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the output directory for one job.
    pub fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.base_dir.join(job_id.to_string())
    }

    /// Writes a text artifact atomically.
    pub async fn write_text(&self, path: &Path, text: &str) -> Result<(), OutputError> {
        write_atomic(path, text.as_bytes()).await
    }

    /// Serializes a value to pretty JSON and writes it atomically.
    pub async fn write_json<T: serde::Serialize>(
        &self,
        path: &Path,
        value: &T,
    ) -> Result<(), OutputError> {
        let json = serde_json::to_vec_pretty(value)?;
        write_atomic(path, &json).await
    }

    /// Persists both final copies and the structured result for one job.
    ///
    /// The job directory is created on demand. Each file lands atomically;
    /// on error, already renamed files remain but no file is ever partial.
    pub async fn persist(&self, result: &PipelineResult) -> Result<PathBuf, OutputError> {
        let dir = self.job_dir(result.job_id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| OutputError::Io {
            path: dir.clone(),
            source: e,
        })?;

        self.write_text(&dir.join(FINAL_A_FILE), &result.final_a)
            .await?;
        self.write_text(&dir.join(FINAL_B_FILE), &result.final_b)
            .await?;
        self.write_json(&dir.join(RESULT_FILE), result).await?;

        tracing::info!(job_id = %result.job_id, dir = %dir.display(), "Persisted job outputs");
        Ok(dir)
    }
}

/// Writes `bytes` to `path` via a temporary sibling and a rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), OutputError> {
    let tmp = tmp_sibling(path);

    let io_err = |p: &Path| {
        let p = p.to_path_buf();
        move |e: std::io::Error| OutputError::Io { path: p, source: e }
    };

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(io_err(&tmp))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(io_err(path))?;
    Ok(())
}

/// Returns the temporary sibling path used while writing `path`.
fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
