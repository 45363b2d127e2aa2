use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::fs;
use uuid::Uuid;

use super::envelope::Envelope;

const DEFAULT_MAX_FILES: usize = 50;

/// Batches that failed to send, persisted one JSON file per batch.
#[derive(Debug, Clone)]
pub struct DiskRetryCache {
    dir: PathBuf,
    max_files: usize,
}

impl DiskRetryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_files: DEFAULT_MAX_FILES,
        }
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn store(&self, batch: &[Envelope]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;

        // Millisecond prefix keeps lexical order equal to write order.
        let file_name = format!(
            "{:013}-{}.json",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        );
        let path = self.dir.join(file_name);
        fs::write(&path, serde_json::to_vec(batch)?)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        let pending = self.pending().await?;
        if pending.len() > self.max_files {
            for stale in &pending[..pending.len() - self.max_files] {
                fs::remove_file(stale).await.ok();
            }
        }

        Ok(path)
    }

    /// Cached batch files, oldest first.
    pub async fn pending(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub async fn load(&self, path: &Path) -> Result<Vec<Envelope>> {
        let raw = fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub async fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .await
            .with_context(|| format!("removing {}", path.display()))
    }
}
