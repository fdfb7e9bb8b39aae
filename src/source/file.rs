//! Batch files on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::BatchSource;
use crate::batch::CollectedBatch;
use crate::Result;

/// Every `*.json` file of one directory, in file-name order. Each file
/// holds one batch; a batch without a `source` label gets the file name.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
    pending: Option<Vec<PathBuf>>,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), pending: None }
    }

    async fn list(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();
        // Popped from the back.
        files.reverse();
        Ok(files)
    }
}

#[async_trait]
impl BatchSource for JsonDirSource {
    async fn next_batch(&mut self) -> Result<Option<CollectedBatch>> {
        if self.pending.is_none() {
            let files = Self::list(&self.dir).await?;
            tracing::debug!(dir = %self.dir.display(), files = files.len(), "listing batch files");
            self.pending = Some(files);
        }
        let Some(path) = self.pending.as_mut().and_then(Vec::pop) else {
            return Ok(None);
        };

        let text = tokio::fs::read_to_string(&path).await?;
        let mut batch = CollectedBatch::from_json(&text)?;
        if batch.source.is_empty() {
            batch.source = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        }
        Ok(Some(batch))
    }

    fn describe(&self) -> String {
        format!("json dir {}", self.dir.display())
    }
}
