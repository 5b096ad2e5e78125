use crate::errors::{AppError, ResultExt};
use crate::soil::SoilTable;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Serves the soil reference table from disk, reparsing only on change.
///
/// The file is read on every call so edits take effect without a restart.
/// Parsed tables are cached by the SHA-256 of the file contents; an unchanged
/// file hits the cache and skips CSV parsing entirely.
#[derive(Clone)]
pub struct SoilTableStore {
    path: PathBuf,
    parsed: Cache<String, Arc<SoilTable>>,
}

impl SoilTableStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            // A handful of recent revisions is plenty
            parsed: Cache::builder().max_capacity(4).build(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the table as it currently exists on disk.
    pub async fn current(&self) -> Result<Arc<SoilTable>, AppError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("reading soil table {}", self.path.display()))?;
        let checksum = compute_checksum(&bytes);

        if let Some(table) = self.parsed.get(&checksum).await {
            tracing::debug!("Soil table cache hit ({})", &checksum[..12]);
            return Ok(table);
        }

        tracing::info!(
            "Parsing soil table {} ({} bytes)",
            self.path.display(),
            bytes.len()
        );
        let table = Arc::new(SoilTable::from_reader(bytes.as_slice())?);
        if table.skipped_rows() > 0 {
            tracing::warn!(
                "Soil table {} has {} malformed rows",
                self.path.display(),
                table.skipped_rows()
            );
        }

        self.parsed.insert(checksum, table.clone()).await;
        Ok(table)
    }
}

/// Hex-encoded SHA-256 of `data`.
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
