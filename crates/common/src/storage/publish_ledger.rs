use crate::domain::{DomainError, DomainResult, PublishLedger, PublishRecord};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Publish history kept as one JSON object per line
pub struct JsonLinesPublishLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesPublishLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PublishLedger for JsonLinesPublishLedger {
    async fn record(&self, record: &PublishRecord) -> DomainResult<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| DomainError::RepositoryError(anyhow::anyhow!("encode ledger entry: {e}")))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(ledger = %self.path.display(), cid = %record.cid, "recorded publish");
        Ok(())
    }

    async fn history(&self) -> DomainResult<Vec<PublishRecord>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| {
                    DomainError::RepositoryError(anyhow::anyhow!("corrupt ledger entry: {e}"))
                })
            })
            .collect()
    }
}
