use chrono::Utc;
use common::domain::{
    ContentStore, DomainError, DomainResult, PublishLedger, PublishRecord, PublishTarget,
    RecordStore, UploadFile,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

/// Domain service that uploads record files and keeps track of the identifiers
///
/// Flow:
/// 1. Resolve the target to a list of files (never contacting the daemon for a bad target)
/// 2. Check that the daemon answers
/// 3. Add the files, wrapped in a directory when the target is one
/// 4. Stat the result for its cumulative size (best effort)
/// 5. Append the outcome to the publish ledger
pub struct PublishService {
    record_store: Arc<dyn RecordStore>,
    content_store: Arc<dyn ContentStore>,
    ledger: Arc<dyn PublishLedger>,
}

struct ResolvedTarget {
    location: PathBuf,
    files: Vec<(String, PathBuf)>,
    wrap_in_directory: bool,
}

impl PublishService {
    pub fn new(
        record_store: Arc<dyn RecordStore>,
        content_store: Arc<dyn ContentStore>,
        ledger: Arc<dyn PublishLedger>,
    ) -> Self {
        Self {
            record_store,
            content_store,
            ledger,
        }
    }

    #[instrument(skip(self, target), fields(target = %target))]
    pub async fn publish(&self, target: &PublishTarget) -> DomainResult<PublishRecord> {
        let resolved = self.resolve(target).await?;
        debug!(
            location = %resolved.location.display(),
            file_count = resolved.files.len(),
            "publish target resolved"
        );

        let version = self.content_store.ping().await.inspect_err(|e| {
            warn!(endpoint = %self.content_store.endpoint(), error = %e, "IPFS daemon not reachable");
        })?;
        debug!(version = %version, "IPFS daemon version");

        let mut uploads = Vec::with_capacity(resolved.files.len());
        for (name, path) in &resolved.files {
            let size_bytes = fs::metadata(path).await?.len();
            uploads.push(UploadFile {
                name: name.clone(),
                path: path.clone(),
                size_bytes,
            });
        }
        let file_count = uploads.len();

        let added = self
            .content_store
            .add(uploads, resolved.wrap_in_directory)
            .await?;
        // The wrapping directory (or the single file) is always the last entry.
        let root = added.into_iter().last().ok_or(DomainError::EmptyAddResponse)?;

        let cumulative_size = match self.content_store.stat(&root.cid).await {
            Ok(stat) => Some(stat.cumulative_size),
            Err(e) => {
                warn!(cid = %root.cid, error = %e, "could not stat published content");
                None
            }
        };

        let record = PublishRecord {
            published_at: Utc::now(),
            target: resolved.location.display().to_string(),
            cid: root.cid,
            file_count,
            cumulative_size,
        };

        if let Err(e) = self.ledger.record(&record).await {
            error!(cid = %record.cid, error = %e, "failed to append to publish ledger");
        }

        info!(cid = %record.cid, file_count, "published to IPFS");
        Ok(record)
    }

    async fn resolve(&self, target: &PublishTarget) -> DomainResult<ResolvedTarget> {
        match target {
            PublishTarget::DataDirectory => {
                let location = self.record_store.location();
                let records = self.record_store.list().await?;
                if records.is_empty() {
                    return Err(DomainError::NothingToPublish(location.display().to_string()));
                }
                let files = records
                    .into_iter()
                    .map(|record| (format!("{}.txt", record.mac), record.path))
                    .collect();
                Ok(ResolvedTarget {
                    location,
                    files,
                    wrap_in_directory: true,
                })
            }
            PublishTarget::Device(mac) => {
                let path = self.record_store.path_for(mac);
                if !is_file(&path).await {
                    return Err(DomainError::NothingToPublish(format!(
                        "no record for {mac} at {}",
                        path.display()
                    )));
                }
                Ok(ResolvedTarget {
                    files: vec![(format!("{mac}.txt"), path.clone())],
                    location: path,
                    wrap_in_directory: false,
                })
            }
            PublishTarget::File(path) => resolve_path(path).await,
        }
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

fn file_name(path: &Path) -> DomainResult<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| DomainError::InvalidTarget(format!("{} has no file name", path.display())))
}

/// A plain file is sent on its own; a directory sends its regular files, wrapped
async fn resolve_path(path: &Path) -> DomainResult<ResolvedTarget> {
    let metadata = match fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DomainError::InvalidTarget(format!(
                "{} does not exist",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    if metadata.is_file() {
        return Ok(ResolvedTarget {
            files: vec![(file_name(path)?, path.to_path_buf())],
            location: path.to_path_buf(),
            wrap_in_directory: false,
        });
    }
    if !metadata.is_dir() {
        return Err(DomainError::InvalidTarget(format!(
            "{} is neither a file nor a directory",
            path.display()
        )));
    }

    let mut files = Vec::new();
    let mut entries = fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.metadata().await?.is_file() {
            files.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    if files.is_empty() {
        return Err(DomainError::NothingToPublish(path.display().to_string()));
    }
    files.sort();

    Ok(ResolvedTarget {
        location: path.to_path_buf(),
        files,
        wrap_in_directory: true,
    })
}
