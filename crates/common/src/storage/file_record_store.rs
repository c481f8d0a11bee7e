use crate::domain::{DeviceMessage, DomainResult, MacAddress, RecordFile, RecordStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const RECORD_EXTENSION: &str = "txt";

/// Idle per-device locks are dropped once the map grows past this many entries
const LOCK_PRUNE_THRESHOLD: usize = 256;

/// Plain-text record files, one `<MAC>.txt` per device under a data directory
pub struct FileRecordStore {
    data_dir: PathBuf,
    sync_writes: bool,
    // One async lock per device keeps appends to the same file ordered.
    // Entries only referenced by the map are idle and may be pruned.
    locks: Mutex<HashMap<MacAddress, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileRecordStore {
    /// Open the store, creating the data directory if needed
    pub async fn open(data_dir: impl Into<PathBuf>) -> DomainResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).await?;
        info!(data_dir = %data_dir.display(), "record store ready");

        Ok(Self {
            data_dir,
            sync_writes: false,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// fsync file data after every append
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn lock_for(&self, mac: &MacAddress) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.len() >= LOCK_PRUNE_THRESHOLD && !locks.contains_key(mac) {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks.entry(*mac).or_default().clone()
    }

    fn record_file_name(mac: &MacAddress) -> String {
        format!("{mac}.{RECORD_EXTENSION}")
    }

    /// MAC of a record file name, only if the name is in canonical form
    fn mac_from_file_name(name: &str) -> Option<MacAddress> {
        let stem = name.strip_suffix(&format!(".{RECORD_EXTENSION}"))?;
        let mac = MacAddress::parse(stem).ok()?;
        (mac.to_string() == stem).then_some(mac)
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn append(&self, message: &DeviceMessage) -> DomainResult<()> {
        let path = self.path_for(&message.mac);
        let lock = self.lock_for(&message.mac);
        let _guard = lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(message.to_record_line().as_bytes()).await?;
        file.flush().await?;
        if self.sync_writes {
            file.sync_data().await?;
        }

        debug!(
            mac = %message.mac,
            path = %path.display(),
            payload_size = message.payload.len(),
            "appended record line"
        );
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<RecordFile>> {
        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.data_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Some(mac) = entry.file_name().to_str().and_then(Self::mac_from_file_name) else {
                continue;
            };
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            records.push(RecordFile {
                mac,
                path: entry.path(),
                size_bytes: metadata.len(),
            });
        }

        records.sort_by(|a, b| a.mac.cmp(&b.mac));
        Ok(records)
    }

    async fn read(&self, mac: &MacAddress) -> DomainResult<Vec<DeviceMessage>> {
        let contents = match fs::read_to_string(self.path_for(mac)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        contents
            .lines()
            .filter(|line| !line.is_empty())
            .map(DeviceMessage::from_record_line)
            .collect()
    }

    fn path_for(&self, mac: &MacAddress) -> PathBuf {
        self.data_dir.join(Self::record_file_name(mac))
    }

    fn location(&self) -> PathBuf {
        self.data_dir.clone()
    }
}
