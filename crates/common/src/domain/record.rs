use crate::domain::mac_address::MacAddress;
use crate::domain::message::DeviceMessage;
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use std::path::PathBuf;

/// A device's record file as found in the data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFile {
    pub mac: MacAddress,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Append-only storage of device messages, one record per source.
///
/// Implementations must keep messages of one source in the order
/// `append` was called for them.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append one message to its source's record, creating the record on first use
    async fn append(&self, message: &DeviceMessage) -> DomainResult<()>;

    /// All records currently stored, sorted by MAC
    async fn list(&self) -> DomainResult<Vec<RecordFile>>;

    /// Read back every message of one source, oldest first
    async fn read(&self, mac: &MacAddress) -> DomainResult<Vec<DeviceMessage>>;

    /// Location of a source's record, whether or not it exists yet
    fn path_for(&self, mac: &MacAddress) -> PathBuf;

    /// Where records live, for operator-facing messages and publish ledger entries
    fn location(&self) -> PathBuf;
}
