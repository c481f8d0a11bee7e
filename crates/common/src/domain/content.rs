use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Content identifier handed out by the content-addressed store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::RepositoryError(anyhow::anyhow!(
                "content identifier cannot be empty"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A local file handed to the store, streamed from disk during the add
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Name inside the upload, e.g. `AA:BB:CC:DD:EE:FF.txt`
    pub name: String,
    pub path: PathBuf,
    /// Bytes sent; record files may keep growing, later appends are left out
    pub size_bytes: u64,
}

/// One object reported back by an add
#[derive(Debug, Clone, PartialEq)]
pub struct AddedContent {
    pub name: String,
    pub cid: ContentId,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentStat {
    pub cid: ContentId,
    pub cumulative_size: u64,
}

/// Content-addressed storage daemon (IPFS)
///
/// Implementations should:
/// - Map an unreachable daemon to `DomainError::StoreUnavailable`
/// - Map non-success HTTP answers to `DomainError::StoreRequestFailed`
/// - Never retry on their own
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Check that the daemon answers; returns its version string
    async fn ping(&self) -> DomainResult<String>;

    /// Add files. With `wrap_in_directory` the last entry is the wrapping directory.
    async fn add(
        &self,
        files: Vec<UploadFile>,
        wrap_in_directory: bool,
    ) -> DomainResult<Vec<AddedContent>>;

    async fn stat(&self, cid: &ContentId) -> DomainResult<ContentStat>;

    /// Where the daemon is expected, for operator-facing messages
    fn endpoint(&self) -> String;
}
