use crate::domain::content::ContentId;
use crate::domain::mac_address::MacAddress;
use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What a publish run uploads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishTarget {
    /// Every record file in the data directory, wrapped in one directory object
    DataDirectory,
    /// One device's record file
    Device(MacAddress),
    /// An explicit file path
    File(PathBuf),
}

impl PublishTarget {
    /// Interpret an operator-supplied target: empty means the whole data
    /// directory, a MAC address selects that device, anything else is a path.
    pub fn from_setting(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() {
            return PublishTarget::DataDirectory;
        }
        match MacAddress::parse(value) {
            Ok(mac) => PublishTarget::Device(mac),
            Err(_) => PublishTarget::File(PathBuf::from(value)),
        }
    }
}

impl fmt::Display for PublishTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishTarget::DataDirectory => f.write_str("data directory"),
            PublishTarget::Device(mac) => write!(f, "device {mac}"),
            PublishTarget::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// Result of one successful publish, as kept in the publish ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRecord {
    pub published_at: DateTime<Utc>,
    /// Path that was uploaded (file or directory)
    pub target: String,
    pub cid: ContentId,
    pub file_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cumulative_size: Option<u64>,
}

/// Append-only history of published identifiers
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PublishLedger: Send + Sync {
    async fn record(&self, record: &PublishRecord) -> DomainResult<()>;

    /// Every record so far, oldest first
    async fn history(&self) -> DomainResult<Vec<PublishRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_from_setting() {
        assert_eq!(PublishTarget::from_setting(""), PublishTarget::DataDirectory);
        assert_eq!(PublishTarget::from_setting("  "), PublishTarget::DataDirectory);
        assert_eq!(
            PublishTarget::from_setting("aa:bb:cc:dd:ee:ff"),
            PublishTarget::Device(MacAddress::parse("AA:BB:CC:DD:EE:FF").unwrap())
        );
        assert_eq!(
            PublishTarget::from_setting("data/AA:BB:CC:DD:EE:FF.txt"),
            PublishTarget::File(PathBuf::from("data/AA:BB:CC:DD:EE:FF.txt"))
        );
    }

    #[test]
    fn test_record_omits_unknown_size() {
        let record = PublishRecord {
            published_at: Utc::now(),
            target: "data".to_string(),
            cid: ContentId::new("QmTest").unwrap(),
            file_count: 2,
            cumulative_size: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("cumulative_size"));
        let back: PublishRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
