pub mod domain;
pub mod ipfs;
pub mod storage;
pub mod telemetry;

pub use domain::*;
pub use ipfs::*;
pub use storage::*;
pub use telemetry::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockContentStore;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockPublishLedger;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockRecordStore;
