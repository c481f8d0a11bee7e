mod file_record_store;
mod publish_ledger;

pub use file_record_store::FileRecordStore;
pub use publish_ledger::JsonLinesPublishLedger;
