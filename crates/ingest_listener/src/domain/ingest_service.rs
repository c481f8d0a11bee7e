use common::domain::{DeviceMessage, DomainError, DomainResult, IncomingMessage, RecordStore};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Domain service that turns what a device sent into a stored record line
///
/// Flow:
/// 1. Reject empty payloads
/// 2. Stamp the receipt time
/// 3. Append to the sender's record via the record store
pub struct IngestService {
    record_store: Arc<dyn RecordStore>,
}

impl IngestService {
    pub fn new(record_store: Arc<dyn RecordStore>) -> Self {
        Self { record_store }
    }

    #[instrument(skip(self, incoming), fields(mac = %incoming.mac, payload_size = incoming.payload.len()))]
    pub async fn ingest(&self, incoming: IncomingMessage) -> DomainResult<DeviceMessage> {
        if incoming.payload.trim().is_empty() {
            return Err(DomainError::EmptyPayload(incoming.mac.to_string()));
        }

        let message = DeviceMessage::received_now(incoming);
        self.record_store.append(&message).await?;

        debug!("device message stored");
        Ok(message)
    }
}
