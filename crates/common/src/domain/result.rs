use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid MAC address: {0}")]
    InvalidMacAddress(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Empty payload from device: {0}")]
    EmptyPayload(String),

    #[error("Invalid publish target: {0}")]
    InvalidTarget(String),

    #[error("Nothing to publish in: {0}")]
    NothingToPublish(String),

    #[error("IPFS daemon unavailable at {endpoint}: {reason} (is `ipfs daemon` running?)")]
    StoreUnavailable { endpoint: String, reason: String },

    #[error("IPFS request failed with status {status}: {body}")]
    StoreRequestFailed { status: u16, body: String },

    #[error("IPFS add returned no entries")]
    EmptyAddResponse,

    #[error("Invalid IPFS API address: {0}")]
    InvalidApiAddress(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

impl DomainError {
    /// Errors caused by what the device sent, as opposed to relay-side failures.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            DomainError::InvalidMacAddress(_)
                | DomainError::MalformedFrame(_)
                | DomainError::EmptyPayload(_)
        )
    }
}
