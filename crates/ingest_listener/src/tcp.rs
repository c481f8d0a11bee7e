mod frame;
mod server;

pub use frame::parse_frame;
pub use server::{CloseReason, ConnectionSummary, TcpIngestServer, TcpIngestServerConfig};
