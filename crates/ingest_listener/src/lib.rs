pub mod domain;
pub mod ingest_listener;
pub mod tcp;

pub use domain::*;
pub use ingest_listener::*;
pub use tcp::*;
