mod api_address;
mod client;

pub use api_address::{parse_api_address, DEFAULT_IPFS_API};
pub use client::{IpfsClient, IpfsClientConfig};
