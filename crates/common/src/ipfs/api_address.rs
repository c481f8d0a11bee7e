use crate::domain::{DomainError, DomainResult};
use reqwest::Url;

/// Local kubo RPC endpoint, in the multiaddr form the daemon prints
pub const DEFAULT_IPFS_API: &str = "/ip4/127.0.0.1/tcp/5001";

/// Parse the IPFS RPC API address into a base URL ending in `/`
///
/// Accepts either an `http(s)://host:port` URL or a multiaddr of the form
/// `/{ip4|ip6|dns|dns4|dns6}/{host}/tcp/{port}[/http|/https]`.
///
/// # Examples
/// ```
/// use common::ipfs::parse_api_address;
///
/// let url = parse_api_address("/ip4/127.0.0.1/tcp/5001").unwrap();
/// assert_eq!(url.as_str(), "http://127.0.0.1:5001/");
/// ```
pub fn parse_api_address(address: &str) -> DomainResult<Url> {
    let address = address.trim();
    if address.starts_with('/') {
        return parse_multiaddr(address);
    }

    let mut url = Url::parse(address)
        .map_err(|e| DomainError::InvalidApiAddress(format!("{address}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DomainError::InvalidApiAddress(format!(
            "{address}: scheme must be http or https"
        )));
    }
    if url.host_str().is_none() {
        return Err(DomainError::InvalidApiAddress(format!("{address}: missing host")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_multiaddr(address: &str) -> DomainResult<Url> {
    let invalid = |reason: &str| DomainError::InvalidApiAddress(format!("{address}: {reason}"));
    let parts: Vec<&str> = address.trim_start_matches('/').split('/').collect();

    let (host, rest) = match parts.as_slice() {
        ["ip4" | "dns" | "dns4" | "dns6", host, rest @ ..] => (host.to_string(), rest),
        ["ip6", host, rest @ ..] => (format!("[{host}]"), rest),
        _ => return Err(invalid("expected /ip4, /ip6 or /dns host component")),
    };
    if host.is_empty() || host == "[]" {
        return Err(invalid("empty host"));
    }

    let (port, scheme) = match rest {
        ["tcp", port] => (*port, "http"),
        ["tcp", port, "http"] => (*port, "http"),
        ["tcp", port, "https"] => (*port, "https"),
        _ => return Err(invalid("expected /tcp/<port> optionally followed by /http or /https")),
    };
    let port: u16 = port.parse().map_err(|_| invalid("invalid tcp port"))?;

    Url::parse(&format!("{scheme}://{host}:{port}/")).map_err(|e| invalid(&e.to_string()))
}
