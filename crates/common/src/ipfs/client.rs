use crate::domain::{
    AddedContent, ContentId, ContentStat, ContentStore, DomainError, DomainResult, UploadFile,
};
use crate::ipfs::api_address::parse_api_address;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response, Url};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, instrument};

const VERSION_PATH: &str = "api/v0/version";
const ADD_PATH: &str = "api/v0/add";
const FILES_STAT_PATH: &str = "api/v0/files/stat";

#[derive(Debug, Clone)]
pub struct IpfsClientConfig {
    /// HTTP URL or multiaddr of the RPC API
    pub api_address: String,
    pub timeout: Duration,
    /// 0 yields `Qm...` identifiers, 1 yields `bafy...`
    pub cid_version: u8,
}

impl Default for IpfsClientConfig {
    fn default() -> Self {
        Self {
            api_address: super::DEFAULT_IPFS_API.to_string(),
            timeout: Duration::from_secs(60),
            cid_version: 0,
        }
    }
}

/// Client for the kubo RPC API (`/api/v0/*`, all calls are POST)
#[derive(Clone)]
pub struct IpfsClient {
    client: Client,
    base_url: Url,
    cid_version: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponseLine {
    name: String,
    hash: String,
    #[serde(default)]
    size: Option<SizeField>,
}

// kubo reports add sizes as strings and stat sizes as numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SizeField {
    Number(u64),
    Text(String),
}

impl SizeField {
    fn value(&self) -> u64 {
        match self {
            SizeField::Number(n) => *n,
            SizeField::Text(s) => s.parse().unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FilesStatResponse {
    hash: String,
    cumulative_size: u64,
}

impl IpfsClient {
    pub fn new(config: IpfsClientConfig) -> DomainResult<Self> {
        if config.cid_version > 1 {
            return Err(DomainError::RepositoryError(anyhow::anyhow!(
                "unsupported CID version {}, expected 0 or 1",
                config.cid_version
            )));
        }
        let base_url = parse_api_address(&config.api_address)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DomainError::RepositoryError(anyhow::anyhow!("build http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            cid_version: config.cid_version,
        })
    }

    fn url(&self, path: &str) -> DomainResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DomainError::InvalidApiAddress(format!("{}{path}: {e}", self.base_url)))
    }

    fn map_send_error(&self, err: reqwest::Error) -> DomainError {
        if err.is_connect() || err.is_timeout() {
            DomainError::StoreUnavailable {
                endpoint: self.base_url.to_string(),
                reason: err.to_string(),
            }
        } else {
            DomainError::RepositoryError(anyhow::anyhow!("IPFS request failed: {err}"))
        }
    }

    async fn check_status(resp: Response) -> DomainResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(DomainError::StoreRequestFailed {
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }

    fn decode_add_response(body: &str) -> DomainResult<Vec<AddedContent>> {
        body.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let entry: AddResponseLine = serde_json::from_str(line).map_err(|e| {
                    DomainError::RepositoryError(anyhow::anyhow!("undecodable add response: {e}"))
                })?;
                Ok(AddedContent {
                    name: entry.name,
                    cid: ContentId::new(entry.hash)?,
                    size: entry.size.map(|s| s.value()).unwrap_or(0),
                })
            })
            .collect()
    }
}

/// Percent-encode a multipart file name; kubo query-unescapes it.
fn escape_file_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~:".contains(&byte) {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("%{byte:02X}"));
        }
    }
    escaped
}

#[async_trait]
impl ContentStore for IpfsClient {
    #[instrument(skip(self), fields(endpoint = %self.base_url))]
    async fn ping(&self) -> DomainResult<String> {
        let resp = self
            .client
            .post(self.url(VERSION_PATH)?)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let version: VersionResponse = Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| DomainError::RepositoryError(anyhow::anyhow!("undecodable version response: {e}")))?;

        debug!(version = %version.version, "IPFS daemon reachable");
        Ok(version.version)
    }

    #[instrument(skip(self, files), fields(endpoint = %self.base_url, file_count = files.len()))]
    async fn add(
        &self,
        files: Vec<UploadFile>,
        wrap_in_directory: bool,
    ) -> DomainResult<Vec<AddedContent>> {
        let mut form = Form::new();
        for file in files {
            let reader = tokio::fs::File::open(&file.path).await?.take(file.size_bytes);
            let body = Body::wrap_stream(ReaderStream::new(reader));
            let part = Part::stream_with_length(body, file.size_bytes)
                .file_name(escape_file_name(&file.name))
                .mime_str("application/octet-stream")
                .map_err(|e| DomainError::RepositoryError(anyhow::anyhow!("build multipart: {e}")))?;
            form = form.part("file", part);
        }

        let cid_version = self.cid_version.to_string();
        let resp = self
            .client
            .post(self.url(ADD_PATH)?)
            .query(&[
                ("pin", "true"),
                ("progress", "false"),
                ("cid-version", cid_version.as_str()),
                ("wrap-with-directory", if wrap_in_directory { "true" } else { "false" }),
            ])
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let body = Self::check_status(resp)
            .await?
            .text()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let added = Self::decode_add_response(&body)?;
        debug!(entries = added.len(), "IPFS add completed");
        Ok(added)
    }

    #[instrument(skip(self, cid), fields(endpoint = %self.base_url, cid = %cid))]
    async fn stat(&self, cid: &ContentId) -> DomainResult<ContentStat> {
        let arg = format!("/ipfs/{cid}");
        let resp = self
            .client
            .post(self.url(FILES_STAT_PATH)?)
            .query(&[("arg", arg.as_str())])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let stat: FilesStatResponse = Self::check_status(resp)
            .await?
            .json()
            .await
            .map_err(|e| DomainError::RepositoryError(anyhow::anyhow!("undecodable stat response: {e}")))?;

        Ok(ContentStat {
            cid: ContentId::new(stat.hash)?,
            cumulative_size: stat.cumulative_size,
        })
    }

    fn endpoint(&self) -> String {
        self.base_url.to_string()
    }
}
