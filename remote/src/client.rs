use crate::error::RemoteError;
use crate::types::*;
use cutover_core::TxEvent;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimal Tendermint JSON-RPC client over HTTP.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    base: String,
}

impl RpcClient {
    pub fn new(addr: &str) -> Result<Self, RemoteError> {
        let base = normalize_addr(addr)?;
        let client = Client::builder()
            .user_agent(concat!("cutover/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        let url = format!("{}/{}", self.base, path);
        tracing::trace!(url = %url, query = ?query, "RPC request");

        let response = self.client.get(&url).query(query).send().await?;
        if !response.status().is_success() {
            return Err(RemoteError::Status {
                url,
                status: response.status(),
            });
        }

        let body = response.text().await?;
        let envelope: RpcResponse<T> = serde_json::from_str(&body)?;
        if let Some(err) = envelope.error {
            return Err(RemoteError::Rpc(err.to_string()));
        }
        envelope
            .result
            .ok_or_else(|| RemoteError::Rpc(format!("empty result from {url}")))
    }

    pub async fn latest_height(&self) -> Result<u64, RemoteError> {
        let status: StatusResult = self.get("status", &[]).await?;
        parse_height(&status.sync_info.latest_block_height)
    }

    /// Transaction events of the block at `height`, one entry per transaction.
    pub async fn block_events(
        &self,
        height: u64,
        encoding: AttributeEncoding,
    ) -> Result<Vec<TxEvent>, RemoteError> {
        let results: BlockResults = self
            .get("block_results", &[("height", height.to_string())])
            .await?;

        results
            .into_txs()
            .iter()
            .map(|tx| flatten_tx(tx, encoding))
            .collect()
    }
}

/// Accepts `host:port`, `tcp://host:port` or an http(s) URL.
fn normalize_addr(addr: &str) -> Result<String, RemoteError> {
    let addr = addr.trim().trim_end_matches('/');
    if addr.is_empty() {
        return Err(RemoteError::InvalidAddress(addr.to_string()));
    }

    let base = if let Some(rest) = addr.strip_prefix("tcp://") {
        format!("http://{rest}")
    } else if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else if addr.contains("://") {
        return Err(RemoteError::InvalidAddress(addr.to_string()));
    } else {
        format!("http://{addr}")
    };
    Ok(base)
}
