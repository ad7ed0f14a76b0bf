use crate::error::RemoteError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cutover_core::TxEvent;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// JSON-RPC envelope returned by every Tendermint endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RpcErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

impl fmt::Display for RpcErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Some(data) if !data.is_empty() => write!(f, "{}: {}", self.message, data),
            _ => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatusResult {
    pub sync_info: SyncInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SyncInfo {
    pub latest_block_height: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BlockResults {
    #[serde(default)]
    pub txs_results: Option<Vec<TxResult>>,
    /// Pre-0.34 nodes nest deliver_tx results here.
    #[serde(default)]
    pub results: Option<LegacyResults>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LegacyResults {
    #[serde(default)]
    pub deliver_tx: Option<Vec<TxResult>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TxResult {
    #[serde(default)]
    pub events: Vec<AbciEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AbciEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct EventAttribute {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl BlockResults {
    pub(crate) fn into_txs(self) -> Vec<TxResult> {
        self.txs_results
            .or_else(|| self.results.and_then(|r| r.deliver_tx))
            .unwrap_or_default()
    }
}

/// How event attribute keys and values are encoded on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttributeEncoding {
    #[default]
    Plain,
    /// Tendermint 0.34 and older.
    Base64,
}

impl AttributeEncoding {
    pub fn decode(self, raw: &str) -> Result<String, RemoteError> {
        match self {
            AttributeEncoding::Plain => Ok(raw.to_string()),
            AttributeEncoding::Base64 => {
                let bytes = STANDARD.decode(raw).map_err(|e| RemoteError::Attribute {
                    value: raw.to_string(),
                    reason: e.to_string(),
                })?;
                String::from_utf8(bytes).map_err(|e| RemoteError::Attribute {
                    value: raw.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl FromStr for AttributeEncoding {
    type Err = RemoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "base64" => Ok(Self::Base64),
            other => Err(RemoteError::UnknownEncoding(other.to_string())),
        }
    }
}

impl fmt::Display for AttributeEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeEncoding::Plain => write!(f, "plain"),
            AttributeEncoding::Base64 => write!(f, "base64"),
        }
    }
}

/// Flattens a transaction's events into `"<type>.<key>" -> values`.
pub(crate) fn flatten_tx(tx: &TxResult, encoding: AttributeEncoding) -> Result<TxEvent, RemoteError> {
    let mut event = TxEvent::new();
    for abci in &tx.events {
        for attr in &abci.attributes {
            let key = encoding.decode(attr.key.as_deref().unwrap_or_default())?;
            let value = encoding.decode(attr.value.as_deref().unwrap_or_default())?;
            event.push(format!("{}.{}", abci.kind, key), value);
        }
    }
    Ok(event)
}

pub(crate) fn parse_height(raw: &str) -> Result<u64, RemoteError> {
    raw.parse()
        .map_err(|_| RemoteError::InvalidHeight(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutover_core::UPGRADE_ACTION;

    const BLOCK_RESULTS: &str = r#"{
        "jsonrpc": "2.0",
        "id": -1,
        "result": {
            "height": "12",
            "txs_results": [
                {
                    "code": 0,
                    "events": [
                        {
                            "type": "upgrade",
                            "attributes": [
                                {"key": "action", "value": "upgrade action: RC-0.2.0 upgrade height: 20]", "index": true}
                            ]
                        },
                        {
                            "type": "message",
                            "attributes": [
                                {"key": "sender", "value": "abc"},
                                {"key": "module", "value": null}
                            ]
                        }
                    ]
                },
                {"code": 0, "events": []}
            ]
        }
    }"#;

    #[test]
    fn test_flatten_block_results() {
        let response: RpcResponse<BlockResults> = serde_json::from_str(BLOCK_RESULTS).unwrap();
        let txs = response.result.unwrap().into_txs();
        assert_eq!(txs.len(), 2);

        let event = flatten_tx(&txs[0], AttributeEncoding::Plain).unwrap();
        assert_eq!(
            event.attributes.get(UPGRADE_ACTION).unwrap(),
            &vec!["upgrade action: RC-0.2.0 upgrade height: 20]".to_string()]
        );
        assert_eq!(event.attributes.get("message.module").unwrap(), &vec![String::new()]);
        assert_eq!(
            event.upgrade_payload(),
            Some("upgrade action: RC-0.2.0 upgrade height: 20]")
        );

        let empty = flatten_tx(&txs[1], AttributeEncoding::Plain).unwrap();
        assert!(empty.attributes.is_empty());
    }

    #[test]
    fn test_legacy_deliver_tx_base64() {
        // "upgrade" / "action" / "name=RC-0.3.0 height=5"
        let body = r#"{
            "jsonrpc": "2.0",
            "id": -1,
            "result": {
                "height": "4",
                "results": {
                    "deliver_tx": [
                        {"events": [{"type": "upgrade", "attributes": [
                            {"key": "YWN0aW9u", "value": "bmFtZT1SQy0wLjMuMCBoZWlnaHQ9NQ=="}
                        ]}]}
                    ]
                }
            }
        }"#;
        let response: RpcResponse<BlockResults> = serde_json::from_str(body).unwrap();
        let txs = response.result.unwrap().into_txs();

        let event = flatten_tx(&txs[0], AttributeEncoding::Base64).unwrap();
        assert_eq!(event.upgrade_payload(), Some("name=RC-0.3.0 height=5"));

        assert!(matches!(
            flatten_tx(&txs[0], AttributeEncoding::Plain)
                .unwrap()
                .upgrade_payload(),
            None
        ));
    }

    #[test]
    fn test_bad_base64() {
        assert!(matches!(
            AttributeEncoding::Base64.decode("***"),
            Err(RemoteError::Attribute { .. })
        ));
    }

    #[test]
    fn test_status_and_error_envelopes() {
        let status: RpcResponse<StatusResult> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":-1,"result":{"node_info":{},"sync_info":{"latest_block_height":"1042","catching_up":false}}}"#,
        )
        .unwrap();
        let height = parse_height(&status.result.unwrap().sync_info.latest_block_height).unwrap();
        assert_eq!(height, 1042);

        let failed: RpcResponse<BlockResults> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":-1,"error":{"code":-32603,"message":"Internal error","data":"height 99 must be less than or equal to the current blockchain height 12"}}"#,
        )
        .unwrap();
        assert!(failed.result.is_none());
        assert!(failed.error.unwrap().to_string().starts_with("Internal error: height 99"));
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("BASE64".parse::<AttributeEncoding>().unwrap(), AttributeEncoding::Base64);
        assert_eq!("plain".parse::<AttributeEncoding>().unwrap(), AttributeEncoding::Plain);
        assert!("hex".parse::<AttributeEncoding>().is_err());
    }
}
