use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("invalid rpc address: {0}")]
    InvalidAddress(String),

    #[error("rpc {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("invalid height {0:?} in rpc response")]
    InvalidHeight(String),

    #[error("cannot decode attribute {value:?}: {reason}")]
    Attribute { value: String, reason: String },

    #[error("unknown attribute encoding {0:?}, expected 'plain' or 'base64'")]
    UnknownEncoding(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
