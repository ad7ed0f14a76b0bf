//! Chain event listener backed by Tendermint JSON-RPC polling.

mod client;
mod error;
mod listener;
mod types;

pub use client::RpcClient;
pub use error::RemoteError;
pub use listener::{EventListener, EventStreams, ListenerConfig};
pub use types::AttributeEncoding;
