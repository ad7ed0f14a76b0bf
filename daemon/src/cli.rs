use clap::Parser;
use cutover_acquire::{AcquireConfig, BuildRecipe, DEFAULT_MIRRORS};
use cutover_remote::{AttributeEncoding, ListenerConfig};
use cutover_supervisor::StdioMode;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cutover")]
#[command(about = "Runs a node and swaps its binary when an on-chain upgrade activates")]
#[command(version)]
pub struct Cli {
    /// Node RPC endpoint polled for transactions and block headers
    #[arg(long, env = "CUTOVER_RPC_ADDR", default_value = "tcp://127.0.0.1:26657")]
    pub rpc_addr: String,

    /// Milliseconds between two RPC polls
    #[arg(long, env = "CUTOVER_POLL_INTERVAL_MS", default_value_t = 5000)]
    pub poll_interval_ms: u64,

    /// Encoding of event attributes: plain or base64
    #[arg(long, env = "CUTOVER_ATTRIBUTE_ENCODING", default_value_t = AttributeEncoding::Plain)]
    pub attribute_encoding: AttributeEncoding,

    /// Forward every transaction to the coordinator, not only upgrade announcements
    #[arg(long, env = "CUTOVER_ALL_TRANSACTIONS")]
    pub all_transactions: bool,

    /// Download mirrors, comma separated, each joined with `<version><ext>`
    #[arg(long, env = "CUTOVER_MIRRORS", value_delimiter = ',')]
    pub mirrors: Vec<String>,

    /// Extension appended to mirror links
    #[arg(long, env = "CUTOVER_ARCHIVE_EXT", default_value = ".tar.gz")]
    pub archive_ext: String,

    /// Build command run in the extracted source; `{out}` and `{src}` are substituted
    #[arg(long, env = "CUTOVER_BUILD_CMD")]
    pub build_cmd: Option<String>,

    /// Require `<link>.sha256` to match the downloaded archive
    #[arg(long, env = "CUTOVER_VERIFY_CHECKSUM")]
    pub verify_checksum: bool,

    /// Seconds to wait after the first launch before listening for events
    #[arg(long, env = "CUTOVER_STARTUP_DELAY_SECS", default_value_t = 10)]
    pub startup_delay_secs: u64,

    /// Append the node's stdout and stderr to this file instead of sharing ours
    #[arg(long, env = "CUTOVER_NODE_LOG")]
    pub node_log: Option<PathBuf>,

    /// Arguments passed to the node binary
    #[arg(last = true, allow_hyphen_values = true)]
    pub node_args: Vec<String>,
}

impl Cli {
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            rpc_addr: self.rpc_addr.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            encoding: self.attribute_encoding,
            tx_filter: if self.all_transactions {
                None
            } else {
                ListenerConfig::default().tx_filter
            },
            ..ListenerConfig::default()
        }
    }

    pub fn acquire_config(&self) -> AcquireConfig {
        let mirrors = if self.mirrors.is_empty() {
            DEFAULT_MIRRORS.iter().map(|m| m.to_string()).collect()
        } else {
            self.mirrors.clone()
        };
        AcquireConfig {
            mirrors,
            archive_ext: self.archive_ext.clone(),
            build: self
                .build_cmd
                .as_deref()
                .and_then(BuildRecipe::parse)
                .unwrap_or_default(),
            verify_checksum: self.verify_checksum,
        }
    }

    pub fn node_stdio(&self) -> StdioMode {
        match &self.node_log {
            Some(path) => StdioMode::Log(path.clone()),
            None => StdioMode::Inherit,
        }
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}
