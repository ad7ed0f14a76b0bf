mod config;
mod error;
mod event;
mod layout;
pub mod shutdown;
mod upgrade;

pub use config::{ALLOW_DOWNLOAD_VAR, Config, HOME_VAR, NAME_VAR, RESTART_VAR};
pub use error::{ConfigError, LayoutError, ParseError};
pub use event::{BlockHeader, ChainEvent, TxEvent, UPGRADE_ACTION};
pub use layout::{Layout, check_binary, escape_upgrade_name, unescape_upgrade_name};
pub use upgrade::UpgradeInfo;
