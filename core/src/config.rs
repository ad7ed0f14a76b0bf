use crate::error::ConfigError;
use crate::layout::{Layout, check_binary};
use std::path::PathBuf;

pub const HOME_VAR: &str = "DAEMON_HOME";
pub const NAME_VAR: &str = "DAEMON_NAME";
pub const ALLOW_DOWNLOAD_VAR: &str = "DAEMON_ALLOW_DOWNLOAD_BINARIES";
pub const RESTART_VAR: &str = "DAEMON_RESTART_AFTER_UPGRADE";

/// Runtime settings for the supervisor. Built once at startup and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub home: PathBuf,
    pub name: String,
    pub allow_download: bool,
    pub restart_after_upgrade: bool,
}

impl Config {
    pub fn new(home: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            name: name.into(),
            allow_download: false,
            restart_after_upgrade: true,
        }
    }

    /// Reads the process environment and validates the result.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`Config::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cfg = Self {
            home: PathBuf::from(lookup(HOME_VAR).unwrap_or_default()),
            name: lookup(NAME_VAR).unwrap_or_default(),
            allow_download: parse_flag(ALLOW_DOWNLOAD_VAR, lookup(ALLOW_DOWNLOAD_VAR), false)?,
            restart_after_upgrade: parse_flag(RESTART_VAR, lookup(RESTART_VAR), true)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn root(&self) -> PathBuf {
        Layout::new(self).root().to_path_buf()
    }

    /// Ensures home is set and absolute, name is set, and `home/runner`
    /// exists as a directory holding an executable genesis binary.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Unset(NAME_VAR));
        }
        if self.home.as_os_str().is_empty() {
            return Err(ConfigError::Unset(HOME_VAR));
        }
        if !self.home.is_absolute() {
            return Err(ConfigError::RelativeHome(HOME_VAR));
        }

        let layout = Layout::new(self);
        let root = layout.root();
        let info = std::fs::metadata(root).map_err(|source| ConfigError::MissingRoot {
            path: root.to_path_buf(),
            source,
        })?;
        if !info.is_dir() {
            return Err(ConfigError::RootNotDirectory(root.to_path_buf()));
        }

        check_binary(&layout.genesis_bin())?;
        Ok(())
    }
}

fn parse_flag(
    var: &'static str,
    value: Option<String>,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value }),
    }
}
