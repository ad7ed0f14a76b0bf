use crate::error::InstallError;
use std::fmt;
use std::str::FromStr;

/// How an existing destination file is preserved before it is overwritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackupMode {
    #[default]
    Off,
    /// `<dst>~`, replacing any earlier simple backup.
    Simple,
    /// `<dst>.~N~` with N one above the highest existing number.
    Numbered,
    /// Numbered if numbered backups already exist, simple otherwise.
    Existing,
}

impl FromStr for BackupMode {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(Self::Off),
            "simple" => Ok(Self::Simple),
            "numbered" => Ok(Self::Numbered),
            "existing" => Ok(Self::Existing),
            other => Err(InstallError::InvalidBackupMode(other.to_string())),
        }
    }
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupMode::Off => write!(f, "off"),
            BackupMode::Simple => write!(f, "simple"),
            BackupMode::Numbered => write!(f, "numbered"),
            BackupMode::Existing => write!(f, "existing"),
        }
    }
}

/// Per-call installer behaviour. Nothing here is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Copying a file onto an existing directory writes `<dir>/<src name>`.
    pub append_name_to_path: bool,
    /// Write to a temp file in the destination directory, then rename.
    pub atomic: bool,
    pub backup: BackupMode,
    /// Hard-link instead of copying.
    pub link: bool,
    /// Create missing parent directories of the destination.
    pub mkdir_all: bool,
    /// Leave an existing destination file untouched.
    pub no_clobber: bool,
    /// Recreate the source path below the destination directory.
    pub parents: bool,
    pub recursive: bool,
}

impl InstallOptions {
    pub fn atomic() -> Self {
        Self {
            atomic: true,
            ..Self::default()
        }
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    pub fn mkdir_all(mut self) -> Self {
        self.mkdir_all = true;
        self
    }

    pub fn backup(mut self, mode: BackupMode) -> Self {
        self.backup = mode;
        self
    }
}
