use cutover_acquire::AcquireError;
use cutover_core::{LayoutError, ParseError};
use cutover_supervisor::SupervisorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpgradeError {
    #[error("cannot parse upgrade announcement: {0}")]
    Parse(#[from] ParseError),

    #[error("binary for upgrade {name} is not installed and downloads are disabled: {source}")]
    BinaryMissing { name: String, source: LayoutError },

    #[error("cannot acquire upgrade {name}: {source}")]
    Acquire { name: String, source: AcquireError },

    #[error("cannot switch current to {name}: {source}")]
    Switch { name: String, source: LayoutError },

    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("watcher task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl UpgradeError {
    /// Malformed announcements are reported but never stop the supervisor.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, UpgradeError::Parse(_))
    }
}
