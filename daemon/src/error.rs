use cutover_acquire::AcquireError;
use cutover_coordinator::UpgradeError;
use cutover_core::ConfigError;
use cutover_remote::RemoteError;
use cutover_supervisor::SupervisorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("event listener error: {0}")]
    Remote(#[from] RemoteError),

    #[error("acquisition setup error: {0}")]
    Acquire(#[from] AcquireError),

    #[error("upgrade error: {0}")]
    Upgrade(#[from] UpgradeError),

    #[error("cannot register signal handler: {0}")]
    Signal(std::io::Error),
}
