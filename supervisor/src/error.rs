use cutover_core::LayoutError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("cannot resolve current binary: {0}")]
    Resolve(#[from] LayoutError),

    #[error("failed to start {path}: {source}")]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot open node log {path}: {source}")]
    Log {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to kill process {pid:?}: {source}")]
    Kill {
        pid: Option<u32>,
        source: std::io::Error,
    },
}
