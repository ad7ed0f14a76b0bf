use cutover_core::LayoutError;
use cutover_install::InstallError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("upgrade has an empty version")]
    EmptyVersion,

    #[error("no download mirrors configured")]
    NoMirrors,

    #[error("all mirrors failed for version {version}: {last}")]
    AllMirrorsFailed { version: String, last: String },

    #[error("{url} returned {status}")]
    Download {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("malformed checksum file at {0}")]
    ChecksumFormat(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("archive entry escapes the destination: {0}")]
    UnsafeEntry(PathBuf),

    #[error("cannot start build {program}: {source}")]
    BuildSpawn {
        program: String,
        source: std::io::Error,
    },

    #[error("build {program} failed: {status}")]
    Build { program: String, status: String },

    #[error("build did not produce {0}")]
    NotProduced(PathBuf),

    #[error("install error: {0}")]
    Install(#[from] InstallError),

    #[error("binary check failed: {0}")]
    Layout(#[from] LayoutError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
