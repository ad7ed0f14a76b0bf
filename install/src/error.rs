use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("no such file or directory: {0}")]
    SourceMissing(PathBuf),

    #[error("cannot stat {path}: {source}")]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("recursive option not set, omitting directory {0}")]
    OmittingDir(PathBuf),

    #[error("with parents, the destination must be a directory: {0}")]
    ParentsDstMustBeDir(PathBuf),

    #[error("cannot overwrite non-directory {dst} with directory {src}")]
    CannotOverwriteNonDir { src: PathBuf, dst: PathBuf },

    #[error("cannot read source directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot overwrite existing directory {0} with file")]
    FileOntoDir(PathBuf),

    #[error("invalid backup mode {0:?}, valid values are 'off', 'simple', 'existing', 'numbered'")]
    InvalidBackupMode(String),

    #[error("source file {path} cannot be opened: {source}")]
    OpenSource {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("temp file cannot be created in {dir}: {source}")]
    CreateTemp {
        dir: PathBuf,
        source: std::io::Error,
    },

    #[error("destination file {path} cannot be created: {source}")]
    CreateDest {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot rename temp file to {path}: {source}")]
    Rename {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot change permissions on {path}: {source}")]
    Chmod {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
