use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Unset(&'static str),

    #[error("{0} must be an absolute path")]
    RelativeHome(&'static str),

    #[error("invalid boolean for {var}: {value}")]
    InvalidBool { var: &'static str, value: String },

    #[error("cannot stat root dir {path}: {source}")]
    MissingRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0} is not a directory")]
    RootNotDirectory(PathBuf),

    #[error("genesis binary unusable: {0}")]
    Genesis(#[from] LayoutError),
}

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("cannot stat binary {path}: {source}")]
    BinaryStat {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0} is not a regular file")]
    NotRegularFile(PathBuf),

    #[error("{0} is not world executable")]
    NotExecutable(PathBuf),

    #[error("creating current link to {target}: {source}")]
    Link {
        target: PathBuf,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("upgrade payload has {found} tokens, expected at least {expected}: {payload:?}")]
    TooFewTokens {
        payload: String,
        found: usize,
        expected: usize,
    },

    #[error("upgrade payload is missing field {field}: {payload:?}")]
    MissingField {
        payload: String,
        field: &'static str,
    },

    #[error("could not convert height {value:?} to an integer")]
    InvalidHeight { value: String },
}
