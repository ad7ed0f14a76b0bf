//! File and directory installation with atomic replace and backups.

mod backup;
mod copy;
mod error;
mod options;

pub use copy::{install, write_atomic};
pub use error::InstallError;
pub use options::{BackupMode, InstallOptions};
