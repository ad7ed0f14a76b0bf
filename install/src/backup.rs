use crate::copy::{install, parent_dir};
use crate::error::InstallError;
use crate::options::{BackupMode, InstallOptions};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

const MAX_BACKUP_DIGITS: usize = 5;

/// Copies the current content of `dst` aside before it is overwritten.
pub(crate) fn backup_file(
    dst: &Path,
    mode: BackupMode,
    opts: &InstallOptions,
) -> Result<(), InstallError> {
    let plain = InstallOptions {
        atomic: opts.atomic,
        ..InstallOptions::default()
    };

    let target = match mode {
        BackupMode::Off => return Ok(()),
        BackupMode::Simple => simple_path(dst),
        BackupMode::Numbered => numbered_path(dst, next_backup_number(dst)?),
        BackupMode::Existing => match next_backup_number(dst)? {
            1 => simple_path(dst),
            n => numbered_path(dst, n),
        },
    };

    tracing::debug!(dst = ?dst, backup = ?target, mode = %mode, "Backing up destination");
    install(dst, &target, &plain)
}

fn simple_path(dst: &Path) -> PathBuf {
    let mut name = OsString::from(dst.as_os_str());
    name.push("~");
    PathBuf::from(name)
}

fn numbered_path(dst: &Path, n: u32) -> PathBuf {
    let mut name = OsString::from(dst.as_os_str());
    name.push(format!(".~{n}~"));
    PathBuf::from(name)
}

/// One above the highest `<name>.~N~` sibling of `dst`, or 1 when none exist.
pub(crate) fn next_backup_number(dst: &Path) -> Result<u32, InstallError> {
    let Some(name) = dst.file_name().and_then(|n| n.to_str()) else {
        return Ok(1);
    };
    let prefix = format!("{name}.~");
    let dir = parent_dir(dst);

    let entries = fs::read_dir(&dir).map_err(|source| InstallError::ReadDir {
        path: dir.clone(),
        source,
    })?;

    let mut highest = 0;
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(n) = parse_backup_number(file_name, &prefix) {
            highest = highest.max(n);
        }
    }
    Ok(highest + 1)
}

fn parse_backup_number(candidate: &str, prefix: &str) -> Option<u32> {
    let digits = candidate.strip_prefix(prefix)?.strip_suffix('~')?;
    if digits.is_empty()
        || digits.len() > MAX_BACKUP_DIGITS
        || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    digits.parse().ok()
}
