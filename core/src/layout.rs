//! On-disk layout of the supervisor home.
//!
//! ```text
//! <home>/runner/genesis/bin/<name>
//! <home>/runner/upgrades/<escaped upgrade>/bin/<name>
//! <home>/runner/current -> genesis | upgrades/<escaped upgrade>
//! ```
//!
//! `current` is the only piece of persisted state. It is always replaced in a
//! single rename so a crash never leaves it half written.

use crate::config::Config;
use crate::error::LayoutError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

const ROOT_DIR: &str = "runner";
const GENESIS_DIR: &str = "genesis";
const UPGRADES_DIR: &str = "upgrades";
const CURRENT_LINK: &str = "current";
const BIN_DIR: &str = "bin";

/// Everything except RFC 3986 unreserved characters is escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    name: String,
}

impl Layout {
    pub fn new(cfg: &Config) -> Self {
        Self {
            root: cfg.home.join(ROOT_DIR),
            name: cfg.name.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn genesis_dir(&self) -> PathBuf {
        self.root.join(GENESIS_DIR)
    }

    pub fn genesis_bin(&self) -> PathBuf {
        self.genesis_dir().join(BIN_DIR).join(&self.name)
    }

    pub fn upgrades_dir(&self) -> PathBuf {
        self.root.join(UPGRADES_DIR)
    }

    pub fn upgrade_dir(&self, upgrade: &str) -> PathBuf {
        self.upgrades_dir().join(escape_upgrade_name(upgrade))
    }

    pub fn upgrade_bin(&self, upgrade: &str) -> PathBuf {
        self.upgrade_dir(upgrade).join(BIN_DIR).join(&self.name)
    }

    /// Scratch space used while acquiring upgrade binaries.
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    pub fn current_link(&self) -> PathBuf {
        self.root.join(CURRENT_LINK)
    }

    /// Resolves the binary selected by `current`.
    ///
    /// A missing, non-link or unreadable `current` is treated as a fresh
    /// install: the link is pointed at genesis and the genesis binary is
    /// returned.
    pub fn current_bin(&self) -> Result<PathBuf, LayoutError> {
        match read_pointer(&self.current_link()) {
            Some(dest) => Ok(dest.join(BIN_DIR).join(&self.name)),
            None => {
                tracing::info!(root = ?self.root, "No current link, pointing it at genesis");
                self.point_current_at(&self.genesis_dir())?;
                Ok(self.genesis_bin())
            }
        }
    }

    /// Repoints `current` at the named upgrade directory.
    pub fn set_current_upgrade(&self, upgrade: &str) -> Result<(), LayoutError> {
        let target = self.upgrade_dir(upgrade);
        self.point_current_at(&target)?;
        tracing::info!(upgrade = %upgrade, target = ?target, "Switched current link");
        Ok(())
    }

    fn point_current_at(&self, target: &Path) -> Result<(), LayoutError> {
        replace_pointer(&self.current_link(), target).map_err(|source| LayoutError::Link {
            target: target.to_path_buf(),
            source,
        })
    }
}

/// Percent-encodes an upgrade name into a single safe path segment.
///
/// Upgrade names come from chain data, so `.` and `..` are escaped as well to
/// keep them from resolving to a parent directory.
pub fn escape_upgrade_name(upgrade: &str) -> String {
    if !upgrade.is_empty() && upgrade.chars().all(|c| c == '.') {
        return upgrade.chars().map(|_| "%2E").collect();
    }
    utf8_percent_encode(upgrade, SEGMENT).to_string()
}

pub fn unescape_upgrade_name(segment: &str) -> Cow<'_, str> {
    percent_decode_str(segment).decode_utf8_lossy()
}

/// Checks that `path` is a regular file with the world-execute bit set.
///
/// Owner and group bits cannot be asserted reliably across platforms, so only
/// the world bit is considered.
pub fn check_binary(path: &Path) -> Result<(), LayoutError> {
    let info = std::fs::metadata(path).map_err(|source| LayoutError::BinaryStat {
        path: path.to_path_buf(),
        source,
    })?;
    if !info.is_file() {
        return Err(LayoutError::NotRegularFile(path.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if info.permissions().mode() & 0o001 == 0 {
            return Err(LayoutError::NotExecutable(path.to_path_buf()));
        }
    }

    Ok(())
}

#[cfg(unix)]
fn read_pointer(link: &Path) -> Option<PathBuf> {
    let info = std::fs::symlink_metadata(link).ok()?;
    if !info.file_type().is_symlink() {
        return None;
    }
    std::fs::read_link(link).ok()
}

#[cfg(unix)]
fn replace_pointer(link: &Path, target: &Path) -> std::io::Result<()> {
    let staging = sibling(link, ".current.tmp");
    match std::fs::remove_file(&staging) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::os::unix::fs::symlink(target, &staging)?;
    if let Err(e) = std::fs::rename(&staging, link) {
        let _ = std::fs::remove_file(&staging);
        return Err(e);
    }
    Ok(())
}

// Without usable symlinks `current` is a small file naming the target
// directory, replaced with write-then-rename.
#[cfg(not(unix))]
fn read_pointer(link: &Path) -> Option<PathBuf> {
    let info = std::fs::symlink_metadata(link).ok()?;
    if !info.is_file() {
        return None;
    }
    let content = std::fs::read_to_string(link).ok()?;
    let target = content.trim();
    if target.is_empty() {
        return None;
    }
    Some(PathBuf::from(target))
}

#[cfg(not(unix))]
fn replace_pointer(link: &Path, target: &Path) -> std::io::Result<()> {
    let staging = sibling(link, ".current.tmp");
    std::fs::write(&staging, target.to_string_lossy().as_bytes())?;
    if let Err(e) = std::fs::rename(&staging, link) {
        let _ = std::fs::remove_file(&staging);
        return Err(e);
    }
    Ok(())
}

fn sibling(path: &Path, name: &str) -> PathBuf {
    path.parent()
        .map(|parent| parent.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const NAME: &str = "noded";

    fn write_exec(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn create_test_layout() -> (Layout, TempDir) {
        let home = TempDir::new().unwrap();
        let layout = Layout::new(&Config::new(home.path(), NAME));
        write_exec(&layout.genesis_bin());
        (layout, home)
    }

    #[test]
    fn test_paths() {
        let layout = Layout::new(&Config::new("/srv/node", NAME));
        assert_eq!(layout.root(), Path::new("/srv/node/runner"));
        assert_eq!(
            layout.genesis_bin(),
            PathBuf::from("/srv/node/runner/genesis/bin/noded")
        );
        assert_eq!(
            layout.upgrade_bin("RC-0.2.0"),
            PathBuf::from("/srv/node/runner/upgrades/RC-0.2.0/bin/noded")
        );
    }

    #[test]
    fn test_upgrade_name_is_escaped() {
        let layout = Layout::new(&Config::new("/srv/node", NAME));
        for name in ["big upgrade", "a/b", "v1?x#y", "50%", "..", "ünï"] {
            let bin = layout.upgrade_bin(name);
            let segment = bin
                .parent()
                .and_then(Path::parent)
                .and_then(Path::file_name)
                .unwrap()
                .to_str()
                .unwrap()
                .to_string();

            assert_eq!(layout.upgrade_dir(name).parent().unwrap(), layout.upgrades_dir());
            assert!(!segment.contains(['/', ' ', '?', '#']), "{segment}");
            assert_eq!(unescape_upgrade_name(&segment), name);
        }
        assert_eq!(escape_upgrade_name("big upgrade"), "big%20upgrade");
        assert_eq!(escape_upgrade_name(".."), "%2E%2E");
    }

    #[test]
    fn test_current_bin_defaults_to_genesis() {
        let (layout, _home) = create_test_layout();

        let first = layout.current_bin().unwrap();
        assert_eq!(first, layout.genesis_bin());

        let link = std::fs::symlink_metadata(layout.current_link()).unwrap();
        assert!(link.file_type().is_symlink());
        assert_eq!(std::fs::read_link(layout.current_link()).unwrap(), layout.genesis_dir());

        let second = layout.current_bin().unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn test_current_bin_replaces_non_link() {
        let (layout, _home) = create_test_layout();
        std::fs::write(layout.current_link(), "stale").unwrap();

        assert_eq!(layout.current_bin().unwrap(), layout.genesis_bin());
        assert!(
            std::fs::symlink_metadata(layout.current_link())
                .unwrap()
                .file_type()
                .is_symlink()
        );
    }

    #[test]
    fn test_set_current_upgrade() {
        let (layout, _home) = create_test_layout();
        write_exec(&layout.upgrade_bin("RC-0.2.0"));
        layout.current_bin().unwrap();

        layout.set_current_upgrade("RC-0.2.0").unwrap();
        assert_eq!(layout.current_bin().unwrap(), layout.upgrade_bin("RC-0.2.0"));

        write_exec(&layout.upgrade_bin("RC 0.3.0"));
        layout.set_current_upgrade("RC 0.3.0").unwrap();
        assert_eq!(layout.current_bin().unwrap(), layout.upgrade_bin("RC 0.3.0"));
        assert!(!layout.root().join(".current.tmp").exists());
    }

    #[test]
    fn test_set_current_upgrade_fails_without_root() {
        let home = TempDir::new().unwrap();
        let layout = Layout::new(&Config::new(home.path().join("missing"), NAME));
        assert!(matches!(
            layout.set_current_upgrade("RC-0.2.0"),
            Err(LayoutError::Link { .. })
        ));
    }

    #[test]
    fn test_check_binary() {
        let (layout, home) = create_test_layout();
        check_binary(&layout.genesis_bin()).unwrap();

        let missing = home.path().join("missing");
        assert!(matches!(
            check_binary(&missing),
            Err(LayoutError::BinaryStat { .. })
        ));

        assert!(matches!(
            check_binary(layout.root()),
            Err(LayoutError::NotRegularFile(_))
        ));

        let private = home.path().join("private");
        std::fs::write(&private, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&private, std::fs::Permissions::from_mode(0o750)).unwrap();
        assert!(matches!(
            check_binary(&private),
            Err(LayoutError::NotExecutable(_))
        ));
    }
}
