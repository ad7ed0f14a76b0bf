use crate::backup::backup_file;
use crate::error::InstallError;
use crate::options::InstallOptions;
use std::fs::{self, File, Metadata, Permissions};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

/// A path together with what `lstat` reported for it when the call started.
#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) path: PathBuf,
    pub(crate) meta: Option<Metadata>,
}

impl Entry {
    pub(crate) fn stat(path: impl Into<PathBuf>) -> Result<Self, InstallError> {
        let path = path.into();
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(source) => return Err(InstallError::Stat { path, source }),
        };
        Ok(Self { path, meta })
    }

    fn exists(&self) -> bool {
        self.meta.is_some()
    }

    fn is_dir(&self) -> bool {
        self.meta.as_ref().is_some_and(Metadata::is_dir)
    }

    fn is_symlink(&self) -> bool {
        self.meta
            .as_ref()
            .is_some_and(|meta| meta.file_type().is_symlink())
    }
}

/// Installs `src` at `dst`.
///
/// Files, directories (with `recursive`) and symlinks are supported. With
/// `atomic`, a file destination is either fully replaced with the right
/// permissions or left exactly as it was.
pub fn install(
    src: impl AsRef<Path>,
    dst: impl AsRef<Path>,
    opts: &InstallOptions,
) -> Result<(), InstallError> {
    let src = Entry::stat(src.as_ref())?;
    if !src.exists() {
        return Err(InstallError::SourceMissing(src.path));
    }
    let mut dst = Entry::stat(dst.as_ref())?;

    let mut opts = opts.clone();
    if should_make_parents(&dst, &opts) {
        opts.mkdir_all = true;
    }

    if opts.parents {
        if dst.exists() && !dst.is_dir() {
            return Err(InstallError::ParentsDstMustBeDir(dst.path));
        }
        let nested = dst.path.join(strip_root(&src.path));
        tracing::debug!(dst = ?nested, "Recreating source path below destination");
        dst = Entry::stat(nested)?;
        opts.parents = false;
    }

    if src.is_dir() && dst.exists() && !dst.is_dir() {
        return Err(InstallError::CannotOverwriteNonDir {
            src: src.path,
            dst: dst.path,
        });
    }

    if opts.link {
        hard_link(&src, &dst, &opts)
    } else if src.is_symlink() {
        copy_link(&src, &dst, &opts)
    } else if src.is_dir() {
        copy_dir(&src, &dst, &opts)
    } else {
        copy_file(&src, dst, &opts)
    }
}

/// Copies `reader` into a temp file next to `dst`, syncs and closes it, then
/// renames it over `dst`. `perms` are applied to the temp file before the
/// rename, so `dst` never shows up with the temp file's private mode. On any
/// error the temp file is removed and `dst` is untouched.
pub fn write_atomic<R: Read + ?Sized>(
    reader: &mut R,
    dst: &Path,
    perms: Option<Permissions>,
) -> Result<(), InstallError> {
    let dir = parent_dir(dst);
    let mut tmp = tempfile::Builder::new()
        .prefix(".install-")
        .tempfile_in(&dir)
        .map_err(|source| InstallError::CreateTemp {
            dir: dir.clone(),
            source,
        })?;
    tracing::debug!(tmp = ?tmp.path(), dst = ?dst, "Copying into temp file");

    io::copy(reader, tmp.as_file_mut())?;
    if let Some(perms) = perms {
        tmp.as_file()
            .set_permissions(perms)
            .map_err(|source| InstallError::Chmod {
                path: tmp.path().to_path_buf(),
                source,
            })?;
    }
    tmp.as_file().sync_all()?;

    let tmp_path = tmp.into_temp_path();
    tmp_path
        .persist(dst)
        .map_err(|e| InstallError::Rename {
            path: dst.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}

fn write_direct<R: Read + ?Sized>(reader: &mut R, dst: &Path) -> Result<(), InstallError> {
    let mut file = File::create(dst).map_err(|source| InstallError::CreateDest {
        path: dst.to_path_buf(),
        source,
    })?;
    io::copy(reader, &mut file)?;
    file.sync_all()?;
    Ok(())
}

fn should_make_parents(dst: &Entry, opts: &InstallOptions) -> bool {
    if opts.mkdir_all || opts.parents {
        return true;
    }
    if dst.exists() {
        return false;
    }
    // dst is missing but its direct parent is there
    parent_dir(&dst.path).exists()
}

fn ensure_parent(dst: &Path, opts: &InstallOptions) -> Result<(), InstallError> {
    if opts.mkdir_all {
        fs::create_dir_all(parent_dir(dst))?;
    }
    Ok(())
}

fn hard_link(src: &Entry, dst: &Entry, opts: &InstallOptions) -> Result<(), InstallError> {
    tracing::debug!(src = ?src.path, dst = ?dst.path, "Creating hard link");
    ensure_parent(&dst.path, opts)?;
    fs::hard_link(&src.path, &dst.path)?;
    Ok(())
}

fn copy_link(src: &Entry, dst: &Entry, opts: &InstallOptions) -> Result<(), InstallError> {
    let target = fs::read_link(&src.path)?;
    tracing::debug!(src = ?src.path, dst = ?dst.path, target = ?target, "Copying symlink");
    ensure_parent(&dst.path, opts)?;
    symlink(&target, &dst.path)?;
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(_target: &Path, link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot recreate symlink {} on this platform", link.display()),
    ))
}

fn copy_dir(src: &Entry, dst: &Entry, opts: &InstallOptions) -> Result<(), InstallError> {
    if !opts.recursive {
        return Err(InstallError::OmittingDir(src.path.clone()));
    }
    if opts.mkdir_all && !dst.exists() {
        tracing::debug!(dst = ?dst.path, "Creating directory");
        create_dir_like(&dst.path, src.meta.as_ref())?;
    }

    let entries = fs::read_dir(&src.path).map_err(|source| InstallError::ReadDir {
        path: src.path.clone(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| InstallError::ReadDir {
            path: src.path.clone(),
            source,
        })?;
        let name = entry.file_name();
        install(src.path.join(&name), dst.path.join(&name), opts)?;
    }
    Ok(())
}

#[cfg(unix)]
fn create_dir_like(path: &Path, like: Option<&Metadata>) -> io::Result<()> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    if let Some(meta) = like {
        builder.mode(meta.permissions().mode() & 0o7777);
    }
    builder.create(path)
}

#[cfg(not(unix))]
fn create_dir_like(path: &Path, _like: Option<&Metadata>) -> io::Result<()> {
    fs::create_dir_all(path)
}

fn copy_file(src: &Entry, mut dst: Entry, opts: &InstallOptions) -> Result<(), InstallError> {
    if same_file(src, &dst) {
        tracing::debug!(src = ?src.path, dst = ?dst.path, "Source and destination are the same file");
        return Ok(());
    }

    ensure_parent(&dst.path, opts)?;

    if dst.is_dir() {
        let name = match src.path.file_name() {
            Some(name) if opts.append_name_to_path => name.to_owned(),
            _ => return Err(InstallError::FileOntoDir(dst.path)),
        };
        dst = Entry::stat(dst.path.join(name))?;
        tracing::debug!(dst = ?dst.path, "Appended source name to destination");
        if dst.is_dir() {
            return Err(InstallError::FileOntoDir(dst.path));
        }
        if same_file(src, &dst) {
            return Ok(());
        }
    }

    if dst.exists() {
        if opts.no_clobber {
            tracing::debug!(dst = ?dst.path, "Destination exists, not clobbering");
            return Ok(());
        }
        backup_file(&dst.path, opts.backup, opts)?;
    }

    let wanted = wanted_permissions(src, &dst);
    let mut reader = File::open(&src.path).map_err(|source| InstallError::OpenSource {
        path: src.path.clone(),
        source,
    })?;

    if opts.atomic {
        write_atomic(&mut reader, &dst.path, wanted)?;
    } else {
        write_direct(&mut reader, &dst.path)?;
        if let Some(wanted) = wanted {
            apply_permissions(&dst.path, wanted)?;
        }
    }
    tracing::debug!(src = ?src.path, dst = ?dst.path, atomic = opts.atomic, "Copied file");
    Ok(())
}

/// An overwritten destination keeps its own mode, a new one takes the
/// source's. A symlinked destination keeps the mode of the file it points at,
/// never the link's own 0777.
fn wanted_permissions(src: &Entry, dst: &Entry) -> Option<Permissions> {
    let prior = if dst.is_symlink() {
        fs::metadata(&dst.path).ok()
    } else {
        dst.meta.clone()
    };
    prior.or_else(|| src.meta.clone()).map(|meta| meta.permissions())
}

fn apply_permissions(path: &Path, wanted: Permissions) -> Result<(), InstallError> {
    let current = fs::metadata(path)?.permissions();
    if current == wanted {
        return Ok(());
    }

    fs::set_permissions(path, wanted).map_err(|source| InstallError::Chmod {
        path: path.to_path_buf(),
        source,
    })
}

/// True when `dst` is `src`, either directly or through a symlink.
#[cfg(unix)]
fn same_file(src: &Entry, dst: &Entry) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Some(src) = &src.meta else {
        return false;
    };
    let same = |meta: &Metadata| meta.dev() == src.dev() && meta.ino() == src.ino();

    match &dst.meta {
        Some(meta) if same(meta) => true,
        Some(meta) if meta.file_type().is_symlink() => {
            fs::metadata(&dst.path).is_ok_and(|target| same(&target))
        }
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(_src: &Entry, _dst: &Entry) -> bool {
    false
}

pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn strip_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use tempfile::TempDir;

    fn write(path: &Path, content: &str, mode: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    fn mode(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o7777
    }

    struct FailingReader {
        remaining: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied mid-copy"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(b'x');
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_copy_new_file_takes_source_mode() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src/noded");
        let dst = tmp.path().join("dst");
        write(&src, "binary", 0o751);

        install(&src, &dst, &InstallOptions::atomic()).unwrap();

        assert_eq!(fs::read_to_string(&dst).unwrap(), "binary");
        assert_eq!(mode(&dst), 0o751);
    }

    #[test]
    fn test_overwrite_keeps_destination_mode() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src, "new", 0o755);
        write(&dst, "old", 0o600);

        install(&src, &dst, &InstallOptions::default()).unwrap();

        assert_eq!(fs::read_to_string(&dst).unwrap(), "new");
        assert_eq!(mode(&dst), 0o600);
    }

    #[test]
    fn test_copy_onto_itself_is_noop() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("file");
        let alias = tmp.path().join("alias");
        write(&src, "content", 0o644);
        fs::hard_link(&src, &alias).unwrap();

        install(&src, &src, &InstallOptions::atomic()).unwrap();
        install(&src, &alias, &InstallOptions::atomic()).unwrap();

        assert_eq!(fs::read_to_string(&src).unwrap(), "content");
        assert_eq!(
            fs::metadata(&src).unwrap().ino(),
            fs::metadata(&alias).unwrap().ino()
        );
    }

    #[test]
    fn test_missing_source() {
        let tmp = TempDir::new().unwrap();
        let err = install(
            tmp.path().join("nope"),
            tmp.path().join("dst"),
            &InstallOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, InstallError::SourceMissing(_)));
    }

    #[test]
    fn test_no_clobber() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        write(&src, "new", 0o644);
        write(&dst, "old", 0o644);

        let opts = InstallOptions {
            no_clobber: true,
            ..InstallOptions::default()
        };
        install(&src, &dst, &opts).unwrap();

        assert_eq!(fs::read_to_string(&dst).unwrap(), "old");
    }

    #[test]
    fn test_file_onto_directory() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("noded");
        let dir = tmp.path().join("bin");
        write(&src, "binary", 0o755);
        fs::create_dir(&dir).unwrap();

        let err = install(&src, &dir, &InstallOptions::default()).unwrap_err();
        assert!(matches!(err, InstallError::FileOntoDir(_)));

        let opts = InstallOptions {
            append_name_to_path: true,
            ..InstallOptions::atomic()
        };
        install(&src, &dir, &opts).unwrap();
        assert_eq!(fs::read_to_string(dir.join("noded")).unwrap(), "binary");
    }

    #[test]
    fn test_atomic_failure_leaves_destination_untouched() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("noded");
        write(&dst, "original", 0o755);

        let mut reader = FailingReader { remaining: 16 * 1024 };
        assert!(write_atomic(&mut reader, &dst, None).is_err());

        assert_eq!(fs::read_to_string(&dst).unwrap(), "original");
        assert_eq!(mode(&dst), 0o755);
        let leftovers: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);

        let absent = tmp.path().join("absent");
        let mut reader = FailingReader { remaining: 3 };
        assert!(write_atomic(&mut reader, &absent, None).is_err());
        assert!(!absent.exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_atomic_sets_mode_before_rename() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("noded");

        let perms = fs::Permissions::from_mode(0o751);
        write_atomic(&mut &b"binary"[..], &dst, Some(perms)).unwrap();
        assert_eq!(mode(&dst), 0o751);

        // without explicit permissions the temp file's private mode is kept
        let plain = tmp.path().join("plain");
        write_atomic(&mut &b"data"[..], &plain, None).unwrap();
        assert_eq!(mode(&plain), 0o600);
    }

    #[test]
    fn test_symlink_destination_keeps_target_mode() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let real = tmp.path().join("real");
        let dst = tmp.path().join("dst");
        write(&src, "new", 0o755);
        write(&real, "old", 0o750);
        std::os::unix::fs::symlink(&real, &dst).unwrap();

        install(&src, &dst, &InstallOptions::atomic()).unwrap();
        assert!(!fs::symlink_metadata(&dst).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "new");
        assert_eq!(mode(&dst), 0o750);
        assert_eq!(fs::read_to_string(&real).unwrap(), "old");

        // a dangling link takes the source mode
        let dangling = tmp.path().join("dangling");
        std::os::unix::fs::symlink(tmp.path().join("gone"), &dangling).unwrap();
        install(&src, &dangling, &InstallOptions::atomic()).unwrap();
        assert_eq!(mode(&dangling), 0o755);

        // a direct write goes through the link into its target
        let linked = tmp.path().join("linked");
        write(&real, "old", 0o700);
        std::os::unix::fs::symlink(&real, &linked).unwrap();
        install(&src, &linked, &InstallOptions::default()).unwrap();
        assert_eq!(fs::read_to_string(&real).unwrap(), "new");
        assert_eq!(mode(&real), 0o700);
    }

    #[test]
    fn test_copy_onto_symlink_to_source_is_noop() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("file");
        let alias = tmp.path().join("alias");
        write(&src, "content", 0o644);
        std::os::unix::fs::symlink(&src, &alias).unwrap();

        install(&src, &alias, &InstallOptions::default()).unwrap();
        install(&src, &alias, &InstallOptions::atomic()).unwrap();

        assert_eq!(fs::read_to_string(&src).unwrap(), "content");
        assert!(fs::symlink_metadata(&alias).unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_recursive_copy() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("fixture");
        write(&src.join("runner/genesis/bin/noded"), "genesis", 0o755);
        write(&src.join("runner/upgrades/RC-0.2.0/bin/noded"), "upgrade", 0o755);
        std::os::unix::fs::symlink("genesis", src.join("runner/current")).unwrap();

        let dst = tmp.path().join("home");
        let opts = InstallOptions::atomic().recursive();
        install(&src, &dst, &opts).unwrap();

        assert_eq!(
            fs::read_to_string(dst.join("runner/genesis/bin/noded")).unwrap(),
            "genesis"
        );
        assert_eq!(mode(&dst.join("runner/upgrades/RC-0.2.0/bin/noded")), 0o755);
        assert_eq!(
            fs::read_link(dst.join("runner/current")).unwrap(),
            PathBuf::from("genesis")
        );
    }

    #[test]
    fn test_directory_requires_recursive() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("dir");
        write(&src.join("file"), "x", 0o644);

        let err = install(&src, tmp.path().join("out"), &InstallOptions::default()).unwrap_err();
        assert!(matches!(err, InstallError::OmittingDir(_)));
    }

    #[test]
    fn test_directory_onto_file() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("dir");
        let dst = tmp.path().join("file");
        write(&src.join("inner"), "x", 0o644);
        write(&dst, "y", 0o644);

        let err = install(&src, &dst, &InstallOptions::default().recursive()).unwrap_err();
        assert!(matches!(err, InstallError::CannotOverwriteNonDir { .. }));
    }

    #[test]
    fn test_hard_link() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("nested/dst");
        write(&src, "x", 0o644);

        let opts = InstallOptions {
            link: true,
            ..InstallOptions::default().mkdir_all()
        };
        install(&src, &dst, &opts).unwrap();

        assert_eq!(
            fs::metadata(&src).unwrap().ino(),
            fs::metadata(&dst).unwrap().ino()
        );
    }

    #[test]
    fn test_mkdir_all() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("a/b/c/dst");
        write(&src, "x", 0o644);

        let err = install(&src, &dst, &InstallOptions::default());
        assert!(err.is_err());

        install(&src, &dst, &InstallOptions::atomic().mkdir_all()).unwrap();
        assert_eq!(fs::read_to_string(&dst).unwrap(), "x");
    }

    #[test]
    fn test_parents() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("tree/leaf");
        let out = tmp.path().join("out");
        write(&src, "leaf", 0o644);
        fs::create_dir(&out).unwrap();

        let opts = InstallOptions {
            parents: true,
            ..InstallOptions::default()
        };
        install(&src, &out, &opts).unwrap();

        let nested = out.join(strip_root(&src));
        assert_eq!(fs::read_to_string(nested).unwrap(), "leaf");

        let file = tmp.path().join("plain");
        write(&file, "", 0o644);
        let err = install(&src, &file, &opts).unwrap_err();
        assert!(matches!(err, InstallError::ParentsDstMustBeDir(_)));
    }
}
