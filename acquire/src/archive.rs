use crate::error::AcquireError;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

/// Unpacks a gzip-compressed tarball below `target_dir`.
///
/// Any entry whose path (or hard-link target) is absolute or climbs out with
/// `..` fails the whole extraction.
pub(crate) fn extract_tar_gz(archive_path: &Path, target_dir: &Path) -> Result<usize, AcquireError> {
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);

    let mut unpacked = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        check_entry_path(&path)?;

        if entry.header().entry_type() == EntryType::Link
            && let Some(target) = entry.link_name()?
        {
            check_entry_path(&target)?;
        }

        if entry.unpack_in(target_dir)? {
            unpacked += 1;
        }
    }

    tracing::debug!(archive = ?archive_path, target = ?target_dir, entries = unpacked, "Extracted archive");
    Ok(unpacked)
}

fn check_entry_path(path: &Path) -> Result<(), AcquireError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(AcquireError::UnsafeEntry(path.to_path_buf()));
    }
    Ok(())
}

/// Source archives usually wrap everything in one top-level directory. That
/// directory is the source root when it is the only entry.
pub(crate) fn source_root(extracted: &Path) -> Result<PathBuf, AcquireError> {
    let mut entries = std::fs::read_dir(extracted)?.collect::<Result<Vec<_>, _>>()?;
    if entries.len() == 1
        && entries[0].file_type()?.is_dir()
        && let Some(only) = entries.pop()
    {
        return Ok(only.path());
    }
    Ok(extracted.to_path_buf())
}

/// Reads the digest from a `sha256sum` style line (`<hex>  <file>` or just
/// `<hex>`).
pub(crate) fn parse_checksum(body: &str) -> Option<String> {
    let digest = body.split_whitespace().next()?.to_ascii_lowercase();
    (digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit())).then_some(digest)
}
