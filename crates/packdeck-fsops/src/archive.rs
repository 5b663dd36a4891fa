//! Archive naming and ZIP extraction.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use zip::ZipArchive;

use crate::error::{FsOpsError, FsOpsResult};

/// File name used when the source URL does not end in a usable segment.
const FALLBACK_ARCHIVE_NAME: &str = "pack.zip";

/// Local file name for an archive downloaded from `source_url`.
///
/// The last path segment is used with query and fragment stripped; anything
/// that could escape the download directory falls back to `pack.zip`.
#[must_use]
pub fn archive_file_name(source_url: &str) -> String {
    let without_query = source_url.split(['?', '#']).next().unwrap_or_default();
    let candidate = without_query.rsplit('/').next().unwrap_or_default().trim();
    let usable = !candidate.is_empty()
        && candidate != "."
        && candidate != ".."
        && !candidate.contains('\\')
        && !candidate.contains(':');
    if usable {
        candidate.to_owned()
    } else {
        FALLBACK_ARCHIVE_NAME.to_owned()
    }
}

/// Directory an archive is unpacked into: its sibling named by the file stem.
#[must_use]
pub fn extraction_dir(archive: &Path) -> PathBuf {
    let stem = archive
        .file_stem()
        .map_or_else(|| "pack".into(), |stem| stem.to_os_string());
    archive.with_file_name(stem)
}

/// Unpack every entry of the ZIP at `source` beneath `target`.
///
/// Returns the number of files written.
///
/// # Errors
///
/// Fails on unreadable archives, on entries with absolute or parent-relative
/// paths, and on filesystem errors while writing.
pub fn extract_zip(source: &Path, target: &Path) -> FsOpsResult<usize> {
    let file = File::open(source)
        .map_err(|source_err| FsOpsError::io("extract_zip.open", source, source_err))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|source_err| FsOpsError::zip("extract_zip.decode", source, source_err))?;
    fs::create_dir_all(target)
        .map_err(|source_err| FsOpsError::io("extract_zip.create_target", target, source_err))?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|source_err| {
            FsOpsError::zip("extract_zip.read_entry", source, source_err)
        })?;
        let destination = target.join(sanitize_archive_path(entry.name())?);

        if entry.is_dir() {
            fs::create_dir_all(&destination).map_err(|source_err| {
                FsOpsError::io("extract_zip.create_dir", &destination, source_err)
            })?;
            continue;
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|source_err| {
                FsOpsError::io("extract_zip.create_parent", parent, source_err)
            })?;
        }
        let mut output = File::create(&destination).map_err(|source_err| {
            FsOpsError::io("extract_zip.create_file", &destination, source_err)
        })?;
        io::copy(&mut entry, &mut output)
            .map_err(|source_err| FsOpsError::io("extract_zip.copy", &destination, source_err))?;
        written += 1;
    }

    Ok(written)
}

fn sanitize_archive_path(entry: &str) -> FsOpsResult<PathBuf> {
    let path = Path::new(entry);
    if path.is_absolute() || entry.starts_with('/') || entry.starts_with('\\') {
        return Err(FsOpsError::invalid_input(
            "archive_entry",
            "absolute_path",
            entry,
        ));
    }

    let mut sanitized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FsOpsError::invalid_input(
                    "archive_entry",
                    "invalid_segment",
                    entry,
                ));
            }
        }
    }
    if sanitized.as_os_str().is_empty() {
        return Err(FsOpsError::invalid_input("archive_entry", "empty_path", entry));
    }

    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::{FileOptions, ZipWriter};

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
        let mut writer = ZipWriter::new(File::create(path)?);
        for (name, body) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, FileOptions::default())?;
            } else {
                writer.start_file(*name, FileOptions::default())?;
                writer.write_all(body)?;
            }
        }
        writer.finish()?;
        Ok(())
    }

    #[test]
    fn file_names_come_from_the_last_segment() {
        assert_eq!(
            archive_file_name("https://files.example/packs/Big%20Pack.zip?token=1"),
            "Big%20Pack.zip"
        );
        assert_eq!(archive_file_name("https://files.example/a/b.zip#frag"), "b.zip");
        assert_eq!(archive_file_name("https://files.example/"), "pack.zip");
        assert_eq!(archive_file_name("https://files.example/.."), "pack.zip");
        assert_eq!(archive_file_name(""), "pack.zip");
    }

    #[test]
    fn extraction_dir_is_sibling_named_by_stem() {
        assert_eq!(
            extraction_dir(Path::new("/d/Pack One.zip")),
            PathBuf::from("/d/Pack One")
        );
    }

    #[test]
    fn sanitize_rejects_escaping_entries() {
        assert!(sanitize_archive_path("/etc/passwd").is_err());
        assert!(sanitize_archive_path("../evil").is_err());
        assert!(sanitize_archive_path("songs/../../evil").is_err());
        assert_eq!(
            sanitize_archive_path("./songs/a.sm").ok(),
            Some(PathBuf::from("songs/a.sm"))
        );
    }

    #[test]
    fn extract_writes_nested_entries() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let archive = dir.path().join("pack.zip");
        write_zip(
            &archive,
            &[
                ("Pack/", b""),
                ("Pack/Song A/", b""),
                ("Pack/Song A/a.sm", b"#TITLE:A;"),
                ("Pack/Song A/a.ogg", b"OggS"),
            ],
        )?;

        let target = extraction_dir(&archive);
        let written = extract_zip(&archive, &target)?;
        assert_eq!(written, 2);
        assert_eq!(
            fs::read_to_string(target.join("Pack/Song A/a.sm"))?,
            "#TITLE:A;"
        );
        Ok(())
    }

    #[test]
    fn extract_rejects_parent_relative_entries() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../escape.txt", b"boom")])?;

        let err = extract_zip(&archive, &dir.path().join("evil")).expect_err("rejected");
        assert!(matches!(
            err,
            FsOpsError::InvalidInput {
                reason: "invalid_segment",
                ..
            }
        ));
        assert!(!dir.path().join("escape.txt").exists());
        Ok(())
    }

    #[test]
    fn extract_reports_corrupt_archives() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"not a zip")?;
        assert!(matches!(
            extract_zip(&archive, &dir.path().join("broken")),
            Err(FsOpsError::Zip { .. })
        ));
        Ok(())
    }
}
