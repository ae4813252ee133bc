//! Repository tarball extraction.

use flate2::read::GzDecoder;
use std::fs;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, warn};

use crate::GitHubError;

fn archive_error(err: std::io::Error) -> GitHubError {
    GitHubError::Archive(err.to_string())
}

/// Path of an entry below the archive's top-level directory, or `None` for the
/// top-level directory itself.
fn strip_top_level(path: &Path) -> Result<Option<PathBuf>, GitHubError> {
    let mut components = path.components();
    components.next();
    let relative = components.as_path();
    if relative.as_os_str().is_empty() {
        return Ok(None);
    }
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(GitHubError::Archive(format!(
            "unsafe path in archive: {}",
            path.display()
        )));
    }
    Ok(Some(relative.to_path_buf()))
}

fn escapes(link: &Path) -> bool {
    link.components()
        .any(|c| matches!(c, Component::RootDir | Component::Prefix(_) | Component::ParentDir))
}

/// Unpack a gzipped GitHub tarball into `dest`, dropping the
/// `<owner>-<repo>-<sha>/` directory every entry is nested under.
pub fn extract_tarball(data: &[u8], dest: &Path) -> Result<(), GitHubError> {
    let mut archive = Archive::new(GzDecoder::new(Cursor::new(data)));

    for entry in archive.entries().map_err(archive_error)? {
        let mut entry = entry.map_err(archive_error)?;
        let path = entry.path().map_err(archive_error)?.into_owned();
        let Some(relative) = strip_top_level(&path)? else {
            continue;
        };
        let target = dest.join(&relative);

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target).map_err(archive_error)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(archive_error)?;
                }
                entry.unpack(&target).map_err(archive_error)?;
            }
            EntryType::Symlink => {
                let link = entry
                    .link_name()
                    .map_err(archive_error)?
                    .map(|l| l.into_owned());
                match link {
                    Some(link) if !escapes(&link) => {
                        if let Some(parent) = target.parent() {
                            fs::create_dir_all(parent).map_err(archive_error)?;
                        }
                        entry.unpack(&target).map_err(archive_error)?;
                    }
                    _ => warn!(path = %relative.display(), "Skipping symlink leaving the archive"),
                }
            }
            other => {
                debug!(path = %relative.display(), entry_type = ?other, "Skipping archive entry");
            }
        }
    }
    Ok(())
}
