use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};
use tracing::{debug, warn};
use zip::ZipArchive;

use super::{create_dir_tree, create_truncated, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use crate::error::{ErrorKind, UploadError, UploadResult};

/// Zero-byte file written into every directory entry so the directory
/// survives tools that drop empty directories.
pub const MARKER_FILE: &str = ".gitkeep";

/// Result of trying to place a marker into one directory.
#[derive(Debug)]
pub enum MarkerOutcome {
    Created(PathBuf),
    /// Something already exists at the marker path; it is left untouched.
    Present(PathBuf),
    Failed { path: PathBuf, error: io::Error },
}

impl MarkerOutcome {
    /// Where the marker was, or would have been, written.
    pub fn path(&self) -> &Path {
        match self {
            MarkerOutcome::Created(path) | MarkerOutcome::Present(path) => path,
            MarkerOutcome::Failed { path, .. } => path,
        }
    }
}

/// Summary of a completed extraction.
#[derive(Debug)]
pub struct Extraction {
    pub root: PathBuf,
    pub files: usize,
    pub directories: usize,
    /// One outcome per directory entry, in archive order.
    pub markers: Vec<MarkerOutcome>,
}

impl Extraction {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            files: 0,
            directories: 0,
            markers: Vec::new(),
        }
    }
}

/// Writes an empty [`MARKER_FILE`] into `dir` unless one is already there.
///
/// Never fails: problems are logged and reported as [`MarkerOutcome::Failed`].
pub fn place_marker(dir: &Path) -> MarkerOutcome {
    let path = dir.join(MARKER_FILE);

    let outcome = match path.try_exists() {
        Ok(true) => return MarkerOutcome::Present(path),
        Ok(false) => create_truncated(&path, DEFAULT_FILE_MODE).map(|_| ()),
        Err(error) => Err(error),
    };

    match outcome {
        Ok(()) => MarkerOutcome::Created(path),
        Err(error) => {
            warn!(path = %path.display(), %error, "could not create directory marker");
            MarkerOutcome::Failed { path, error }
        }
    }
}

/// Copies `source` into a uniquely named `upload-*.zip` file. The file is
/// removed when the returned handle is dropped.
fn stage<R: Read>(mut source: R, staging_dir: Option<&Path>) -> UploadResult<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix("upload-").suffix(".zip");

    let created = match staging_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    };
    let mut staged = created.map_err(|e| {
        UploadError::with_source(ErrorKind::TempFileError, "failed to create staging file", e)
    })?;

    io::copy(&mut source, staged.as_file_mut()).map_err(|e| {
        UploadError::with_source(ErrorKind::TempFileError, "failed to copy upload into staging file", e)
    })?;

    Ok(staged)
}

/// Extracts the ZIP archive read from `source` under `root`.
///
/// Entries are processed in archive order. Directory entries are created
/// and receive a marker file; file entries are written with their archived
/// permission bits, replacing existing files. On failure whatever was
/// already written stays on disk.
pub fn extract<R: Read>(source: R, root: &Path, staging_dir: Option<&Path>) -> UploadResult<Extraction> {
    let staged = stage(source, staging_dir)?;
    let file = staged.reopen().map_err(|e| {
        UploadError::with_source(ErrorKind::TempFileError, "failed to reopen staging file", e)
    })?;

    let mut archive = ZipArchive::new(file).map_err(|e| {
        UploadError::with_source(ErrorKind::ArchiveOpenError, "failed to open ZIP archive", e)
    })?;

    create_dir_tree(root, DEFAULT_DIR_MODE).map_err(|e| {
        UploadError::with_source(
            ErrorKind::DirectoryCreateError,
            format!("failed to create destination `{}`", root.display()),
            e,
        )
    })?;

    let mut extraction = Extraction::new(root);

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| {
            UploadError::with_source(
                ErrorKind::ArchiveOpenError,
                format!("failed to read archive entry #{}", index),
                e,
            )
        })?;
        let name = entry.name().to_owned();

        let relative = entry.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
            UploadError::new(
                ErrorKind::UnsafePath,
                format!("archive entry `{}` escapes the destination", name),
            )
        })?;
        let target = root.join(relative);
        let mode = entry.unix_mode().map(|mode| mode & 0o777);

        if entry.is_dir() {
            create_dir_tree(&target, mode.unwrap_or(DEFAULT_DIR_MODE)).map_err(|e| {
                UploadError::with_source(
                    ErrorKind::DirectoryCreateError,
                    format!("failed to create directory `{}`", name),
                    e,
                )
            })?;
            extraction.directories += 1;
            extraction.markers.push(place_marker(&target));
            continue;
        }

        if let Some(parent) = target.parent() {
            create_dir_tree(parent, DEFAULT_DIR_MODE).map_err(|e| {
                UploadError::with_source(
                    ErrorKind::DirectoryCreateError,
                    format!("failed to create parent directory for `{}`", name),
                    e,
                )
            })?;
        }

        let mut out = create_truncated(&target, mode.unwrap_or(DEFAULT_FILE_MODE)).map_err(|e| {
            UploadError::with_source(ErrorKind::FileWriteError, format!("failed to create file `{}`", name), e)
        })?;
        io::copy(&mut entry, &mut out).map_err(|e| {
            UploadError::with_source(ErrorKind::FileWriteError, format!("failed to write file `{}`", name), e)
        })?;
        extraction.files += 1;
    }

    debug!(
        root = %root.display(),
        files = extraction.files,
        directories = extraction.directories,
        "archive extracted"
    );
    Ok(extraction)
}
