use std::io::{self, Read};
use std::path::{Path, PathBuf};

use super::{create_dir_tree, create_truncated, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use crate::error::{ErrorKind, UploadError, UploadResult};

/// Streams `source` into `destination`, creating its parent directories and
/// replacing any previous content.
pub fn write_file<R: Read>(mut source: R, destination: &Path) -> UploadResult<PathBuf> {
    if let Some(parent) = destination.parent() {
        create_dir_tree(parent, DEFAULT_DIR_MODE).map_err(|e| {
            UploadError::with_source(
                ErrorKind::DirectoryCreateError,
                format!("failed to create directory `{}`", parent.display()),
                e,
            )
        })?;
    }

    let mut out = create_truncated(destination, DEFAULT_FILE_MODE).map_err(|e| {
        UploadError::with_source(
            ErrorKind::FileWriteError,
            format!("failed to create file `{}`", destination.display()),
            e,
        )
    })?;
    io::copy(&mut source, &mut out).map_err(|e| {
        UploadError::with_source(
            ErrorKind::FileWriteError,
            format!("failed to save file `{}`", destination.display()),
            e,
        )
    })?;

    Ok(destination.to_path_buf())
}
