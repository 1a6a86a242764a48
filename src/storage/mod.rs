//! On-disk persistence of uploads: archive extraction and single-file writes.

mod extract;
mod writer;

use std::fs::{self, DirBuilder};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, UploadError, UploadResult};

pub use extract::{Extraction, MarkerOutcome};

pub const DEFAULT_DIR_MODE: u32 = 0o755;
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Creates `path` and any missing ancestors. Existing directories are fine;
/// an existing non-directory at `path` is an error.
pub(crate) fn create_dir_tree(path: &Path, mode: u32) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path)
}

/// Opens `path` for writing, creating it or truncating prior content.
pub(crate) fn create_truncated(path: &Path, mode: u32) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}

/// Base-path bound front for the extractor and the writer.
#[derive(Debug, Clone)]
pub struct UploadStore {
    base_path: PathBuf,
    staging_dir: Option<PathBuf>,
}

impl UploadStore {
    pub fn new(base_path: impl Into<PathBuf>, staging_dir: Option<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            staging_dir,
        }
    }

    /// `<base>/<filename without extension>` for an archive upload.
    pub fn folder_destination(&self, filename: &str) -> UploadResult<PathBuf> {
        let stem = Path::new(filename)
            .file_stem()
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| {
                UploadError::new(
                    ErrorKind::UnsupportedFormat,
                    format!("cannot derive a folder name from `{}`", filename),
                )
            })?;
        Ok(self.base_path.join(stem))
    }

    /// `<base>/<filename>`, keeping only the final path component.
    pub fn file_destination(&self, filename: &str) -> UploadResult<PathBuf> {
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| {
                UploadError::new(
                    ErrorKind::UnsafePath,
                    format!("`{}` is not a usable file name", filename),
                )
            })?;
        Ok(self.base_path.join(name))
    }

    pub fn extract_archive<R: Read>(&self, source: R, destination: &Path) -> UploadResult<Extraction> {
        extract::extract(source, destination, self.staging_dir.as_deref())
    }

    pub fn write_file<R: Read>(&self, source: R, destination: &Path) -> UploadResult<PathBuf> {
        writer::write_file(source, destination)
    }
}
