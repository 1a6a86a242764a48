use std::io::{Seek, Write};
use std::path::Path;

use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::web;
use futures_util::TryStreamExt;
use tempfile::SpooledTempFile;
use tracing::trace;

use crate::error::{ErrorKind, UploadError, UploadResult};

/// Multipart field that carries the upload.
pub const FILE_FIELD: &str = "file";

/// Bytes of an upload kept in memory before it spills to a temp file.
pub const SPOOL_MEMORY_LIMIT: usize = 32 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Archive,
    Single,
}

impl UploadKind {
    /// Archives are recognised by a literal `.zip` extension.
    pub fn classify(filename: &str) -> Self {
        match Path::new(filename).extension() {
            Some(ext) if ext == "zip" => UploadKind::Archive,
            _ => UploadKind::Single,
        }
    }
}

/// The received `file` field. `content` is rewound to the start.
pub struct Upload {
    pub filename: String,
    pub size: u64,
    pub content: SpooledTempFile,
}

impl Upload {
    pub fn kind(&self) -> UploadKind {
        UploadKind::classify(&self.filename)
    }
}

fn unreadable(err: MultipartError) -> UploadError {
    UploadError::with_source(
        ErrorKind::MissingFile,
        "multipart body could not be read",
        err.to_string(),
    )
}

fn spool_failed(err: std::io::Error) -> UploadError {
    UploadError::with_source(ErrorKind::TempFileError, "failed to spool upload", err)
}

async fn spool_field(field: &mut Field, limit: Option<u64>) -> UploadResult<(SpooledTempFile, u64)> {
    let mut spool = SpooledTempFile::new(SPOOL_MEMORY_LIMIT);
    let mut size = 0u64;

    while let Some(chunk) = field.try_next().await.map_err(unreadable)? {
        trace!(len = chunk.len(), "received chunk");
        size += chunk.len() as u64;
        if let Some(limit) = limit.filter(|limit| size > *limit) {
            return Err(UploadError::new(
                ErrorKind::PayloadTooLarge,
                format!("upload is larger than {} bytes", limit),
            ));
        }
        spool = web::block(move || spool.write_all(&chunk).map(|_| spool))
            .await?
            .map_err(spool_failed)?;
    }

    let spool = web::block(move || spool.rewind().map(|_| spool))
        .await?
        .map_err(spool_failed)?;
    Ok((spool, size))
}

async fn drain(field: &mut Field) -> UploadResult<()> {
    while field.try_next().await.map_err(unreadable)?.is_some() {}
    Ok(())
}

/// Reads the payload up to and including the first `file` field that has a
/// filename. Other fields are skipped. `limit` caps the size of the file.
pub async fn receive(mut payload: Multipart, limit: Option<u64>) -> UploadResult<Upload> {
    while let Some(mut field) = payload.try_next().await.map_err(unreadable)? {
        let (name, filename) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().map(str::to_owned),
                cd.get_filename().filter(|f| !f.is_empty()).map(str::to_owned),
            ),
            None => (None, None),
        };

        match filename {
            Some(filename) if name.as_deref() == Some(FILE_FIELD) => {
                let (content, size) = spool_field(&mut field, limit).await?;
                return Ok(Upload {
                    filename,
                    size,
                    content,
                });
            }
            _ => drain(&mut field).await?,
        }
    }

    Err(UploadError::new(
        ErrorKind::MissingFile,
        format!("request has no `{}` field", FILE_FIELD),
    ))
}
