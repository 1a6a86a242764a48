//! Upload error type shared by intake, storage and the HTTP layer.

use std::fmt::Write as _;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What went wrong, independent of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// The request carried no `file` field.
    MissingFile,
    /// A folder upload whose filename is not a `.zip`.
    UnsupportedFormat,
    /// An archive entry or filename that would land outside its root.
    UnsafePath,
    PayloadTooLarge,
    /// Another upload is currently writing the same destination.
    DestinationBusy,
    TempFileError,
    ArchiveOpenError,
    DirectoryCreateError,
    FileWriteError,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::MissingFile | ErrorKind::UnsupportedFormat | ErrorKind::UnsafePath => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::DestinationBusy => StatusCode::CONFLICT,
            ErrorKind::TempFileError
            | ErrorKind::ArchiveOpenError
            | ErrorKind::DirectoryCreateError
            | ErrorKind::FileWriteError
            | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing summary used as the `message` of an error response.
    fn summary(self) -> &'static str {
        match self {
            ErrorKind::MissingFile => "no uploaded file found",
            ErrorKind::UnsupportedFormat => "only ZIP archives are accepted for folder uploads",
            ErrorKind::UnsafePath => "upload contains an unsafe path",
            ErrorKind::PayloadTooLarge => "upload exceeds the configured size limit",
            ErrorKind::DestinationBusy => "destination is already being written by another upload",
            _ => "upload failed",
        }
    }
}

/// A classified failure with stage context and the underlying cause.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct UploadError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

pub type UploadResult<T> = Result<T, UploadError>;

impl UploadError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source<E>(kind: ErrorKind, message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The message followed by every cause in the chain, `: `-separated.
    pub fn detail(&self) -> String {
        let mut out = self.message.clone();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            let _ = write!(out, ": {}", err);
            cause = err.source();
        }
        out
    }
}

impl From<actix_web::error::BlockingError> for UploadError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        UploadError::with_source(ErrorKind::Internal, "blocking task did not complete", err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: &'static str,
    kind: ErrorKind,
    error: String,
}

impl ResponseError for UploadError {
    fn status_code(&self) -> StatusCode {
        self.kind.status()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ErrorBody {
            code: status.as_u16(),
            message: self.kind.summary(),
            kind: self.kind,
            error: self.detail(),
        })
    }
}
