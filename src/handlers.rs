use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tempfile::SpooledTempFile;
use tracing::{debug, error, info, warn};

use crate::error::{ErrorKind, UploadError};
use crate::intake::{self, UploadKind};
use crate::state::AppState;
use crate::storage::MarkerOutcome;

#[derive(Serialize)]
struct UploadData {
    path: String,
    filename: String,
    size: u64,
    uploaded_at: String,
}

#[derive(Serialize)]
struct UploadResponse {
    code: u16,
    message: &'static str,
    data: UploadData,
}

fn uploaded(message: &'static str, path: String, filename: String, size: u64) -> HttpResponse {
    HttpResponse::Ok().json(UploadResponse {
        code: 200,
        message,
        data: UploadData {
            path,
            filename,
            size,
            uploaded_at: Utc::now().to_rfc3339(),
        },
    })
}

fn log_failure(route: &str, filename: &str, err: &UploadError) {
    if err.kind.status().is_server_error() {
        error!(route, filename, kind = ?err.kind, error = %err.detail(), "upload failed");
    } else {
        warn!(route, filename, kind = ?err.kind, error = %err.detail(), "upload rejected");
    }
}

#[actix_web::route("/api/upload/folder", method = "POST")]
pub async fn upload_folder(
    payload: Multipart,
    state: web::Data<AppState>,
) -> Result<HttpResponse, UploadError> {
    let upload = intake::receive(payload, state.max_upload_bytes).await?;
    let kind = upload.kind();

    let result = store_folder(&state, &upload.filename, kind, upload.content).await;
    match result {
        Ok(path) => {
            info!(filename = %upload.filename, size = upload.size, path = %path, "folder uploaded");
            Ok(uploaded("folder uploaded (empty directories kept)", path, upload.filename, upload.size))
        }
        Err(err) => {
            log_failure("folder", &upload.filename, &err);
            Err(err)
        }
    }
}

/// Extracts `content` into the folder named after `filename`. The
/// destination stays claimed until the blocking extraction returns, even if
/// this future is dropped first.
async fn store_folder(
    state: &AppState,
    filename: &str,
    kind: UploadKind,
    content: SpooledTempFile,
) -> Result<String, UploadError> {
    if kind != UploadKind::Archive {
        return Err(UploadError::new(
            ErrorKind::UnsupportedFormat,
            format!("`{}` is not a .zip archive", filename),
        ));
    }

    let destination = state.store.folder_destination(filename)?;
    let claim = state.in_flight.claim(&destination)?;

    let store = state.store.clone();
    let extraction = web::block(move || {
        let _claim = claim;
        store.extract_archive(content, &destination)
    })
    .await??;

    for marker in &extraction.markers {
        match marker {
            MarkerOutcome::Failed { path, error } => {
                warn!(path = %path.display(), %error, "directory left without a marker");
            }
            other => debug!(path = %other.path().display(), "directory marker in place"),
        }
    }

    Ok(extraction.root.display().to_string())
}

#[actix_web::route("/api/upload/file", method = "POST")]
pub async fn upload_file(
    payload: Multipart,
    state: web::Data<AppState>,
) -> Result<HttpResponse, UploadError> {
    let upload = intake::receive(payload, state.max_upload_bytes).await?;

    let result = store_file(&state, &upload.filename, upload.content).await;
    match result {
        Ok(path) => {
            info!(filename = %upload.filename, size = upload.size, path = %path, "file uploaded");
            Ok(uploaded("file uploaded", path, upload.filename, upload.size))
        }
        Err(err) => {
            log_failure("file", &upload.filename, &err);
            Err(err)
        }
    }
}

async fn store_file(
    state: &AppState,
    filename: &str,
    content: SpooledTempFile,
) -> Result<String, UploadError> {
    let destination = state.store.file_destination(filename)?;
    let claim = state.in_flight.claim(&destination)?;

    let store = state.store.clone();
    let written = web::block(move || {
        let _claim = claim;
        store.write_file(content, &destination)
    })
    .await??;

    Ok(written.display().to_string())
}

#[actix_web::route("/health", method = "GET")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "message": "upload service is running, empty folders supported",
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(upload_folder)
        .service(upload_file)
        .service(health);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::UploadStore;
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App};
    use serde_json::Value;
    use std::fs;
    use crate::intake::SPOOL_MEMORY_LIMIT;
    use std::io::{Cursor, Seek, Write};
    use std::path::Path;
    use std::time::{Duration, Instant};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    const BOUNDARY: &str = "----keepdir-test-boundary";

    fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        write!(
            body,
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .unwrap();
        body.extend_from_slice(content);
        write!(body, "\r\n--{BOUNDARY}--\r\n").unwrap();
        body
    }

    fn project_zip() -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("src/main.txt", FileOptions::default()).unwrap();
        writer.write_all(b"hi").unwrap();
        writer.add_directory("docs/", FileOptions::default()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn state_for(base: &Path, staging: &Path) -> web::Data<AppState> {
        web::Data::new(AppState::new(
            UploadStore::new(base, Some(staging.to_path_buf())),
            None,
        ))
    }

    fn post(uri: &str, body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body)
    }

    fn is_empty_dir(dir: &Path) -> bool {
        fs::read_dir(dir).unwrap().next().is_none()
    }

    #[actix_web::test]
    async fn folder_upload_extracts_project() {
        let base = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(state_for(base.path(), staging.path()))
                .configure(configure),
        )
        .await;

        let archive = project_zip();
        let req = post("/api/upload/folder", multipart_body("file", "project.zip", &archive)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        let root = base.path().join("project");
        assert_eq!(body["code"], 200);
        assert_eq!(body["data"]["path"], root.display().to_string());
        assert_eq!(body["data"]["filename"], "project.zip");
        assert_eq!(body["data"]["size"], archive.len());

        assert_eq!(fs::read(root.join("src/main.txt")).unwrap(), b"hi");
        assert_eq!(fs::read(root.join("docs/.gitkeep")).unwrap(), b"");
        assert!(is_empty_dir(staging.path()));
    }

    #[actix_web::test]
    async fn folder_upload_rejects_non_zip() {
        let base = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(state_for(base.path(), staging.path()))
                .configure(configure),
        )
        .await;

        let req = post("/api/upload/folder", multipart_body("file", "notes.txt", b"plain")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], 400);
        assert_eq!(body["kind"], "UnsupportedFormat");
        assert!(is_empty_dir(base.path()));
    }

    #[actix_web::test]
    async fn missing_file_field_is_bad_request() {
        let base = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(state_for(base.path(), staging.path()))
                .configure(configure),
        )
        .await;

        for uri in ["/api/upload/folder", "/api/upload/file"] {
            let req = post(uri, multipart_body("attachment", "project.zip", b"x")).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["kind"], "MissingFile");

            let req = post(uri, Vec::new()).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["kind"], "MissingFile");
        }

        assert!(is_empty_dir(base.path()));
    }

    #[actix_web::test]
    async fn malformed_archive_is_server_error() {
        let base = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(state_for(base.path(), staging.path()))
                .configure(configure),
        )
        .await;

        let req = post("/api/upload/folder", multipart_body("file", "broken.zip", b"not a zip")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], 500);
        assert_eq!(body["kind"], "ArchiveOpenError");
        assert!(body["error"].as_str().unwrap().starts_with("failed to open ZIP archive"));
        assert!(!base.path().join("broken").exists());
        assert!(is_empty_dir(staging.path()));
    }

    #[actix_web::test]
    async fn file_upload_writes_under_base() {
        let base = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(state_for(base.path(), staging.path()))
                .configure(configure),
        )
        .await;

        let req = post("/api/upload/file", multipart_body("file", "report.csv", b"a,b\n")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        let target = base.path().join("report.csv");
        assert_eq!(body["data"]["path"], target.display().to_string());
        assert_eq!(body["data"]["size"], 4);
        assert_eq!(fs::read(target).unwrap(), b"a,b\n");
    }

    #[actix_web::test]
    async fn oversized_upload_is_rejected() {
        let base = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let state = web::Data::new(AppState::new(
            UploadStore::new(base.path(), Some(staging.path().to_path_buf())),
            Some(8),
        ));
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = post("/api/upload/file", multipart_body("file", "big.bin", &[0u8; 64])).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!base.path().join("big.bin").exists());
    }

    #[actix_web::test]
    async fn upload_above_spool_threshold_is_accepted_without_limit() {
        let base = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(state_for(base.path(), staging.path()))
                .configure(configure),
        )
        .await;

        let content = vec![7u8; SPOOL_MEMORY_LIMIT + (8 << 20)];
        let req = post("/api/upload/file", multipart_body("file", "large.bin", &content)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["size"], content.len());
        let written = fs::metadata(base.path().join("large.bin")).unwrap();
        assert_eq!(written.len(), content.len() as u64);
    }

    #[actix_web::test]
    async fn dropped_request_keeps_destination_claimed_until_extraction_ends() {
        const ENTRIES: usize = 2000;

        let base = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let state = state_for(base.path(), staging.path());
        let root = base.path().join("project");

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for i in 0..ENTRIES {
            writer
                .start_file(format!("files/{i:05}.txt"), FileOptions::default())
                .unwrap();
            writer.write_all(b"payload").unwrap();
        }
        let archive = writer.finish().unwrap().into_inner();

        let mut content = SpooledTempFile::new(SPOOL_MEMORY_LIMIT);
        content.write_all(&archive).unwrap();
        content.rewind().unwrap();

        let mut request = Box::pin(store_folder(&state, "project.zip", UploadKind::Archive, content));
        let _ = futures_util::poll!(request.as_mut());
        drop(request);

        // Whenever the destination can be claimed again, the extraction that
        // held it must already be complete.
        let deadline = Instant::now() + Duration::from_secs(60);
        loop {
            match state.in_flight.claim(&root) {
                Ok(_claim) => break,
                Err(err) => {
                    assert_eq!(err.kind, ErrorKind::DestinationBusy);
                    assert!(Instant::now() < deadline, "extraction never released the destination");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
        assert_eq!(fs::read_dir(root.join("files")).unwrap().count(), ENTRIES);
        assert!(is_empty_dir(staging.path()));
    }

    #[actix_web::test]
    async fn busy_destination_is_conflict() {
        let base = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let state = state_for(base.path(), staging.path());
        let _claim = state.in_flight.claim(&base.path().join("project")).unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = post("/api/upload/folder", multipart_body("file", "project.zip", &project_zip())).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert!(!base.path().join("project").exists());
    }

    #[actix_web::test]
    async fn health_reports_healthy() {
        let app = test::init_service(App::new().configure(configure)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
    }
}
