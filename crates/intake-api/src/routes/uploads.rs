//! File uploads for prescriptions, licenses and ID proofs.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use database::FileRef;

use super::{created, Envelope};
use crate::error::{ApiError, Result};
use crate::state::AppState;
use crate::storage::{StorageError, Upload, UploadKind};

/// Multipart field that carries the file.
const FILE_FIELD: &str = "file";

/// Store one uploaded file and return its reference.
pub async fn upload(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Envelope<FileRef>>)> {
    let kind = UploadKind::parse(&kind)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown upload kind: {kind}")))?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await?;
        upload = Some(Upload {
            kind,
            original_name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let upload = upload.ok_or(StorageError::Empty)?;
    let file = state.files.store(upload).await?;
    Ok(created("File uploaded", file))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::routes::test_support::{request_json, test_app};

    const BOUNDARY: &str = "careconnect-boundary";

    fn multipart_request(uri: &str, field: &str, filename: &str, mime: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"{filename}\"\r\nContent-Type: {mime}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_pdf_upload_is_stored_and_served() {
        let app = test_app().await;
        let request = multipart_request(
            "/api/uploads/prescription",
            "file",
            "rx scan.pdf",
            "application/pdf",
            b"%PDF-1.4 test document",
        );

        let (status, json) = request_json(&app.app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["data"]["mimetype"], "application/pdf");
        assert_eq!(json["data"]["originalName"], "rx scan.pdf");
        let path = json["data"]["path"].as_str().unwrap().to_string();
        assert!(path.starts_with("/uploads/prescriptions/"));

        let response = app
            .app
            .clone()
            .oneshot(Request::builder().uri(&path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_mismatched_type_rejected() {
        let app = test_app().await;
        let request = multipart_request(
            "/api/uploads/license",
            "file",
            "notes.txt",
            "text/plain",
            b"plain text",
        );

        let (status, json) = request_json(&app.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let app = test_app().await;
        let request = multipart_request(
            "/api/uploads/id-proof",
            "attachment",
            "scan.pdf",
            "application/pdf",
            b"%PDF-1.4",
        );

        let (status, json) = request_json(&app.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "No file provided");
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let app = test_app().await;
        let request = multipart_request(
            "/api/uploads/selfie",
            "file",
            "scan.pdf",
            "application/pdf",
            b"%PDF-1.4",
        );

        let (status, _) = request_json(&app.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
