//! Upload storage.
//!
//! Uploads are checked for size and type, written under a per-kind
//! directory and described by a [`FileRef`] that intake records keep.

use std::path::PathBuf;

use async_trait::async_trait;
use database::FileRef;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Largest accepted upload, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Accepted upload MIME types.
pub const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "application/pdf"];

/// URL prefix stored files are served under.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// What an upload is for; each kind has its own directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Prescription,
    License,
    IdProof,
}

impl UploadKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "prescription" | "prescriptions" => Some(UploadKind::Prescription),
            "license" | "licenses" => Some(UploadKind::License),
            "id-proof" | "idproof" | "id-proofs" => Some(UploadKind::IdProof),
            _ => None,
        }
    }

    pub fn dir_name(&self) -> &'static str {
        match self {
            UploadKind::Prescription => "prescriptions",
            UploadKind::License => "licenses",
            UploadKind::IdProof => "id-proofs",
        }
    }
}

/// A received file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub kind: UploadKind,
    pub original_name: String,
    /// Declared content type.
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Upload errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File too large ({size} bytes, max {max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("File type not supported: {0} (allowed: JPEG, PNG, PDF)")]
    UnsupportedType(String),

    #[error("No file provided")]
    Empty,

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Somewhere uploads can be kept.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Check and store an upload.
    async fn store(&self, upload: Upload) -> Result<FileRef, StorageError>;
}

/// Stores uploads on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(&self, upload: Upload) -> Result<FileRef, StorageError> {
        let mimetype = check_upload(&upload)?;

        let dir = self.root.join(upload.kind.dir_name());
        tokio::fs::create_dir_all(&dir).await?;

        let filename = format!("{}-{}", Uuid::new_v4(), sanitize_filename(&upload.original_name));
        tokio::fs::write(dir.join(&filename), &upload.bytes).await?;

        info!(
            kind = upload.kind.dir_name(),
            filename = %filename,
            size = upload.bytes.len(),
            "Stored upload"
        );

        Ok(FileRef {
            path: format!("{}/{}/{}", PUBLIC_PREFIX, upload.kind.dir_name(), filename),
            filename,
            original_name: upload.original_name,
            size: upload.bytes.len() as u64,
            mimetype: mimetype.to_string(),
        })
    }
}

/// Check size and type; returns the accepted MIME type.
///
/// The declared type must be allowed and agree with the file's leading bytes.
pub fn check_upload(upload: &Upload) -> Result<&'static str, StorageError> {
    if upload.bytes.is_empty() {
        return Err(StorageError::Empty);
    }
    if upload.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(StorageError::TooLarge {
            size: upload.bytes.len(),
            max: MAX_UPLOAD_BYTES,
        });
    }

    let declared = upload.content_type.trim().to_lowercase();
    match detect_mime(&upload.bytes) {
        Some(detected) if ALLOWED_MIME_TYPES.contains(&detected) && declared == detected => {
            Ok(detected)
        }
        _ => Err(StorageError::UnsupportedType(declared)),
    }
}

/// MIME type from magic bytes, for the accepted formats.
fn detect_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(b"%PDF") {
        Some("application/pdf")
    } else {
        None
    }
}

/// Keep a safe basename: ASCII alphanumerics, `.`, `-` and `_`.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}
