//! Image upload handling.
//!
//! Files are validated (extension allowlist, image MIME type, size cap)
//! before any disk write, then staged through a temporary file in the
//! upload directory and atomically persisted under a fresh UUID name. A
//! failed request never leaves a partial file behind.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use super::response::ApiResponse;
use crate::AppState;

const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];
const MAX_FILES_PER_REQUEST: usize = 10;

#[derive(Debug, Serialize)]
pub struct UploadedFile {
    pub url: String,
    pub filename: String,
    pub size: usize,
}

/// Accept one or more image files from a multipart form
pub async fn upload_images(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<Vec<UploadedFile>>>), ApiError> {
    let max_bytes = state.config.uploads.max_size_mb as usize * 1024 * 1024;
    let upload_dir = state.config.uploads.dir.clone();

    tokio::fs::create_dir_all(&upload_dir).await.map_err(|e| {
        tracing::error!("Failed to create upload directory: {}", e);
        ApiError::internal("Server error")
    })?;

    let mut uploaded = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::bad_request(format!("Invalid multipart request: {}", e))
    })? {
        if uploaded.len() >= MAX_FILES_PER_REQUEST {
            return Err(ApiError::bad_request(format!(
                "At most {} files per request",
                MAX_FILES_PER_REQUEST
            )));
        }

        let original_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::validation_field("file", "A filename is required"))?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;

        let extension = validate_upload(&original_name, bytes.len(), max_bytes)?;
        let stored_name = store_file(&upload_dir, &extension, bytes.clone()).await?;

        tracing::info!(
            user = %user.id,
            file = %stored_name,
            size = bytes.len(),
            "File uploaded"
        );
        uploaded.push(UploadedFile {
            url: format!("/uploads/{}", stored_name),
            filename: stored_name,
            size: bytes.len(),
        });
    }

    if uploaded.is_empty() {
        return Err(ApiError::validation_field("file", "No file provided"));
    }
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(uploaded).with_message("Upload successful")),
    ))
}

/// Reject anything that is not a reasonably sized image before touching
/// the disk. Returns the normalized extension.
pub(crate) fn validate_upload(
    filename: &str,
    size: usize,
    max_bytes: usize,
) -> Result<String, ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .ok_or_else(|| ApiError::validation_field("file", "File has no extension"))?;

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::validation_field(
            "file",
            format!(
                "File type .{} is not allowed; use one of: {}",
                extension,
                ALLOWED_EXTENSIONS.join(", ")
            ),
        ));
    }

    let mime = mime_guess::from_path(filename).first_or_octet_stream();
    if mime.type_() != mime_guess::mime::IMAGE {
        return Err(ApiError::validation_field("file", "Only image files are allowed"));
    }

    if size == 0 {
        return Err(ApiError::validation_field("file", "File is empty"));
    }
    if size > max_bytes {
        return Err(ApiError::validation_field(
            "file",
            format!("File exceeds the {} MB limit", max_bytes / (1024 * 1024)),
        ));
    }

    Ok(extension)
}

/// Stage the bytes in a temp file inside the upload directory, then
/// atomically persist under a fresh UUID name. Staging in the same
/// directory keeps the final rename on one filesystem.
pub(crate) async fn store_file(
    dir: &Path,
    extension: &str,
    bytes: Bytes,
) -> Result<String, ApiError> {
    let stored_name = format!("{}.{}", uuid::Uuid::new_v4(), extension);
    let final_path = dir.join(&stored_name);
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut staging = tempfile::NamedTempFile::new_in(&dir)?;
        staging.write_all(&bytes)?;
        staging.flush()?;
        staging.persist(&final_path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| {
        tracing::error!("Upload task panicked: {}", e);
        ApiError::internal("Server error")
    })?
    .map_err(|e| {
        tracing::error!("Failed to store upload: {}", e);
        ApiError::internal("Server error")
    })?;

    Ok(stored_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_MB: usize = 1024 * 1024;

    #[test]
    fn accepts_all_allowlisted_extensions() {
        for name in ["a.jpg", "b.JPEG", "c.png", "d.webp", "e.gif"] {
            let ext = validate_upload(name, 100, ONE_MB).unwrap();
            assert!(ALLOWED_EXTENSIONS.contains(&ext.as_str()));
        }
    }

    #[test]
    fn rejects_disallowed_extensions() {
        for name in ["run.exe", "page.html", "script.js", "archive.zip", "noext"] {
            assert!(validate_upload(name, 100, ONE_MB).is_err(), "{}", name);
        }
    }

    #[test]
    fn rejects_oversized_and_empty_files() {
        assert!(validate_upload("a.png", 0, ONE_MB).is_err());
        assert!(validate_upload("a.png", ONE_MB + 1, ONE_MB).is_err());
        assert!(validate_upload("a.png", ONE_MB, ONE_MB).is_ok());
    }

    #[tokio::test]
    async fn stored_file_lands_with_uuid_name() {
        let dir = tempfile::tempdir().unwrap();
        let name = store_file(dir.path(), "png", Bytes::from_static(b"not a real png"))
            .await
            .unwrap();

        assert!(name.ends_with(".png"));
        let contents = tokio::fs::read(dir.path().join(&name)).await.unwrap();
        assert_eq!(contents, b"not a real png");

        // Nothing but the persisted file remains
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
