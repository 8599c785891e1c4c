use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    files::{FileService, MAX_FILES_PER_REQUEST},
    models::{IncomingFile, StoredFile},
    response::ApiSuccess,
};

/// Reads every part named `field` from the form. Parts under other names
/// are skipped. Stops after `limit + 1` parts so an oversized batch is
/// reported without buffering all of it.
async fn read_files(
    multipart: &mut Multipart,
    field: &str,
    limit: usize,
) -> ApiResult<Vec<IncomingFile>> {
    let mut files = Vec::new();
    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Multipart error: {}", e.body_text())))?
    {
        if part.name() != Some(field) {
            continue;
        }
        let original_name = part.file_name().unwrap_or("upload").to_string();
        let mime_type = part
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = part
            .bytes()
            .await
            .map_err(|e| ApiError::validation(format!("Failed to read file: {}", e.body_text())))?;

        files.push(IncomingFile {
            original_name,
            mime_type,
            bytes: bytes.to_vec(),
        });
        if files.len() > limit {
            break;
        }
    }
    Ok(files)
}

/// upload_single
///
/// [Authenticated Route] Multipart form with one `file` part.
#[utoipa::path(
    post,
    path = "/upload/single",
    request_body(content_type = "multipart/form-data", description = "A `file` part"),
    responses(
        (status = 201, description = "File stored", body = StoredFile),
        (status = 400, description = "Missing or extra file, disallowed type or too large"),
        (status = 401, description = "Unauthenticated")
    ),
    tag = "uploads"
)]
pub async fn upload_single(
    AuthUser { principal, .. }: AuthUser,
    State(files): State<FileService>,
    mut multipart: Multipart,
) -> ApiResult<ApiSuccess> {
    let mut incoming = read_files(&mut multipart, "file", 1).await?;
    if incoming.len() > 1 {
        return Err(ApiError::validation(
            "Only one file allowed; use /upload/multiple for several",
        ));
    }
    let file = incoming
        .pop()
        .ok_or_else(|| ApiError::validation("No file uploaded"))?;

    let stored = files.upload_one(&principal, file).await?;
    Ok(ApiSuccess::created()
        .message("File uploaded successfully")
        .with("file", stored))
}

/// upload_multiple
///
/// [Authenticated Route] Up to five `files` parts. Files that fail their
/// checks are listed under `failed`; the request fails only when none was
/// stored.
#[utoipa::path(
    post,
    path = "/upload/multiple",
    request_body(content_type = "multipart/form-data", description = "Up to 5 `files` parts"),
    responses(
        (status = 201, description = "Files stored", body = serde_json::Value),
        (status = 400, description = "No file could be stored"),
        (status = 401, description = "Unauthenticated")
    ),
    tag = "uploads"
)]
pub async fn upload_multiple(
    AuthUser { principal, .. }: AuthUser,
    State(files): State<FileService>,
    mut multipart: Multipart,
) -> ApiResult<ApiSuccess> {
    let incoming = read_files(&mut multipart, "files", MAX_FILES_PER_REQUEST).await?;
    let report = files.upload_many(&principal, incoming).await?;

    let count = report.uploaded.len();
    Ok(ApiSuccess::created()
        .message(format!("{count} file(s) uploaded successfully"))
        .with("files", report.uploaded)
        .with("failed", report.failed))
}

#[utoipa::path(
    get,
    path = "/upload/list",
    responses(
        (status = 200, description = "Caller's files", body = serde_json::Value),
        (status = 401, description = "Unauthenticated")
    ),
    tag = "uploads"
)]
pub async fn list_files(
    AuthUser { principal, .. }: AuthUser,
    State(files): State<FileService>,
) -> ApiResult<ApiSuccess> {
    let objects = files.list(&principal).await?;
    let count = objects.len();
    Ok(ApiSuccess::ok().with("files", objects).with("count", count))
}

/// download_file
///
/// [Authenticated Route] Streams back one of the caller's own files as an
/// attachment.
#[utoipa::path(
    get,
    path = "/upload/download/{filename}",
    params(("filename" = String, Path, description = "Stored file name")),
    responses(
        (status = 200, description = "File content"),
        (status = 400, description = "Invalid filename"),
        (status = 404, description = "File not found")
    ),
    tag = "uploads"
)]
pub async fn download_file(
    AuthUser { principal, .. }: AuthUser,
    State(files): State<FileService>,
    Path(filename): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let (bytes, content_type) = files.download(&principal, &filename).await?;
    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

#[utoipa::path(
    delete,
    path = "/upload/{filename}",
    params(("filename" = String, Path, description = "Stored file name")),
    responses(
        (status = 200, description = "File deleted"),
        (status = 400, description = "Invalid filename"),
        (status = 401, description = "Unauthenticated")
    ),
    tag = "uploads"
)]
pub async fn delete_file(
    AuthUser { principal, .. }: AuthUser,
    State(files): State<FileService>,
    Path(filename): Path<String>,
) -> ApiResult<ApiSuccess> {
    files.remove(&principal, &filename).await?;
    Ok(ApiSuccess::ok().message("File deleted successfully"))
}
