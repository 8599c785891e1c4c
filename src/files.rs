use std::sync::Arc;

use serde::Serialize;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{ApiError, ApiResult, FieldError},
    models::{IncomingFile, Principal, StoredFile, StoredObject},
    storage::{StorageError, StorageState},
};

pub const MAX_FILES_PER_REQUEST: usize = 5;

/// A file of a multi-upload that was not stored, and why.
#[derive(Debug, Clone, PartialEq, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct UploadFailure {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UploadReport {
    pub uploaded: Vec<StoredFile>,
    pub failed: Vec<UploadFailure>,
}

/// FileService
///
/// Stored files live under `{owner_id}/{generated_name}` in a single bucket.
/// The generated name is a fresh UUID per upload; the client filename is
/// only echoed back.
#[derive(Clone)]
pub struct FileService {
    storage: StorageState,
    allowed_mime: Arc<Vec<String>>,
    max_bytes: usize,
}

impl FileService {
    pub fn new(storage: StorageState, config: &AppConfig) -> Self {
        Self {
            storage,
            allowed_mime: Arc::new(config.allowed_mime_types.clone()),
            max_bytes: config.max_upload_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// MIME allow-list and size limit.
    pub fn check(&self, file: &IncomingFile) -> Result<(), String> {
        if !self.allowed_mime.iter().any(|m| m == &file.mime_type) {
            return Err(format!("Invalid file type: {}", file.mime_type));
        }
        if file.bytes.is_empty() {
            return Err("File is empty".to_string());
        }
        if file.bytes.len() > self.max_bytes {
            return Err(format!("File too large (limit {} bytes)", self.max_bytes));
        }
        Ok(())
    }

    pub async fn upload_one(&self, owner: &Principal, file: IncomingFile) -> ApiResult<StoredFile> {
        if let Err(reason) = self.check(&file) {
            return Err(ApiError::invalid_fields(
                reason.clone(),
                vec![FieldError::new("file", reason)],
            ));
        }
        self.store(owner, file).await
    }

    /// upload_many
    ///
    /// Each file is checked and stored on its own; failures are reported
    /// next to the successes. Fails as a whole only when nothing was stored.
    pub async fn upload_many(&self, owner: &Principal, files: Vec<IncomingFile>) -> ApiResult<UploadReport> {
        if files.is_empty() {
            return Err(ApiError::validation("No files uploaded"));
        }
        if files.len() > MAX_FILES_PER_REQUEST {
            return Err(ApiError::validation(format!(
                "At most {MAX_FILES_PER_REQUEST} files per request"
            )));
        }

        let mut report = UploadReport::default();
        for file in files {
            let name = file.original_name.clone();
            if let Err(reason) = self.check(&file) {
                report.failed.push(UploadFailure { name, reason });
                continue;
            }
            match self.store(owner, file).await {
                Ok(stored) => report.uploaded.push(stored),
                Err(e) => report.failed.push(UploadFailure {
                    name,
                    reason: e.to_string(),
                }),
            }
        }

        if report.uploaded.is_empty() {
            let fields = report
                .failed
                .iter()
                .map(|f| FieldError::new(f.name.clone(), f.reason.clone()))
                .collect();
            return Err(ApiError::invalid_fields("No files were uploaded", fields));
        }
        Ok(report)
    }

    async fn store(&self, owner: &Principal, file: IncomingFile) -> ApiResult<StoredFile> {
        let generated = generated_name(&file.original_name);
        let path = format!("{}/{}", owner.id, generated);
        let size = file.bytes.len() as u64;

        self.storage
            .upload(&path, file.bytes, &file.mime_type)
            .await
            .map_err(|e| ApiError::provider("File upload failed", e))?;

        tracing::info!(owner = %owner.id, path = %path, size, "file stored");
        Ok(StoredFile {
            name: file.original_name,
            url: self.storage.public_url(&path),
            path,
            mime_type: file.mime_type,
            size,
        })
    }

    pub async fn list(&self, owner: &Principal) -> ApiResult<Vec<StoredObject>> {
        self.storage
            .list(&owner.id.to_string())
            .await
            .map_err(|e| ApiError::provider("Failed to list files", e))
    }

    /// Returns the bytes and stored content type of one of the caller's files.
    pub async fn download(&self, owner: &Principal, filename: &str) -> ApiResult<(Vec<u8>, String)> {
        let path = owned_path(owner, filename)?;
        self.storage.download(&path).await.map_err(|e| match e {
            StorageError::NotFound(_) => ApiError::not_found("File not found"),
            other => ApiError::provider("File download failed", other),
        })
    }

    pub async fn remove(&self, owner: &Principal, filename: &str) -> ApiResult<()> {
        let path = owned_path(owner, filename)?;
        self.storage
            .remove(&[path.clone()])
            .await
            .map_err(|e| ApiError::provider("File deletion failed", e))?;
        tracing::info!(owner = %owner.id, path = %path, "file removed");
        Ok(())
    }
}

/// `{uuid}.{ext}`, keeping only a short alphanumeric extension of the
/// client's filename.
fn generated_name(original: &str) -> String {
    let ext = original
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    match ext {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    }
}

/// A filename addressed within the caller's namespace. Separators and
/// parent references are rejected.
fn owned_path(owner: &Principal, filename: &str) -> ApiResult<String> {
    let invalid = filename.trim().is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..");
    if invalid {
        return Err(ApiError::invalid_fields(
            "Invalid filename",
            vec![FieldError::new("filename", "must be a plain file name")],
        ));
    }
    Ok(format!("{}/{}", owner.id, filename))
}

