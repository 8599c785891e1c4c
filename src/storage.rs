use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use s3::primitives::ByteStream;
use thiserror::Error;

use crate::models::StoredObject;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

// 1. StorageService Contract
/// StorageService
///
/// The object store contract. Every path is relative to the configured
/// bucket; callers are responsible for namespacing (`{owner_id}/...`).
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    /// Lists objects directly under `prefix` (one level, no recursion).
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StorageError>;

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError>;

    /// Returns the object bytes and their stored content type.
    async fn download(&self, path: &str) -> Result<(Vec<u8>, String), StorageError>;

    /// Base of every public URL, bucket segment included.
    fn public_prefix(&self) -> String;

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_prefix(), sanitize_key(path))
    }

    /// Inverse of `public_url`. URLs pointing elsewhere yield `None`.
    fn path_from_public_url(&self, url: &str) -> Option<String> {
        let prefix = format!("{}/", self.public_prefix());
        let path = url.strip_prefix(&prefix)?;
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = sanitize_key(path);
        (!path.is_empty()).then_some(path)
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;

// 2. The Real Implementation (S3/MinIO/Supabase)
/// S3StorageClient
///
/// `StorageService` over the AWS SDK. S3 compatibility covers both the local
/// MinIO container and Supabase Storage's S3 gateway.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_base: String,
}

impl S3StorageClient {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_base: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            // MinIO and the Supabase gateway only understand path-style addressing.
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    /// ensure_bucket_exists
    ///
    /// Local-only convenience for the MinIO container. CreateBucket on an
    /// existing bucket fails harmlessly, so the error is only logged.
    pub async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = %e, "create_bucket skipped");
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(path))
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StorageError> {
        let prefix = format!("{}/", sanitize_key(prefix));
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket_name)
            .prefix(&prefix)
            .delimiter("/")
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                let name = key.strip_prefix(&prefix)?.to_string();
                let created_at = object
                    .last_modified()
                    .and_then(|ts| DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos()));
                Some(StoredObject {
                    url: self.public_url(key),
                    name,
                    size: object.size().and_then(|s| u64::try_from(s).ok()).unwrap_or_default(),
                    created_at,
                })
            })
            .collect())
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError> {
        for path in paths {
            self.client
                .delete_object()
                .bucket(&self.bucket_name)
                .key(sanitize_key(path))
                .send()
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<(Vec<u8>, String), StorageError> {
        let key = sanitize_key(path);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_no_such_key() => StorageError::NotFound(key.clone()),
                _ => StorageError::Backend(e.to_string()),
            })?;

        let content_type = output
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .into_bytes()
            .to_vec();
        Ok((bytes, content_type))
    }

    fn public_prefix(&self) -> String {
        format!("{}/{}", self.public_base, self.bucket_name)
    }
}

/// sanitize_key
///
/// Drops empty, `.` and `..` segments so a key can never climb out of its
/// namespace.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 3. The Mock Implementation (For Tests)
#[derive(Debug, Clone)]
struct MockObject {
    bytes: Vec<u8>,
    content_type: String,
    created_at: DateTime<Utc>,
}

/// MockStorageService
///
/// In-memory object store for the test suite. A failing instance rejects
/// every write and delete, which is how tests exercise best-effort cleanup.
#[derive(Debug, Default)]
pub struct MockStorageService {
    objects: Mutex<BTreeMap<String, MockObject>>,
    should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().contains_key(&sanitize_key(path))
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    pub fn put(&self, path: &str, bytes: &[u8], content_type: &str) {
        self.objects.lock().insert(
            sanitize_key(path),
            MockObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
                created_at: Utc::now(),
            },
        );
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.check()?;
        self.put(path, &bytes, content_type);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StorageError> {
        let prefix = format!("{}/", sanitize_key(prefix));
        let objects = self.objects.lock();
        Ok(objects
            .iter()
            .filter_map(|(key, object)| {
                let name = key.strip_prefix(&prefix)?;
                (!name.contains('/')).then(|| StoredObject {
                    name: name.to_string(),
                    size: object.bytes.len() as u64,
                    created_at: Some(object.created_at),
                    url: self.public_url(key),
                })
            })
            .collect())
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError> {
        self.check()?;
        let mut objects = self.objects.lock();
        for path in paths {
            objects.remove(&sanitize_key(path));
        }
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<(Vec<u8>, String), StorageError> {
        let key = sanitize_key(path);
        self.objects
            .lock()
            .get(&key)
            .map(|object| (object.bytes.clone(), object.content_type.clone()))
            .ok_or(StorageError::NotFound(key))
    }

    fn public_prefix(&self) -> String {
        "http://localhost:9000/mock-bucket".to_string()
    }
}
