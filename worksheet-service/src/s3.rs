use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region},
    primitives::{ByteStream, DateTime, DateTimeFormat},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    config::EnvVars,
    error::{Error, storage_error},
};

#[derive(Clone, Debug)]
pub struct Storage {
    client: Client,
    bucket: String,
    endpoint: String,
    public_base: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Success,
    Partial,
    Error,
}

impl UploadStatus {
    /// `Error` when nothing was stored, `Partial` when anything failed.
    pub fn from_counts(stored: usize, failed: usize) -> Self {
        if stored == 0 {
            UploadStatus::Error
        } else if failed > 0 {
            UploadStatus::Partial
        } else {
            UploadStatus::Success
        }
    }

    pub fn stored_anything(self) -> bool {
        matches!(self, UploadStatus::Success | UploadStatus::Partial)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct UploadedFile {
    pub s3_key: String,
    pub bucket: String,
    pub public_url: String,
    pub file_size: u64,
    pub content_type: String,
    pub upload_time: String,
}

#[derive(Debug, Serialize)]
pub struct BundleUpload {
    pub status: UploadStatus,
    pub files: BTreeMap<String, UploadedFile>,
    pub errors: BTreeMap<String, String>,
    pub upload_time: String,
    pub folder: String,
}

#[derive(Debug, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub public_url: String,
    pub download_url: String,
}

#[derive(Debug, Serialize)]
pub struct FileListing {
    pub status: UploadStatus,
    pub prefix: String,
    pub files: Vec<StoredObject>,
    pub count: usize,
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
pub struct FileInfo {
    pub key: String,
    pub size: Option<i64>,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct StorageHealth {
    pub status: &'static str,
    pub bucket: String,
    pub endpoint: String,
    pub accessible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
}

impl StorageHealth {
    pub fn is_healthy(&self) -> bool {
        self.accessible
    }
}

impl Storage {
    /// Client for an S3 compatible endpoint (R2, MinIO, ...). Path style
    /// addressing is forced since most of them do not serve virtual hosts.
    pub async fn from_env(env_vars: &EnvVars) -> Self {
        let credentials = Credentials::new(
            &env_vars.s3_access_key_id,
            &env_vars.s3_secret_access_key,
            None,
            None,
            "worksheet-service",
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(env_vars.s3_region.clone()))
            .endpoint_url(&env_vars.s3_endpoint)
            .credentials_provider(credentials)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        let public_base = match &env_vars.s3_public_url {
            Some(url) => url.clone(),
            None => format!(
                "{}/{}",
                env_vars.s3_endpoint.trim_end_matches('/'),
                env_vars.s3_bucket_name
            ),
        };

        Storage::new(
            Client::from_conf(s3_config),
            &env_vars.s3_bucket_name,
            &env_vars.s3_endpoint,
            &public_base,
        )
    }

    pub fn new(client: Client, bucket: &str, endpoint: &str, public_base: &str) -> Self {
        Storage {
            client,
            bucket: bucket.to_string(),
            endpoint: endpoint.to_string(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key.trim_start_matches('/'))
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn upload_file(
        &self,
        path: &Path,
        key: &str,
        content_type: Option<&str>,
    ) -> Result<UploadedFile, Error> {
        let bytes = tokio::fs::read(path).await?;
        let file_size = bytes.len() as u64;
        let content_type = content_type.unwrap_or_else(|| content_type_for(path));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(storage_error)?;

        info!(key, file_size, "uploaded file");

        Ok(UploadedFile {
            s3_key: key.to_string(),
            bucket: self.bucket.clone(),
            public_url: self.public_url(key),
            file_size,
            content_type: content_type.to_string(),
            upload_time: Utc::now().to_rfc3339(),
        })
    }

    /// Uploads every file into one fresh folder below `folder_prefix`. The
    /// object name is the label plus the file's extension.
    #[instrument(skip(self, files), fields(count = files.len()))]
    pub async fn upload_bundle(&self, files: &[(String, PathBuf)], folder_prefix: &str) -> BundleUpload {
        let folder = bundle_folder(folder_prefix);

        let mut uploaded = BTreeMap::new();
        let mut errors = BTreeMap::new();
        for (label, path) in files {
            let key = format!("{folder}/{label}{}", dotted_extension(path));
            match self.upload_file(path, &key, None).await {
                Ok(file) => {
                    uploaded.insert(label.clone(), file);
                }
                Err(e) => {
                    warn!(label, "upload failed: {e}");
                    errors.insert(label.clone(), e.to_string());
                }
            }
        }

        BundleUpload {
            status: UploadStatus::from_counts(uploaded.len(), errors.len()),
            files: uploaded,
            errors,
            upload_time: Utc::now().to_rfc3339(),
            folder,
        }
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn list_files(&self, prefix: &str, max_keys: i32) -> Result<FileListing, Error> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(storage_error)?;

        let files: Vec<StoredObject> = output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?.to_string();
                Some(StoredObject {
                    size: object.size().unwrap_or_default(),
                    last_modified: object.last_modified().and_then(format_time),
                    etag: object.e_tag().map(String::from),
                    public_url: self.public_url(&key),
                    download_url: format!("/download/{key}"),
                    key,
                })
            })
            .collect();

        Ok(FileListing {
            status: UploadStatus::Success,
            prefix: prefix.to_string(),
            count: files.len(),
            files,
            truncated: output.is_truncated().unwrap_or(false),
        })
    }

    #[instrument(skip(self), err(Debug))]
    pub async fn file_info(&self, key: &str) -> Result<FileInfo, Error> {
        let output = match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    return Err(Error::NotFound("File not found".to_string()));
                }
                return Err(storage_error(err));
            }
        };

        Ok(FileInfo {
            key: key.to_string(),
            size: output.content_length(),
            content_type: output.content_type().map(String::from),
            last_modified: output.last_modified().and_then(format_time),
            etag: output.e_tag().map(String::from),
            metadata: output.metadata().cloned().unwrap_or_default(),
        })
    }

    /// Bucket is reachable and listable with the configured credentials.
    pub async fn health_check(&self) -> StorageHealth {
        let unhealthy = |error: String| StorageHealth {
            status: "unhealthy",
            bucket: self.bucket.clone(),
            endpoint: self.endpoint.clone(),
            accessible: false,
            object_count: None,
            error: Some(error),
            message: "S3 service is not accessible".to_string(),
        };

        if let Err(e) = self.client.head_bucket().bucket(&self.bucket).send().await {
            return unhealthy(storage_error(e).to_string());
        }

        match self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send()
            .await
        {
            Ok(output) => StorageHealth {
                status: "healthy",
                bucket: self.bucket.clone(),
                endpoint: self.endpoint.clone(),
                accessible: true,
                object_count: Some(output.key_count().unwrap_or_default()),
                error: None,
                message: "S3 service is working correctly".to_string(),
            },
            Err(e) => unhealthy(storage_error(e).to_string()),
        }
    }
}

/// `<prefix>/<YYYYmmdd_HHMMSS>_<8 hex chars>`
fn bundle_folder(prefix: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}/{timestamp}_{}", prefix.trim_end_matches('/'), &id[..8])
}

fn dotted_extension(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!(".{ext}"),
        None => String::new(),
    }
}

fn format_time(time: &DateTime) -> Option<String> {
    time.fmt(DateTimeFormat::DateTime).ok()
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "json" => "application/json",
        "txt" => "text/plain",
        "html" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "zip" => "application/zip",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use aws_sdk_s3::config::{Builder, retry::RetryConfig};

    pub(crate) fn storage_at(endpoint: &str, public_base: &str) -> Storage {
        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .credentials_provider(Credentials::new("id", "secret", None, None, "test"))
            .endpoint_url(endpoint)
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .build();
        Storage::new(Client::from_conf(config), "worksheets", endpoint, public_base)
    }

    pub(crate) fn offline_storage(public_base: &str) -> Storage {
        storage_at("http://127.0.0.1:9", public_base)
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for(Path::new("a/b.PDF")), "application/pdf");
        assert_eq!(
            content_type_for(Path::new("x.docx")),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(content_type_for(Path::new("x.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("x.bin")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn bundle_folders_are_timestamped() {
        let folder = bundle_folder("worksheets/الكسور/");
        let (prefix, leaf) = folder.rsplit_once('/').unwrap();
        assert_eq!(prefix, "worksheets/الكسور");
        // YYYYmmdd_HHMMSS_xxxxxxxx
        assert_eq!(leaf.len(), 8 + 1 + 6 + 1 + 8);
        assert!(leaf[16..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn upload_status_from_counts() {
        assert_eq!(UploadStatus::from_counts(3, 0), UploadStatus::Success);
        assert_eq!(UploadStatus::from_counts(2, 1), UploadStatus::Partial);
        assert_eq!(UploadStatus::from_counts(0, 0), UploadStatus::Error);
        assert!(!UploadStatus::Error.stored_anything());
    }

    #[test]
    fn public_urls_join_base_and_key() {
        let storage = offline_storage("https://cdn.example.com/");
        assert_eq!(
            storage.public_url("/worksheets/a.pdf"),
            "https://cdn.example.com/worksheets/a.pdf"
        );
    }

    #[tokio::test]
    async fn bundle_reports_error_when_nothing_uploads() {
        let storage = offline_storage("https://cdn.example.com");
        let files = vec![(
            "json_no_solutions".to_string(),
            PathBuf::from("/nonexistent/file.json"),
        )];
        let result = storage.upload_bundle(&files, "worksheets/test").await;
        assert_eq!(result.status, UploadStatus::Error);
        assert!(result.files.is_empty());
        assert!(result.errors.contains_key("json_no_solutions"));
        assert!(result.folder.starts_with("worksheets/test/"));
    }

    #[tokio::test]
    async fn unreachable_storage_is_unhealthy() {
        let storage = offline_storage("https://cdn.example.com");
        let health = storage.health_check().await;
        assert!(!health.is_healthy());
        assert_eq!(health.status, "unhealthy");
        assert!(health.error.is_some());
    }
}
