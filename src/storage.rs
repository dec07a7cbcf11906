use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;

use crate::config::S3Config;
use crate::error::AppError;

/// Write URLs handed to uploaders.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(15 * 60);
/// Read URLs attached to photo listings.
pub const READ_URL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(config: &S3Config) -> Self {
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        match (&config.access_key_id, &config.secret_access_key) {
            (Some(id), Some(secret)) => {
                builder = builder.credentials_provider(Credentials::new(
                    id.as_str(),
                    secret.as_str(),
                    None,
                    None,
                    "environment",
                ));
            }
            _ => tracing::warn!("S3 credentials not configured; presigning will fail"),
        }

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        }
    }

    fn presigning(ttl: Duration) -> Result<PresigningConfig, AppError> {
        PresigningConfig::expires_in(ttl)
            .map_err(|e| AppError::Storage(format!("Invalid presign expiry: {e}")))
    }

    pub async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String, AppError> {
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to presign upload for {key}: {e}")))?;
        Ok(request.uri().to_string())
    }

    pub async fn presign_read(&self, key: &str, ttl: Duration) -> Result<String, AppError> {
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presigning(ttl)?)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to presign read for {key}: {e}")))?;
        Ok(request.uri().to_string())
    }

    pub async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete {key}: {e}")))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    deleted: Vec<String>,
    failing_keys: HashSet<String>,
    unavailable: bool,
}

/// Object store stand-in for local development and tests. Issues
/// `memory://` URLs and records deletions.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

fn poisoned<T>(_: PoisonError<T>) -> AppError {
    AppError::Storage("memory storage lock poisoned".into())
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the store were unreachable.
    #[cfg(test)]
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = unavailable;
        }
    }

    /// Make deletion of one key fail.
    #[cfg(test)]
    pub fn fail_deletes_of(&self, key: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_keys.insert(key.to_string());
        }
    }

    #[cfg(test)]
    pub fn deleted_keys(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.deleted.clone())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.state.lock().map_err(poisoned)?.unavailable {
            return Err(AppError::Storage("memory storage unavailable".into()));
        }
        Ok(())
    }

    pub fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String, AppError> {
        self.check_available()?;
        Ok(format!(
            "memory://{key}?method=PUT&content-type={content_type}&expires={}",
            ttl.as_secs()
        ))
    }

    pub fn presign_read(&self, key: &str, ttl: Duration) -> Result<String, AppError> {
        self.check_available()?;
        Ok(format!("memory://{key}?method=GET&expires={}", ttl.as_secs()))
    }

    pub fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        if state.unavailable || state.failing_keys.contains(key) {
            return Err(AppError::Storage(format!("Failed to delete {key}")));
        }
        state.deleted.push(key.to_string());
        Ok(())
    }
}

#[derive(Clone)]
pub enum StorageBackend {
    S3(S3Storage),
    Memory(MemoryStorage),
}

impl StorageBackend {
    pub async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String, AppError> {
        match self {
            Self::S3(s) => s.presign_upload(key, content_type, ttl).await,
            Self::Memory(s) => s.presign_upload(key, content_type, ttl),
        }
    }

    pub async fn presign_read(&self, key: &str, ttl: Duration) -> Result<String, AppError> {
        match self {
            Self::S3(s) => s.presign_read(key, ttl).await,
            Self::Memory(s) => s.presign_read(key, ttl),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), AppError> {
        match self {
            Self::S3(s) => s.delete(key).await,
            Self::Memory(s) => s.delete(key),
        }
    }

    /// Best-effort deletion: a failure is logged and swallowed.
    pub async fn delete_logged(&self, key: &str) {
        if let Err(e) = self.delete(key).await {
            tracing::warn!(key, "Failed to delete stored object: {e}");
        }
    }
}
