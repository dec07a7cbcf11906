use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::photo::{
    NewPhoto, Photo, PhotoFilter, PhotoResponse, PhotoStatus, UploadUrlRequest, UploadUrlResponse,
};
use crate::storage::{StorageBackend, READ_URL_TTL, UPLOAD_URL_TTL};
use crate::store::{Store, Transition};
use crate::tasks::{BackgroundTask, TaskQueue};
use crate::token;

/// Accepted content types and the extension their objects are stored under.
const ALLOWED_MIME_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_MIME_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}

const MAX_UPLOAD_SIZE: i64 = 10 * 1024 * 1024; // 10 MiB

/// Storage keys tried before upload issuance gives up.
const KEY_ATTEMPTS: usize = 3;

/// `photos/YYYY/MM/DD/<random>.<ext>`. The client's file name plays no part.
fn storage_key(ext: &str) -> String {
    format!(
        "photos/{}/{}.{ext}",
        Utc::now().format("%Y/%m/%d"),
        token::random_hex(16)
    )
}

fn thumbnail_key(storage_key: &str) -> String {
    let stem = match storage_key.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => storage_key,
    };
    format!("{stem}_thumb.jpg")
}

#[derive(Clone)]
pub struct PhotoUploadCoordinator {
    store: Arc<dyn Store>,
    storage: StorageBackend,
    tasks: TaskQueue,
}

impl PhotoUploadCoordinator {
    pub fn new(store: Arc<dyn Store>, storage: StorageBackend, tasks: TaskQueue) -> Self {
        Self {
            store,
            storage,
            tasks,
        }
    }

    /// Phase one of an upload: reserve a storage key and hand back a
    /// short-lived write URL for it.
    ///
    /// The row is inserted before the URL is presigned, so no store write
    /// is pending while the storage service is contacted.
    pub async fn request_upload(
        &self,
        request: UploadUrlRequest,
    ) -> Result<UploadUrlResponse, AppError> {
        let content_type = request.file_type.trim().to_lowercase();
        let Some(ext) = extension_for(&content_type) else {
            return Err(AppError::Validation(
                "Invalid file type. Only images are allowed.".into(),
            ));
        };
        if request.file_size <= 0 {
            return Err(AppError::Validation("File is empty".into()));
        }
        if request.file_size > MAX_UPLOAD_SIZE {
            return Err(AppError::Validation(
                "File size too large. Maximum 10MB allowed.".into(),
            ));
        }

        let guest_token = request.guest_token.filter(|t| !t.is_empty());
        if let Some(token) = &guest_token {
            self.store
                .guest_by_portal_token(token)
                .await?
                .ok_or_else(|| AppError::NotFound("Invalid guest portal link".into()))?;
        }
        let guest_name = request
            .guest_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let mut attempt = 0;
        let photo = loop {
            attempt += 1;
            let new_photo = NewPhoto {
                file_name: request.file_name.clone(),
                storage_key: storage_key(ext),
                content_type: content_type.clone(),
                file_size: request.file_size,
                guest_token: guest_token.clone(),
                guest_name: guest_name.clone(),
            };
            match self.store.insert_photo(new_photo).await {
                Ok(photo) => break photo,
                Err(e) if e.is_unique_violation() && attempt < KEY_ATTEMPTS => {
                    tracing::warn!(attempt, "Storage key collision, retrying");
                }
                Err(e) => return Err(e),
            }
        };

        let upload_url = self
            .storage
            .presign_upload(&photo.storage_key, &photo.content_type, UPLOAD_URL_TTL)
            .await?;

        tracing::info!(photo_id = %photo.id, key = %photo.storage_key, "Upload URL issued");
        Ok(UploadUrlResponse {
            upload_url,
            photo_id: photo.id,
        })
    }

    /// Phase two: the client has written the object. Moves the photo into
    /// the moderation queue and schedules processing.
    pub async fn complete_upload(
        &self,
        photo_id: Uuid,
        file_name: &str,
    ) -> Result<PhotoResponse, AppError> {
        let photo = self
            .store
            .photo_by_id(photo_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Photo not found".into()))?;

        let photo = match self
            .store
            .complete_photo_upload(photo_id, &thumbnail_key(&photo.storage_key), Utc::now())
            .await?
        {
            Transition::Applied(photo) => photo,
            Transition::NotFound => return Err(AppError::NotFound("Photo not found".into())),
            Transition::StateMismatch { actual } => {
                return Err(AppError::Conflict(format!(
                    "Photo is {}, expected uploading",
                    actual.as_str()
                )));
            }
        };

        tracing::info!(photo_id = %photo.id, file_name, "Photo upload completed");
        self.tasks.submit(BackgroundTask::ProcessPhoto {
            photo: photo.clone(),
        });
        Ok(self.with_urls(photo).await)
    }

    pub async fn approve(&self, photo_id: Uuid) -> Result<Photo, AppError> {
        self.moderate(photo_id, PhotoStatus::Approved).await
    }

    pub async fn reject(&self, photo_id: Uuid) -> Result<Photo, AppError> {
        self.moderate(photo_id, PhotoStatus::Rejected).await
    }

    async fn moderate(&self, photo_id: Uuid, status: PhotoStatus) -> Result<Photo, AppError> {
        let photo = self
            .store
            .moderate_photo(photo_id, status, Utc::now())
            .await?
            .ok_or_else(|| AppError::NotFound("Photo not found".into()))?;
        tracing::info!(photo_id = %photo.id, status = status.as_str(), "Photo moderated");
        Ok(photo)
    }

    /// Removes the row even when the stored objects cannot be deleted.
    pub async fn delete(&self, photo_id: Uuid) -> Result<(), AppError> {
        let photo = self
            .store
            .delete_photo(photo_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Photo not found".into()))?;

        self.storage.delete_logged(&photo.storage_key).await;
        if let Some(thumb) = &photo.thumbnail_key {
            self.storage.delete_logged(thumb).await;
        }
        tracing::info!(photo_id = %photo.id, "Photo deleted");
        Ok(())
    }

    pub async fn list_approved(&self) -> Result<Vec<PhotoResponse>, AppError> {
        self.list(PhotoFilter::Approved).await
    }

    pub async fn list_pending(&self) -> Result<Vec<PhotoResponse>, AppError> {
        self.list(PhotoFilter::Pending).await
    }

    pub async fn list_all(&self) -> Result<Vec<PhotoResponse>, AppError> {
        self.list(PhotoFilter::All).await
    }

    async fn list(&self, filter: PhotoFilter) -> Result<Vec<PhotoResponse>, AppError> {
        let photos = self.store.list_photos(filter).await?;
        let mut responses = Vec::with_capacity(photos.len());
        for photo in photos {
            responses.push(self.with_urls(photo).await);
        }
        Ok(responses)
    }

    /// Attach freshly minted read URLs. A URL that cannot be presigned is
    /// left out rather than failing the listing.
    async fn with_urls(&self, photo: Photo) -> PhotoResponse {
        let thumbnail_url = match &photo.thumbnail_key {
            Some(key) => self.read_url(photo.id, key).await,
            None => None,
        };
        let full_url = self.read_url(photo.id, &photo.storage_key).await;
        photo.into_response(thumbnail_url, full_url)
    }

    async fn read_url(&self, photo_id: Uuid, key: &str) -> Option<String> {
        match self.storage.presign_read(key, READ_URL_TTL).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(%photo_id, key, "Failed to presign read URL: {e}");
                None
            }
        }
    }
}
