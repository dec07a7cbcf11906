use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "photo_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PhotoStatus {
    Uploading,
    Pending,
    Approved,
    Rejected,
}

impl PhotoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Photo {
    pub id: Uuid,
    pub file_name: String,
    pub storage_key: String,
    pub thumbnail_key: Option<String>,
    pub content_type: String,
    pub file_size: i64,
    pub status: PhotoStatus,
    pub guest_token: Option<String>,
    pub guest_name: Option<String>,
    pub album_id: Option<Uuid>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub moderated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub file_name: String,
    pub storage_key: String,
    pub content_type: String,
    pub file_size: i64,
    pub guest_token: Option<String>,
    pub guest_name: Option<String>,
}

/// Which photos a listing returns, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoFilter {
    /// Approved only, newest first.
    Approved,
    /// Moderation queue, oldest first.
    Pending,
    /// Everything, newest first.
    All,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoResponse {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub file_size: i64,
    pub status: PhotoStatus,
    pub guest_name: Option<String>,
    pub album_id: Option<Uuid>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub moderated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub thumbnail_url: Option<String>,
    pub full_url: Option<String>,
}

impl Photo {
    pub fn into_response(
        self,
        thumbnail_url: Option<String>,
        full_url: Option<String>,
    ) -> PhotoResponse {
        PhotoResponse {
            id: self.id,
            file_name: self.file_name,
            content_type: self.content_type,
            file_size: self.file_size,
            status: self.status,
            guest_name: self.guest_name,
            album_id: self.album_id,
            uploaded_at: self.uploaded_at,
            moderated_at: self.moderated_at,
            created_at: self.created_at,
            thumbnail_url,
            full_url,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub guest_token: Option<String>,
    pub guest_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    pub upload_url: String,
    pub photo_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub photo_id: Uuid,
    #[serde(default)]
    pub file_name: String,
}
