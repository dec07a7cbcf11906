use axum::extract::{Path, State};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::middleware::AdminUser;
use crate::error::AppError;
use crate::models::photo::{CompleteUploadRequest, PhotoResponse, UploadUrlRequest, UploadUrlResponse};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/photos", get(list_approved))
        .route("/api/photos/upload-url", post(upload_url))
        .route("/api/photos/complete", post(complete))
        .route("/api/admin/photos", get(list_all))
        .route("/api/admin/photos/pending", get(list_pending))
        .route("/api/admin/photos/{id}/approve", patch(approve))
        .route("/api/admin/photos/{id}/reject", patch(reject))
        .route("/api/admin/photos/{id}", delete(delete_photo))
}

async fn list_approved(
    State(state): State<AppState>,
) -> Result<Json<Vec<PhotoResponse>>, AppError> {
    Ok(Json(state.photos.list_approved().await?))
}

async fn upload_url(
    State(state): State<AppState>,
    Json(body): Json<UploadUrlRequest>,
) -> Result<Json<UploadUrlResponse>, AppError> {
    Ok(Json(state.photos.request_upload(body).await?))
}

async fn complete(
    State(state): State<AppState>,
    Json(body): Json<CompleteUploadRequest>,
) -> Result<Json<PhotoResponse>, AppError> {
    Ok(Json(
        state
            .photos
            .complete_upload(body.photo_id, &body.file_name)
            .await?,
    ))
}

async fn list_all(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<PhotoResponse>>, AppError> {
    Ok(Json(state.photos.list_all().await?))
}

async fn list_pending(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<PhotoResponse>>, AppError> {
    Ok(Json(state.photos.list_pending().await?))
}

async fn approve(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.photos.approve(id).await?;
    Ok(Json(json!({ "message": "Photo approved successfully" })))
}

async fn reject(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.photos.reject(id).await?;
    Ok(Json(json!({ "message": "Photo rejected successfully" })))
}

async fn delete_photo(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.photos.delete(id).await?;
    Ok(Json(json!({ "message": "Photo deleted successfully" })))
}
