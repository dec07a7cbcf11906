use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::middleware::AdminUser;
use crate::error::AppError;
use crate::models::guest::{DeleteSelectedRequest, Guest, GuestPortalResponse, RegisterGuestRequest};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/guests/register", post(register))
        .route("/api/guest-portal/{token}", get(guest_portal))
        .route("/api/guests", get(list_guests))
        .route("/api/guests/pending", get(list_pending))
        .route("/api/guests/{id}/approve", post(approve))
        .route("/api/guests/{id}/reject", post(reject))
        .route("/api/guests/all", delete(delete_all))
        .route("/api/guests/delete-selected", post(delete_selected))
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterGuestRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let guest = state.guests.register(body.into_new_guest()?).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Registration submitted successfully", "guest": guest })),
    ))
}

async fn guest_portal(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<GuestPortalResponse>, AppError> {
    let guest = state.guests.get_by_portal_token(&token).await?;
    Ok(Json(guest.into()))
}

async fn list_guests(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<Guest>>, AppError> {
    Ok(Json(state.guests.list().await?))
}

async fn list_pending(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<Guest>>, AppError> {
    Ok(Json(state.guests.list_pending().await?))
}

async fn approve(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let guest = state.guests.approve(id).await?;
    Ok(Json(
        json!({ "message": "Guest registration approved successfully", "guest": guest }),
    ))
}

async fn reject(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.guests.reject(id).await?;
    Ok(Json(json!({ "message": "Guest registration rejected" })))
}

async fn delete_all(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Value>, AppError> {
    let count = state.guests.delete_all().await?;
    Ok(Json(
        json!({ "message": "All guests deleted successfully", "count": count }),
    ))
}

async fn delete_selected(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(body): Json<DeleteSelectedRequest>,
) -> Result<Json<Value>, AppError> {
    let count = state.guests.delete_selected(body.guest_ids).await?;
    Ok(Json(json!({
        "message": format!("{count} guests deleted successfully"),
        "count": count,
    })))
}
