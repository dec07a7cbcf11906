use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::auth::middleware::AdminUser;
use crate::error::AppError;
use crate::models::guest::RsvpFormResponse;
use crate::models::rsvp::{RsvpListResponse, SubmitRsvpRequest};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/rsvp/{token}", get(rsvp_form))
        .route("/api/rsvp/{token}/submit", post(submit))
        .route("/api/rsvps", get(list_rsvps))
        .route("/api/rsvps/export", get(export))
}

async fn rsvp_form(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<RsvpFormResponse>, AppError> {
    let guest = state.guests.get_by_invite_token(&token).await?;
    Ok(Json(guest.into()))
}

async fn submit(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(body): Json<SubmitRsvpRequest>,
) -> Result<Json<Value>, AppError> {
    state.rsvps.submit(&token, body).await?;
    Ok(Json(json!({ "message": "RSVP submitted successfully" })))
}

async fn list_rsvps(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<RsvpListResponse>, AppError> {
    Ok(Json(state.rsvps.list_all().await?))
}

async fn export(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<impl IntoResponse, AppError> {
    let csv = state.rsvps.export_csv().await?;
    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8"),
            (CONTENT_DISPOSITION, "attachment; filename=rsvps.csv"),
        ],
        csv,
    ))
}
