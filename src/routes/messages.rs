use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::middleware::AdminUser;
use crate::error::AppError;
use crate::models::message::{MessageListResponse, MessageStatus, NewMessage, SendMessageRequest};
use crate::AppState;

const MAX_MESSAGE_LEN: usize = 5000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/messages", post(send_message).get(list_messages))
        .route("/api/messages/{id}/read", patch(mark_read))
}

/// Guests write in from their portal; the portal token must still belong
/// to a live guest.
async fn send_message(
    State(state): State<AppState>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let content = body.message.trim();
    if content.is_empty() {
        return Err(AppError::Validation("Message cannot be empty".into()));
    }
    if content.chars().count() > MAX_MESSAGE_LEN {
        return Err(AppError::Validation(format!(
            "Message cannot exceed {MAX_MESSAGE_LEN} characters"
        )));
    }

    let guest = state.guests.get_by_portal_token(&body.guest_token).await?;
    let guest_name = body
        .guest_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| guest.full_name());

    let message = state
        .store
        .insert_message(NewMessage {
            guest_token: body.guest_token,
            guest_name,
            content: content.to_string(),
        })
        .await?;
    tracing::info!(message_id = %message.id, guest_id = %guest.id, "Message received");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Message sent successfully", "id": message.id })),
    ))
}

async fn list_messages(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<MessageListResponse>, AppError> {
    let messages = state.store.list_messages().await?;
    let unread_count = messages
        .iter()
        .filter(|m| m.status == MessageStatus::Unread)
        .count();
    Ok(Json(MessageListResponse {
        messages,
        unread_count,
    }))
}

async fn mark_read(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state
        .store
        .mark_message_read(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".into()))?;
    Ok(Json(json!({ "message": "Message marked as read" })))
}
