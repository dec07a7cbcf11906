use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use chrono::Utc;

use crate::auth::middleware::{AdminUser, COOKIE_NAME};
use crate::auth::{jwt, password};
use crate::error::AppError;
use crate::models::admin::{AdminResponse, LoginRequest};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AdminResponse>), AppError> {
    let email = body.email.trim().to_lowercase();

    let admin = state
        .store
        .admin_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !password::verify_password(&body.password, &admin.password_hash)? {
        return Err(AppError::InvalidCredentials);
    }

    if let Err(e) = state.store.record_admin_login(admin.id, Utc::now()).await {
        tracing::warn!(admin_id = %admin.id, "Failed to record login time: {e}");
    }

    let token = jwt::create_token(admin.id, &admin.email, &state.config.jwt_secret)?;
    tracing::info!(admin_id = %admin.id, "Admin logged in");

    Ok((jar.add(build_auth_cookie(token)), Json(AdminResponse::from(admin))))
}

async fn logout(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(COOKIE_NAME).path("/"))
}

async fn me(admin: AdminUser) -> Json<AdminResponse> {
    Json(AdminResponse {
        id: admin.admin_id,
        email: admin.email,
    })
}

fn build_auth_cookie(token: String) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(jwt::TOKEN_EXPIRY_HOURS))
        .build()
}
