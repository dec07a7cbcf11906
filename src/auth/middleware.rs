use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::error::AppError;
use crate::AppState;

use super::jwt;

pub const COOKIE_NAME: &str = "token";

/// An authenticated administrator. Taking this as a handler argument
/// guards the route.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub admin_id: Uuid,
    pub email: String,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Unauthorized)?;

        // The cookie wins; API clients may send a bearer header instead.
        let token = jar
            .get(COOKIE_NAME)
            .map(|c| c.value().to_string())
            .or_else(|| bearer_token(parts))
            .ok_or(AppError::Unauthorized)?;

        let claims = jwt::validate_token(&token, &state.config.jwt_secret)?;

        Ok(AdminUser {
            admin_id: claims.sub,
            email: claims.email,
        })
    }
}
