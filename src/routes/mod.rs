pub mod auth;
pub mod guests;
pub mod messages;
pub mod photos;
pub mod rsvps;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .merge(auth::router())
        .merge(guests::router())
        .merge(rsvps::router())
        .merge(photos::router())
        .merge(messages::router())
}

async fn health(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.store.ping().await?;
    Ok(Json(json!({ "status": "ok" })))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE, SET_COOKIE};
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::{jwt, password};
    use crate::models::message::MessageStatus;
    use crate::store::Store;
    use crate::test_support::{Harness, JWT_SECRET};

    fn app(h: &Harness) -> Router {
        api_router().with_state(h.state())
    }

    fn admin_token() -> String {
        jwt::create_token(Uuid::new_v4(), "admin@example.com", JWT_SECRET).unwrap()
    }

    fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder().method(method).uri(uri);
        match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn as_admin(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
        let mut req = request(method, uri, body);
        req.headers_mut().insert(
            AUTHORIZATION,
            format!("Bearer {}", admin_token()).parse().unwrap(),
        );
        req
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn registration(first_name: &str) -> Value {
        json!({
            "firstName": first_name,
            "lastName": "Silva",
            "email": format!("{first_name}@example.com"),
            "dec24": { "attendance": true },
            "accommodation": { "dec23": true }
        })
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let h = Harness::new();
        let response = app(&h)
            .oneshot(request(Method::GET, "/api/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn admin_routes_require_a_session() {
        let h = Harness::new();
        for (method, uri) in [
            (Method::GET, "/api/guests"),
            (Method::GET, "/api/rsvps"),
            (Method::GET, "/api/rsvps/export"),
            (Method::GET, "/api/admin/photos"),
            (Method::GET, "/api/messages"),
        ] {
            let response = app(&h).oneshot(request(method, uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }

        let mut forged = request(Method::GET, "/api/guests", None);
        let token = jwt::create_token(Uuid::new_v4(), "x@example.com", "wrong").unwrap();
        forged
            .headers_mut()
            .insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        let response = app(&h).oneshot(forged).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_sets_a_session_cookie() {
        let h = Harness::new();
        let hash = password::hash_new_password("hunter2hunter2").unwrap();
        h.store.insert_admin("admin@example.com", &hash).await.unwrap();

        let bad = app(&h)
            .oneshot(request(
                Method::POST,
                "/api/auth/login",
                Some(json!({ "email": "admin@example.com", "password": "nope" })),
            ))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);

        let response = app(&h)
            .oneshot(request(
                Method::POST,
                "/api/auth/login",
                Some(json!({ "email": " Admin@Example.com ", "password": "hunter2hunter2" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("token="));
        assert!(cookie.contains("HttpOnly"));

        let session = cookie.split(';').next().unwrap().to_string();
        let mut me = request(Method::GET, "/api/auth/me", None);
        me.headers_mut().insert(COOKIE, session.parse().unwrap());
        let response = app(&h).oneshot(me).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["email"], "admin@example.com");
    }

    #[tokio::test]
    async fn guest_journey_over_http() {
        let h = Harness::new();

        let response = app(&h)
            .oneshot(request(Method::POST, "/api/guests/register", Some(registration("Ana"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["guest"]["registrationStatus"], "pending");
        assert!(body["guest"]["inviteToken"].is_null());
        let id = body["guest"]["id"].as_str().unwrap().to_string();

        let response = app(&h)
            .oneshot(as_admin(Method::GET, "/api/guests/pending", None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);

        let approve = format!("/api/guests/{id}/approve");
        let response = app(&h)
            .oneshot(as_admin(Method::POST, &approve, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let guest = json_body(response).await["guest"].clone();
        let invite = guest["inviteToken"].as_str().unwrap().to_string();
        let portal = guest["guestPortalToken"].as_str().unwrap().to_string();

        let response = app(&h)
            .oneshot(as_admin(Method::POST, &approve, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(json_body(response).await["error"].as_str().unwrap().contains("approved"));

        let response = app(&h)
            .oneshot(request(Method::GET, &format!("/api/rsvp/{invite}"), None))
            .await
            .unwrap();
        let form = json_body(response).await;
        assert_eq!(form["hasRsvp"], false);
        assert_eq!(form["dec24Attendance"], true);

        let response = app(&h)
            .oneshot(request(
                Method::POST,
                &format!("/api/rsvp/{invite}/submit"),
                Some(json!({
                    "response": "yes",
                    "message": "Looking forward to it",
                    "updatedDetails": {
                        "partySize": 3,
                        "partyMembers": [
                            { "firstName": "Rui", "lastName": "Silva", "dietaryPreference": "vegan" },
                            { "firstName": "Leo", "lastName": "Silva" }
                        ]
                    }
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app(&h)
            .oneshot(request(Method::GET, &format!("/api/guest-portal/{portal}"), None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["firstName"], "Ana");

        let response = app(&h)
            .oneshot(as_admin(Method::GET, "/api/rsvps", None))
            .await
            .unwrap();
        let listing = json_body(response).await;
        assert_eq!(listing["stats"]["yes"], 1);
        assert_eq!(listing["stats"]["totalAttending"], 3);
        assert_eq!(listing["rsvps"][0]["partySize"], 3);
        assert_eq!(listing["rsvps"][0]["guest"]["maxPartySize"], 3);

        let response = app(&h)
            .oneshot(as_admin(Method::GET, "/api/rsvps/export", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
        assert!(response.headers()[CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("rsvps.csv"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let csv = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(csv.starts_with("First Name,Last Name,Email"));
        assert!(csv.contains("Rui Silva; Leo Silva"));
    }

    #[tokio::test]
    async fn unknown_tokens_look_the_same() {
        let h = Harness::new();
        for uri in ["/api/rsvp/nope", "/api/guest-portal/nope"] {
            let response = app(&h).oneshot(request(Method::GET, uri, None)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert!(json_body(response).await["error"].is_string());
        }
    }

    #[tokio::test]
    async fn invalid_registration_is_a_bad_request() {
        let h = Harness::new();
        let response = app(&h)
            .oneshot(request(
                Method::POST,
                "/api/guests/register",
                Some(json!({ "firstName": "Ana", "lastName": "Silva", "email": "not-an-email" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_handshake_over_http() {
        let h = Harness::new();

        let response = app(&h)
            .oneshot(request(
                Method::POST,
                "/api/photos/upload-url",
                Some(json!({ "fileName": "big.png", "fileType": "image/png", "fileSize": 11_000_000 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app(&h)
            .oneshot(request(
                Method::POST,
                "/api/photos/upload-url",
                Some(json!({ "fileName": "cake.png", "fileType": "image/png", "fileSize": 2048 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let issued = json_body(response).await;
        assert!(issued["uploadUrl"].as_str().unwrap().starts_with("memory://photos/"));
        let photo_id = issued["photoId"].as_str().unwrap().to_string();

        let complete = json!({ "photoId": photo_id, "fileName": "cake.png" });
        let response = app(&h)
            .oneshot(request(Method::POST, "/api/photos/complete", Some(complete.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "pending");

        let response = app(&h)
            .oneshot(request(Method::POST, "/api/photos/complete", Some(complete)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app(&h)
            .oneshot(as_admin(Method::GET, "/api/admin/photos/pending", None))
            .await
            .unwrap();
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);

        let response = app(&h)
            .oneshot(as_admin(
                Method::PATCH,
                &format!("/api/admin/photos/{photo_id}/approve"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app(&h)
            .oneshot(request(Method::GET, "/api/photos", None))
            .await
            .unwrap();
        let approved = json_body(response).await;
        assert_eq!(approved.as_array().unwrap().len(), 1);
        assert!(approved[0]["thumbnailUrl"].as_str().unwrap().contains("_thumb.jpg"));

        let response = app(&h)
            .oneshot(as_admin(
                Method::DELETE,
                &format!("/api/admin/photos/{photo_id}"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.storage.deleted_keys().len(), 2);
    }

    #[tokio::test]
    async fn messages_need_a_live_portal_token() {
        let h = Harness::new();
        let guest = h.approved_guest("Ana").await;
        let portal = guest.guest_portal_token.clone().unwrap();

        let response = app(&h)
            .oneshot(request(
                Method::POST,
                "/api/messages",
                Some(json!({ "guestToken": "nope", "message": "hi" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app(&h)
            .oneshot(request(
                Method::POST,
                "/api/messages",
                Some(json!({ "guestToken": portal, "message": "Congratulations!" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json_body(response).await["id"].as_str().unwrap().to_string();

        let response = app(&h)
            .oneshot(as_admin(Method::GET, "/api/messages", None))
            .await
            .unwrap();
        let listing = json_body(response).await;
        assert_eq!(listing["unreadCount"], 1);
        assert_eq!(listing["messages"][0]["guestName"], "Ana Silva");

        let response = app(&h)
            .oneshot(as_admin(Method::PATCH, &format!("/api/messages/{id}/read"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let messages = h.store.list_messages().await.unwrap();
        assert_eq!(messages[0].status, MessageStatus::Read);
    }
}
