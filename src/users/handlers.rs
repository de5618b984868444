use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use super::dto::{
    normalize_email, CreateUserRequest, CreateUserResponse, UserResponse, UsersBySkillsRequest,
    UsersResponse,
};
use super::errors::ServiceError;
use super::extractors::CallerId;
use crate::state::AppState;

/// Avatars travel inline in the create request.
const CREATE_BODY_LIMIT: usize = 20 * 1024 * 1024;

type Rejection = (StatusCode, String);

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/users/id/:id", get(get_user_by_id))
        .route("/users/email/:email", get(get_user_by_email))
        .route("/users/search", post(get_users_by_skills))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/id/:id/verify-email", post(verify_email))
        .layer(DefaultBodyLimit::max(CREATE_BODY_LIMIT))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateUserResponse>), Rejection> {
    let Json(payload) = payload.map_err(bad_body)?;
    let input = payload.validate().map_err(|msg| {
        warn!(reason = %msg, "invalid create request");
        (StatusCode::BAD_REQUEST, msg)
    })?;

    let id = state
        .users
        .create_user(input)
        .await
        .map_err(|e| reject(e, "failed to create user"))?;
    Ok((StatusCode::CREATED, Json(CreateUserResponse { id })))
}

#[instrument(skip(state))]
pub async fn get_user_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<UserResponse>, Rejection> {
    let email = normalize_email(&email);
    if email.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "email is required".into()));
    }

    let user = state
        .users
        .user_by_email(&email)
        .await
        .map_err(|e| reject(e, "failed to get user"))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn get_user_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, Rejection> {
    let user = state
        .users
        .user_by_id(id)
        .await
        .map_err(|e| reject(e, "failed to get user"))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, Rejection> {
    state
        .users
        .verify_email(id)
        .await
        .map_err(|e| reject(e, "failed to verify email"))?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn get_users_by_skills(
    State(state): State<AppState>,
    CallerId(caller_id): CallerId,
    payload: Result<Json<UsersBySkillsRequest>, JsonRejection>,
) -> Result<Json<UsersResponse>, Rejection> {
    let Json(payload) = payload.map_err(bad_body)?;
    let users = state
        .users
        .users_by_skills(caller_id, payload.skills.as_deref())
        .await
        .map_err(|e| reject(e, "failed to get users"))?;
    Ok(Json(UsersResponse {
        users: users.into_iter().map(UserResponse::from).collect(),
    }))
}

/// Any malformed body is an invalid argument; 422 stays reserved for unknown skills.
fn bad_body(rejection: JsonRejection) -> Rejection {
    warn!(reason = %rejection.body_text(), "malformed request body");
    (StatusCode::BAD_REQUEST, rejection.body_text())
}

/// Typed conditions pass through with their own status; anything else is
/// logged with its full chain and answered with `fallback`.
fn reject(err: ServiceError, fallback: &'static str) -> Rejection {
    let status = match &err {
        ServiceError::AlreadyExists => StatusCode::CONFLICT,
        ServiceError::InvalidSkill => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::NotFound => StatusCode::NOT_FOUND,
        ServiceError::EmailNotVerified => StatusCode::UNAUTHORIZED,
        ServiceError::CacheOutOfSync(e) | ServiceError::Internal(e) => {
            error!(error = ?e, "{fallback}");
            return (StatusCode::INTERNAL_SERVER_ERROR, fallback.into());
        }
    };
    warn!(%status, error = %err, "request rejected");
    (status, err.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, Response},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::app::build_app;
    use crate::config::test_config;
    use crate::state::AppState;
    use crate::users::extractors::CALLER_ID_HEADER;
    use crate::users::services::testing::{harness, Harness, PLACEHOLDER_URL};

    fn app(h: &Harness) -> axum::Router {
        build_app(AppState::from_parts(Arc::new(test_config()), h.service.clone()))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(res: Response<Body>) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(res: Response<Body>) -> String {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn ann() -> Value {
        json!({
            "email": "a@x.com",
            "name": "Ann",
            "password": "pw",
            "about": "bio",
            "skills": ["go"]
        })
    }

    async fn create(h: &Harness, body: Value) -> Response<Body> {
        app(h).oneshot(post_json("/api/v1/users", body)).await.unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let h = harness();
        let res = app(&h).oneshot(get("/api/v1/health")).await.unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(body_text(res).await, "ok");
    }

    #[tokio::test]
    async fn full_flow_create_verify_get() {
        let h = harness();
        let res = create(&h, ann()).await;
        assert_eq!(res.status(), 201);
        let id = body_json(res).await["id"].as_str().unwrap().to_string();

        let res = app(&h)
            .oneshot(get("/api/v1/users/email/a@x.com"))
            .await
            .unwrap();
        assert_eq!(res.status(), 401);

        let res = app(&h)
            .oneshot(post_json(&format!("/api/v1/users/id/{id}/verify-email"), json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), 204);

        let res = app(&h)
            .oneshot(get("/api/v1/users/email/A@X.com"))
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let user = body_json(res).await;
        assert_eq!(user["id"], id.as_str());
        assert_eq!(user["is_email_verified"], true);
        assert_eq!(user["avatar_url"], format!("{PLACEHOLDER_URL}?sig=1"));
        assert!(user.get("avatar_key").is_none());
        assert_eq!(user["skills"], json!(["go"]));
        assert_ne!(user["password_hash"], "pw");

        let res = app(&h)
            .oneshot(get(&format!("/api/v1/users/id/{id}")))
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn create_rejects_missing_fields() {
        let h = harness();
        for field in ["email", "name", "password", "skills"] {
            let mut body = ann();
            body.as_object_mut().unwrap().remove(field);
            let res = create(&h, body).await;
            assert_eq!(res.status(), 400, "missing {field}");
            assert_eq!(body_text(res).await, format!("{field} is required"));
        }
        assert_eq!(h.store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn create_maps_conflicts() {
        let h = harness();
        assert_eq!(create(&h, ann()).await.status(), 201);

        let res = create(&h, ann()).await;
        assert_eq!(res.status(), 409);
        assert_eq!(body_text(res).await, "user already exists");

        let mut body = ann();
        body["email"] = json!("b@x.com");
        body["skills"] = json!(["juggling"]);
        let res = create(&h, body).await;
        assert_eq!(res.status(), 422);
        assert_eq!(body_text(res).await, "skill not in the skills list");
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let h = harness();
        let mut body = ann();
        body["skills"] = json!("go");
        assert_eq!(create(&h, body).await.status(), 400);

        let res = app(&h)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/users")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        assert_eq!(h.store.saves.load(Ordering::SeqCst), 0);

        let mut req = post_json("/api/v1/users/search", json!({ "skills": "go" }));
        req.headers_mut()
            .insert(CALLER_ID_HEADER, uuid::Uuid::new_v4().to_string().parse().unwrap());
        let res = app(&h).oneshot(req).await.unwrap();
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn create_accepts_inline_avatar() {
        let h = harness();
        let mut body = ann();
        body["avatar"] = json!([137, 80, 78, 71]);
        assert_eq!(create(&h, body).await.status(), 201);
        assert_eq!(h.blobs.uploads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn internal_failures_stay_opaque() {
        let h = harness();
        h.blobs.fail.store(true, Ordering::SeqCst);
        let res = create(&h, ann()).await;
        assert_eq!(res.status(), 500);
        assert_eq!(body_text(res).await, "failed to create user");
    }

    #[tokio::test]
    async fn lookups_report_not_found_and_bad_ids() {
        let h = harness();
        let res = app(&h)
            .oneshot(get(&format!("/api/v1/users/id/{}", uuid::Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(res.status(), 404);

        let res = app(&h).oneshot(get("/api/v1/users/id/not-a-uuid")).await.unwrap();
        assert_eq!(res.status(), 400);

        let res = app(&h)
            .oneshot(post_json(
                &format!("/api/v1/users/id/{}/verify-email", uuid::Uuid::new_v4()),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn search_requires_caller_id() {
        let h = harness();
        let res = app(&h)
            .oneshot(post_json("/api/v1/users/search", json!({ "skills": ["go"] })))
            .await
            .unwrap();
        assert_eq!(res.status(), 401);

        let mut req = post_json("/api/v1/users/search", json!({ "skills": ["go"] }));
        req.headers_mut()
            .insert(CALLER_ID_HEADER, "nope".parse().unwrap());
        let res = app(&h).oneshot(req).await.unwrap();
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn search_filters_or_recommends() {
        let h = harness();
        let mut ids = Vec::new();
        for (email, skill) in [("me@x.com", "go"), ("g@x.com", "go"), ("r@x.com", "rust")] {
            let mut body = ann();
            body["email"] = json!(email);
            body["skills"] = json!([skill]);
            let id = body_json(create(&h, body).await).await["id"]
                .as_str()
                .unwrap()
                .parse::<uuid::Uuid>()
                .unwrap();
            h.service.verify_email(id).await.unwrap();
            ids.push(id);
        }
        let caller = ids[0].to_string();

        let search = |body: Value| {
            let mut req = post_json("/api/v1/users/search", body);
            req.headers_mut()
                .insert(CALLER_ID_HEADER, caller.parse().unwrap());
            req
        };

        let res = app(&h).oneshot(search(json!({ "skills": ["go"] }))).await.unwrap();
        assert_eq!(res.status(), 200);
        let users = body_json(res).await["users"].as_array().unwrap().clone();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["id"], ids[1].to_string());

        let res = app(&h)
            .oneshot(search(json!({ "skills": ["design"] })))
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert!(body_json(res).await["users"].as_array().unwrap().is_empty());

        let res = app(&h).oneshot(search(json!({ "skills": null }))).await.unwrap();
        assert_eq!(res.status(), 200);
        let users = body_json(res).await["users"].as_array().unwrap().clone();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| u["id"] != caller.as_str()));
    }
}
