use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{MessageResponse, PublicUser, UpdateUserRequest},
    validation::validate_update,
};
use crate::{
    auth::extractors::AuthSession,
    error::{AppError, AppResult},
    extract::{AppJson, AppPath},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/users/:id", get(get_user).put(update_user).delete(delete_user))
}

#[instrument(skip(state, _session))]
pub async fn get_user(
    State(state): State<AppState>,
    _session: AuthSession,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<PublicUser>> {
    let user = state.users.find_by_id(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, session, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    session: AuthSession,
    AppPath(id): AppPath<Uuid>,
    AppJson(mut payload): AppJson<UpdateUserRequest>,
) -> AppResult<Json<PublicUser>> {
    validate_update(&mut payload)?;
    let mut user = state.users.find_by_id(id).await?.ok_or(AppError::NotFound)?;

    if let Some(name) = payload.name {
        user.name = name;
    }
    if let Some(email) = payload.email {
        user.email = email;
    }
    if let Some(password) = payload.password {
        user.password_hash = state.hasher.hash_blocking(password).await?;
    }

    state.users.save(&user).await?;
    info!(user_id = %user.id, by = %session.user_id, "user updated");
    Ok(Json(user.into()))
}

#[instrument(skip(state, session))]
pub async fn delete_user(
    State(state): State<AppState>,
    session: AuthSession,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    if !state.users.delete(id).await? {
        return Err(AppError::NotFound);
    }
    info!(user_id = %id, by = %session.user_id, "user deleted");
    Ok(Json(MessageResponse {
        message: "User deleted successfully",
    }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{
        app::build_app,
        auth::services,
        state::AppState,
        users::{dto::RegisterRequest, repo_types::User},
    };

    async fn setup() -> (AppState, Router, User, String) {
        let state = AppState::fake();
        let user = services::register(
            &state,
            RegisterRequest {
                username: "alice".into(),
                password: "secret123".into(),
                name: "Alice".into(),
                email: "alice@example.com".into(),
            },
        )
        .await
        .unwrap();
        let token = services::login(&state, "alice", "secret123").await.unwrap().token;
        (state.clone(), build_app(state), user, token)
    }

    async fn call(app: &Router, method: &str, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn get_user_and_404() {
        let (_, app, user, token) = setup().await;
        let (status, v) = call(&app, "GET", &format!("/users/{}", user.id), &token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["username"], "alice");
        assert!(v.get("password_hash").is_none());

        let (status, v) = call(&app, "GET", &format!("/users/{}", uuid::Uuid::new_v4()), &token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(v["message"], "User not found");
    }

    #[tokio::test]
    async fn unparseable_id_is_404() {
        let (_, app, _, token) = setup().await;
        for method in ["GET", "DELETE"] {
            let (status, v) = call(&app, method, "/users/123", &token, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(v["error"], "NOT_FOUND");
            assert_eq!(v["message"], "User not found");
        }
    }

    #[tokio::test]
    async fn update_with_mistyped_field_is_validation_error() {
        let (_, app, user, token) = setup().await;
        let (status, v) = call(
            &app,
            "PUT",
            &format!("/users/{}", user.id),
            &token,
            Some(json!({ "name": 42 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "VALIDATION_ERROR");
        assert_eq!(v["errors"][0]["field"], "body");
    }

    #[tokio::test]
    async fn crud_requires_token() {
        let (_, app, user, _) = setup().await;
        let req = Request::builder()
            .uri(format!("/users/{}", user.id))
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn update_rehashes_password() {
        let (state, app, user, token) = setup().await;
        let (status, v) = call(
            &app,
            "PUT",
            &format!("/users/{}", user.id),
            &token,
            Some(json!({ "name": "Alice B", "email": "ALICE.B@example.com", "password": "newsecret" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["name"], "Alice B");
        assert_eq!(v["email"], "alice.b@example.com");

        assert!(services::login(&state, "alice", "secret123").await.is_err());
        assert!(services::login(&state, "alice", "newsecret").await.is_ok());
    }

    #[tokio::test]
    async fn update_rejects_taken_email() {
        let (state, app, user, token) = setup().await;
        services::register(
            &state,
            RegisterRequest {
                username: "bob".into(),
                password: "secret456".into(),
                name: "Bob".into(),
                email: "bob@example.com".into(),
            },
        )
        .await
        .unwrap();

        let (status, v) = call(
            &app,
            "PUT",
            &format!("/users/{}", user.id),
            &token,
            Some(json!({ "email": "bob@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["errors"][0]["field"], "email");
    }

    #[tokio::test]
    async fn update_missing_user_is_404() {
        let (_, app, _, token) = setup().await;
        let (status, _) = call(
            &app,
            "PUT",
            &format!("/users/{}", uuid::Uuid::new_v4()),
            &token,
            Some(json!({ "name": "Ghost" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_then_404() {
        let (_, app, user, token) = setup().await;
        let uri = format!("/users/{}", user.id);
        let (status, v) = call(&app, "DELETE", &uri, &token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["message"], "User deleted successfully");

        let (status, _) = call(&app, "DELETE", &uri, &token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
