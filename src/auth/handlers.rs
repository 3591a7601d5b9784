use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, ProtectedResponse},
        extractors::{AuthSession, SignedSession},
        services,
    },
    error::AppResult,
    extract::AppJson,
    state::AppState,
    users::dto::{MessageResponse, PublicUser, RegisterRequest, RegisterResponse},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/protected", get(protected))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let user = services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully",
            user: PublicUser::from(user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let issued = services::login(&state, &payload.username, &payload.password).await?;
    Ok(Json(LoginResponse {
        message: "Login successful",
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}

/// Accepts an already revoked token so a repeated logout still succeeds.
#[instrument(skip_all, fields(user_id = %session.user_id))]
pub async fn logout(
    State(state): State<AppState>,
    SignedSession(session): SignedSession,
) -> AppResult<Json<MessageResponse>> {
    services::logout(&state, &session).await?;
    Ok(Json(MessageResponse {
        message: "Logged out successfully",
    }))
}

pub async fn protected(session: AuthSession) -> Json<ProtectedResponse> {
    Json(ProtectedResponse {
        message: "This is a protected route",
        user_id: session.user_id,
    })
}
