use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Why an authentication attempt was refused. Never exposed beyond the
/// generic message attached to each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    InvalidCredentials,
    MissingToken,
    InvalidToken,
}

impl AuthFailure {
    fn status(self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::InvalidToken => StatusCode::FORBIDDEN,
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "Invalid username or password",
            Self::MissingToken => "Access token is missing",
            Self::InvalidToken => "Invalid token",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),
    #[error("authentication failed: {0:?}")]
    Authentication(AuthFailure),
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [FieldError]>,
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Authentication(_) => "AUTHENTICATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(f) => f.status(),
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body rejections become a validation error on `body`. The parser's own text
/// is logged but not returned.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(detail = %rejection.body_text(), "json body rejected");
        let message = match rejection {
            JsonRejection::JsonDataError(_) => "Request body has a missing or mistyped field",
            JsonRejection::JsonSyntaxError(_) => "Request body is not valid JSON",
            JsonRejection::MissingJsonContentType(_) => {
                "Expected a JSON body with Content-Type: application/json"
            }
            _ => "Request body could not be read",
        };
        AppError::Validation(vec![FieldError::new("body", message)])
    }
}

/// Every path parameter is a user id, so an unparseable one names no user.
impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        debug!(detail = %rejection.body_text(), "path rejected");
        AppError::NotFound
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Validation(errors) => {
                debug!(?errors, "validation error");
                ErrorBody {
                    error: self.kind(),
                    message: "Validation error",
                    errors: Some(errors.as_slice()),
                }
            }
            Self::Authentication(failure) => ErrorBody {
                error: self.kind(),
                message: failure.message(),
                errors: None,
            },
            Self::NotFound => ErrorBody {
                error: self.kind(),
                message: "User not found",
                errors: None,
            },
            Self::Internal(e) => {
                error!(error = ?e, "internal error");
                ErrorBody {
                    error: self.kind(),
                    message: "Internal server error",
                    errors: None,
                }
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let res = err.into_response();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_detail() {
        let (status, json) =
            body_json(AppError::Internal(anyhow::anyhow!("connection refused on 10.0.0.5"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["message"], "Internal server error");
        assert!(!json.to_string().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn validation_error_lists_fields() {
        let err = AppError::Validation(vec![
            FieldError::new("username", "Username is required"),
            FieldError::new("email", "Invalid email format"),
        ]);
        let (status, json) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errors"][0]["field"], "username");
        assert_eq!(json["errors"][1]["field"], "email");
    }

    #[tokio::test]
    async fn token_failures_split_401_and_403() {
        let (missing, _) = body_json(AppError::Authentication(AuthFailure::MissingToken)).await;
        let (invalid, json) = body_json(AppError::Authentication(AuthFailure::InvalidToken)).await;
        assert_eq!(missing, StatusCode::UNAUTHORIZED);
        assert_eq!(invalid, StatusCode::FORBIDDEN);
        assert_eq!(json["message"], "Invalid token");
        assert!(json.get("errors").is_none());
    }
}
