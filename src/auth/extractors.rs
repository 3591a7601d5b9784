use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use super::jwt::TokenError;
use crate::{
    error::{AppError, AuthFailure},
    state::AppState,
};

/// An admitted session. Extracted directly, the token has passed signature,
/// expiry and revocation checks.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// Pulls the token out of `Authorization: Bearer <token>`. Anything else
/// counts as no token at all.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// A token that passed the signature and expiry checks. Revocation is not
/// consulted, so logout can accept a token that was already revoked.
#[derive(Debug, Clone)]
pub struct SignedSession(pub AuthSession);

#[async_trait]
impl FromRequestParts<AppState> for SignedSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or(AppError::Authentication(AuthFailure::MissingToken))?
            .to_string();

        let claims = state.jwt.verify(&token).map_err(|e| {
            match e {
                TokenError::Expired => debug!("expired token"),
                TokenError::Invalid => warn!("invalid token"),
            }
            AppError::Authentication(AuthFailure::InvalidToken)
        })?;

        Ok(SignedSession(AuthSession {
            user_id: claims.sub,
            expires_at: claims.expires_at(),
            token,
        }))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Stateless checks first; the registry is only consulted for tokens we signed.
        let SignedSession(session) = SignedSession::from_request_parts(parts, state).await?;

        if state.revocations.is_revoked(&session.token).await? {
            debug!(user_id = %session.user_id, "revoked token");
            return Err(AppError::Authentication(AuthFailure::InvalidToken));
        }

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&headers("bearer abc")), Some("abc"));
    }

    #[test]
    fn rejects_other_shapes() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
        assert_eq!(bearer_token(&headers("Bearer")), None);
        assert_eq!(bearer_token(&headers("Bearer    ")), None);
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&headers("abc.def.ghi")), None);
    }
}
