use tracing::{info, warn};

use super::{claims::IssuedToken, extractors::AuthSession};
use crate::{
    error::{AppError, AppResult, AuthFailure},
    mail,
    state::AppState,
    users::{
        dto::RegisterRequest,
        repo_types::{NewUser, User},
        validation::validate_registration,
    },
};

pub async fn register(state: &AppState, mut req: RegisterRequest) -> AppResult<User> {
    validate_registration(&mut req)?;

    let password_hash = state.hasher.hash_blocking(req.password).await?;
    let user = state
        .users
        .create(NewUser {
            username: req.username,
            name: req.name,
            email: req.email,
            password_hash,
        })
        .await?;

    info!(user_id = %user.id, username = %user.username, "user registered");

    let (subject, text, html) = mail::welcome_email(&user.name);
    mail::send_detached(state.mailer.clone(), user.email.clone(), subject, text, html);

    Ok(user)
}

/// Unknown usernames and wrong passwords are indistinguishable to the caller.
pub async fn login(state: &AppState, username: &str, password: &str) -> AppResult<IssuedToken> {
    let username = username.trim();
    let user = state.users.find_by_username(username).await?;

    let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
    let ok = state
        .hasher
        .verify_blocking(password.to_string(), stored_hash)
        .await?;

    let user = match user {
        Some(u) if ok => u,
        Some(u) => {
            warn!(user_id = %u.id, "login invalid password");
            return Err(AppError::Authentication(AuthFailure::InvalidCredentials));
        }
        None => {
            warn!("login unknown username");
            return Err(AppError::Authentication(AuthFailure::InvalidCredentials));
        }
    };

    let issued = state.jwt.issue(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok(issued)
}

/// Revokes the session's token for the rest of its lifetime. Safe to repeat.
pub async fn logout(state: &AppState, session: &AuthSession) -> AppResult<()> {
    state
        .revocations
        .revoke(&session.token, session.expires_at)
        .await?;
    info!(user_id = %session.user_id, "user logged out");
    Ok(())
}
