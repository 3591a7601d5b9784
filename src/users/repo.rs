use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewUser, User};
use crate::error::{AppError, AppResult, FieldError};

/// Credential store. `create` and `save` reject duplicate usernames or emails
/// with a validation error naming every clashing field.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn create(&self, new: NewUser) -> AppResult<User>;
    async fn save(&self, user: &User) -> AppResult<()>;
    /// Returns false when no such user existed.
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
}

pub(super) fn uniqueness_error(username_taken: bool, email_taken: bool) -> Option<AppError> {
    let mut errors = Vec::new();
    if username_taken {
        errors.push(FieldError::new("username", "username must be unique"));
    }
    if email_taken {
        errors.push(FieldError::new("email", "email must be unique"));
    }
    (!errors.is_empty()).then_some(AppError::Validation(errors))
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn check_unique(&self, username: &str, email: &str, except: Uuid) -> AppResult<()> {
        let (username_taken, email_taken) = sqlx::query_as::<_, (bool, bool)>(
            r#"
            SELECT
                EXISTS (SELECT 1 FROM users WHERE username = $1 AND id <> $3),
                EXISTS (SELECT 1 FROM users WHERE email = $2 AND id <> $3)
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(except)
        .fetch_one(&self.db)
        .await
        .context("check user uniqueness")?;
        match uniqueness_error(username_taken, email_taken) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A concurrent insert can still slip past `check_unique`; the constraint
/// catches it and is mapped back onto the field it guards.
fn map_write_error(e: sqlx::Error, what: &'static str) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or_default();
            let username = constraint.contains("username");
            let email = constraint.contains("email");
            if let Some(err) = uniqueness_error(username, email) {
                return err;
            }
        }
    }
    AppError::Internal(anyhow::Error::new(e).context(what))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, name, email, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .context("find user by username")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, name, email, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> AppResult<User> {
        self.check_unique(&new.username, &new.email, Uuid::nil()).await?;
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, name, email, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, username, name, email, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, "insert user"))?;
        Ok(user)
    }

    async fn save(&self, user: &User) -> AppResult<()> {
        self.check_unique(&user.username, &user.email, user.id).await?;
        sqlx::query(
            r#"
            UPDATE users
            SET username = $2, name = $3, email = $4, password_hash = $5
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .execute(&self.db)
        .await
        .map_err(|e| map_write_error(e, "update user"))?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let res = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(res.rows_affected() > 0)
    }
}
