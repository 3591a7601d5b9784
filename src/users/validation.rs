use lazy_static::lazy_static;
use regex::Regex;

use super::dto::{RegisterRequest, UpdateUserRequest};
use crate::error::{AppError, AppResult, FieldError};

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_password(password: &str, errors: &mut Vec<FieldError>) {
    if password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            "Password must be at least 6 characters long",
        ));
    }
}

fn check_email(email: &str, errors: &mut Vec<FieldError>) {
    if !is_valid_email(email) {
        errors.push(FieldError::new("email", "Invalid email format"));
    }
}

fn finish(errors: Vec<FieldError>) -> AppResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Trims and normalizes the request in place, then reports every failing field.
pub fn validate_registration(req: &mut RegisterRequest) -> AppResult<()> {
    req.username = req.username.trim().to_string();
    req.name = req.name.trim().to_string();
    req.email = normalize_email(&req.email);

    let mut errors = Vec::new();
    if req.username.is_empty() {
        errors.push(FieldError::new("username", "Username is required"));
    } else if req.username.chars().count() < MIN_USERNAME_LEN {
        errors.push(FieldError::new(
            "username",
            "Username must be at least 3 characters long",
        ));
    }
    check_password(&req.password, &mut errors);
    if req.name.is_empty() {
        errors.push(FieldError::new("name", "Name is required"));
    }
    check_email(&req.email, &mut errors);
    finish(errors)
}

/// Only the fields present in the update are checked.
pub fn validate_update(req: &mut UpdateUserRequest) -> AppResult<()> {
    let mut errors = Vec::new();
    if let Some(name) = req.name.as_mut() {
        *name = name.trim().to_string();
        if name.is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        }
    }
    if let Some(email) = req.email.as_mut() {
        *email = normalize_email(email);
        check_email(email, &mut errors);
    }
    if let Some(password) = req.password.as_deref() {
        check_password(password, &mut errors);
    }
    finish(errors)
}
