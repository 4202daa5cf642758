//! Account creation and credential checks.

use anyhow::Result;
use tracing::debug;

use super::{
    password::{hash_password, verify_password},
    storage::{CreateUserOutcome, NewUserRecord, User, UserRepository},
    utils::{normalize_email, valid_email},
};

/// Signup form input.
#[derive(Clone, Debug, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub enum RegisterOutcome {
    Created(User),
    Conflict,
    Invalid(&'static str),
}

/// Validate and create a user.
///
/// # Errors
/// Returns an error if hashing or the repository fails.
pub async fn register(users: &dyn UserRepository, input: &NewUser) -> Result<RegisterOutcome> {
    let username = input.username.trim();
    let email = normalize_email(&input.email);

    if username.is_empty() {
        return Ok(RegisterOutcome::Invalid("username is required"));
    }
    if email.is_empty() {
        return Ok(RegisterOutcome::Invalid("email is required"));
    }
    if !valid_email(&email) {
        return Ok(RegisterOutcome::Invalid("email is invalid"));
    }
    if input.password.is_empty() {
        return Ok(RegisterOutcome::Invalid("password is required"));
    }

    let record = NewUserRecord {
        email,
        username: username.to_string(),
        password_digest: hash_password(&input.password)?,
    };
    Ok(match users.create_user(&record).await? {
        CreateUserOutcome::Created(user) => RegisterOutcome::Created(user),
        CreateUserOutcome::Conflict => RegisterOutcome::Conflict,
    })
}

/// Resolve a user by email and password; `None` for any credential mismatch.
///
/// # Errors
/// Returns an error only if the repository fails.
pub async fn authenticate_by(
    users: &dyn UserRepository,
    email: &str,
    password: &str,
) -> Result<Option<User>> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Ok(None);
    }

    let Some(credentials) = users.find_credentials_by_email(&email).await? else {
        debug!("Login attempt for unknown email");
        return Ok(None);
    };

    if verify_password(password, &credentials.password_digest) {
        Ok(Some(credentials.user))
    } else {
        debug!(user_id = %credentials.user.id, "Login attempt with wrong password");
        Ok(None)
    }
}
