use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use super::{form_target, sessions::HOME_PATH};
use crate::{
    auth::{
        session::redirect,
        users::{register, NewUser, RegisterOutcome},
        AuthContext, AuthError,
    },
    gatehouse::AppState,
};

pub const SIGNUP_PATH: &str = "/signup";
pub const USERS_PATH: &str = "/users";

#[derive(ToSchema, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[utoipa::path(
    get,
    path = "/signup",
    responses (
        (status = 200, description = "Signup form target and CSRF token", body = super::FormTarget),
        (status = 302, description = "Already signed in, redirect to /home")
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn signup_form(State(state): State<AppState>, mut auth: AuthContext) -> Response {
    match auth.resume_session().await {
        Ok(Some(_)) => redirect(HOME_PATH),
        Ok(None) => form_target(state.csrf(), &auth, USERS_PATH)
            .await
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/users",
    request_body(content = SignupForm, content_type = "application/x-www-form-urlencoded"),
    responses (
        (status = 302, description = "Account created and signed in, redirect to /home; or rejected, redirect to /signup"),
        (status = 403, description = "Missing or invalid CSRF token")
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    mut auth: AuthContext,
    Form(form): Form<SignupForm>,
) -> Response {
    let input = NewUser {
        username: form.username,
        email: form.email,
        password: form.password,
    };

    let user = match register(state.sessions().users(), &input).await {
        Ok(RegisterOutcome::Created(user)) => user,
        Ok(RegisterOutcome::Conflict) => {
            debug!("Signup rejected: username or email taken");
            return redirect(SIGNUP_PATH);
        }
        Ok(RegisterOutcome::Invalid(reason)) => {
            debug!(reason, "Signup rejected");
            return redirect(SIGNUP_PATH);
        }
        Err(err) => return AuthError::from(err).into_response(),
    };

    info!(user_id = %user.id, "Created user");
    match auth.start_new_session_for(user).await {
        Ok(_) => redirect(HOME_PATH),
        Err(err) => err.into_response(),
    }
}
