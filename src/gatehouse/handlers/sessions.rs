use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use super::form_target;
use crate::{
    auth::{session::redirect, users::authenticate_by, AuthContext, AuthError},
    gatehouse::AppState,
};

pub const HOME_PATH: &str = "/home";
pub const SESSIONS_PATH: &str = "/sessions";

#[derive(ToSchema, Deserialize, Default)]
pub struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[utoipa::path(
    get,
    path = "/login",
    responses (
        (status = 200, description = "Login form target and CSRF token", body = super::FormTarget),
        (status = 302, description = "Already signed in, redirect to /home")
    ),
    tag = "sessions"
)]
#[instrument(skip_all)]
pub async fn login_form(State(state): State<AppState>, mut auth: AuthContext) -> Response {
    match auth.resume_session().await {
        Ok(Some(_)) => redirect(HOME_PATH),
        Ok(None) => form_target(state.csrf(), &auth, SESSIONS_PATH)
            .await
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/sessions",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses (
        (status = 302, description = "Signed in, redirect to the stored return path or /home; or rejected, redirect to the login form"),
        (status = 403, description = "Missing or invalid CSRF token")
    ),
    tag = "sessions"
)]
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    mut auth: AuthContext,
    Form(form): Form<LoginForm>,
) -> Response {
    let user = match authenticate_by(state.sessions().users(), &form.email, &form.password).await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!("Rejected login");
            return redirect(state.sessions().login_path());
        }
        Err(err) => return AuthError::from(err).into_response(),
    };

    if let Err(err) = auth.start_new_session_for(user).await {
        return err.into_response();
    }
    let target = auth
        .take_return_to()
        .await
        .unwrap_or_else(|| HOME_PATH.to_string());
    redirect(&target)
}

#[utoipa::path(
    delete,
    path = "/sessions",
    responses (
        (status = 302, description = "Signed out, redirect to the login form"),
        (status = 403, description = "Missing or invalid CSRF token")
    ),
    tag = "sessions"
)]
#[instrument(skip_all)]
pub async fn destroy(State(state): State<AppState>, mut auth: AuthContext) -> Response {
    if let Err(response) = auth.require_authentication().await {
        return response;
    }
    match auth.terminate_session().await {
        Ok(()) => redirect(state.sessions().login_path()),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/logout",
    responses (
        (status = 302, description = "Signed out, redirect to the login form")
    ),
    tag = "sessions"
)]
#[instrument(skip_all)]
pub async fn logout(state: State<AppState>, auth: AuthContext) -> Response {
    destroy(state, auth).await
}
