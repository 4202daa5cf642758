use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

use crate::auth::{session::redirect, AuthContext};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Home {
    pub user_id: String,
    pub email: String,
    pub username: String,
    pub session_id: String,
}

#[utoipa::path(
    get,
    path = "/home",
    responses (
        (status = 200, description = "Signed-in user", body = Home),
        (status = 302, description = "Not signed in, redirect to the login form")
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn home(mut auth: AuthContext) -> Response {
    let session = match auth.require_authentication().await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let Some(user) = auth.current_user() else {
        return redirect(auth.login_path());
    };

    Json(Home {
        user_id: user.id.to_string(),
        email: user.email.clone(),
        username: user.username.clone(),
        session_id: session.id.to_string(),
    })
    .into_response()
}
