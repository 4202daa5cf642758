pub mod health;
pub mod home;
pub mod sessions;
pub mod users;

use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{AuthContext, AuthError, CsrfGuard};

/// Where a form posts and the CSRF token it must carry.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FormTarget {
    pub action: String,
    pub field: String,
    pub token: String,
}

/// Describe the form posting to `action`, with a token bound to `POST action`.
pub(crate) async fn form_target(
    csrf: &CsrfGuard,
    auth: &AuthContext,
    action: &str,
) -> Result<Response, AuthError> {
    let token = {
        let mut cookie = auth.cookie().lock().await;
        csrf.token_for(&mut cookie, action)?
    };
    Ok(Json(FormTarget {
        action: action.to_string(),
        field: csrf.field().to_string(),
        token,
    })
    .into_response())
}
