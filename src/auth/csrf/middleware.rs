use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use super::{CheckOptions, CsrfGuard, CsrfOutcome, CsrfRequest, RequestParams};
use crate::auth::cookie::SessionHandle;

/// Largest form body buffered for token lookup.
pub const MAX_FORM_BYTES: usize = 64 * 1024;

fn is_form(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value.split(';').next().is_some_and(|mime| {
                mime.trim()
                    .eq_ignore_ascii_case("application/x-www-form-urlencoded")
            })
        })
}

/// Middleware: reject unsafe requests that carry no valid CSRF token.
///
/// Must run inside [`crate::auth::cookie::cookie_session`]. Form bodies are
/// buffered for the token lookup and handed to the handler unchanged.
pub async fn csrf_protect(
    State(guard): State<CsrfGuard>,
    request: Request,
    next: Next,
) -> Response {
    if !guard.config().check_methods().contains(request.method()) {
        return next.run(request).await;
    }

    let Some(handle) = request.extensions().get::<SessionHandle>().cloned() else {
        error!("CSRF guard installed without the cookie session layer");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let form = is_form(&request);
    let (parts, body) = request.into_parts();
    let (params, body) = if form {
        match to_bytes(body, MAX_FORM_BYTES).await {
            Ok(bytes) => (
                RequestParams::parse(parts.uri.query(), Some(&bytes)),
                Body::from(bytes),
            ),
            Err(err) => {
                debug!("Failed to buffer form body: {err}");
                return StatusCode::PAYLOAD_TOO_LARGE.into_response();
            }
        }
    } else {
        (RequestParams::parse(parts.uri.query(), None), body)
    };
    let request = Request::from_parts(parts, body);

    let outcome = {
        let mut session = handle.lock().await;
        let csrf_request = CsrfRequest {
            method: request.method(),
            path: request.uri().path(),
            headers: request.headers(),
            params: &params,
        };
        guard.check(&csrf_request, &mut session, &CheckOptions::default())
    };

    match outcome {
        CsrfOutcome::Pass | CsrfOutcome::SessionCleared => next.run(request).await,
        CsrfOutcome::Fatal(err) => err.into_response(),
        CsrfOutcome::Halt(response) => response,
    }
}
