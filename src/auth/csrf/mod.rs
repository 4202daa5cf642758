//! Request-specific CSRF tokens.
//!
//! Every token is an HMAC over the request method, the request path and 31
//! random bytes, keyed by a per-client secret held in the cookie session. A
//! token minted for `POST /sessions` is only accepted on `POST /sessions`.
//! When request-specific tokens are not required, a blanket token (signed over
//! an empty method and path) is accepted as a fallback.
//!
//! ## Validation order
//!
//! 1. Methods outside the configured set pass untouched.
//! 2. The candidate token comes from an explicit override, then from the header
//!    and/or request parameters depending on [`HeaderCheck`]. Parameters prefer
//!    the per-path `_csrfs[<path>]` field over the global `_csrf` field.
//! 3. Missing, non-string, wrongly sized or undecodable tokens are rejected.
//! 4. The HMAC is recomputed and compared in constant time, with the blanket
//!    fallback when allowed.
//! 5. Failures are handed to the configured [`FailureAction`].

mod config;
mod middleware;
mod token;

pub use config::{
    CsrfConfig, CsrfFailureHandler, FailureAction, HeaderCheck, DEFAULT_FIELD,
    DEFAULT_FORMACTION_FIELD, DEFAULT_HEADER, DEFAULT_SECRET_KEY,
};
pub use middleware::{csrf_protect, MAX_FORM_BYTES};

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::{
    cookie::CookieSession,
    error::AuthError,
    utils::{constant_time_eq, escape_html},
};

/// Flat request parameters (query string followed by form body).
#[derive(Clone, Debug, Default)]
pub struct RequestParams {
    pairs: Vec<(String, String)>,
}

/// Lookup result for a single parameter.
#[derive(Debug, PartialEq, Eq)]
pub enum Param<'a> {
    Absent,
    One(&'a str),
    /// The field was supplied more than once.
    Many,
}

impl RequestParams {
    /// Parse the query string and an `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn parse(query: Option<&str>, form: Option<&[u8]>) -> Self {
        let mut pairs = Vec::new();
        if let Some(query) = query {
            pairs.extend(
                url::form_urlencoded::parse(query.as_bytes())
                    .map(|(key, value)| (key.into_owned(), value.into_owned())),
            );
        }
        if let Some(form) = form {
            pairs.extend(
                url::form_urlencoded::parse(form)
                    .map(|(key, value)| (key.into_owned(), value.into_owned())),
            );
        }
        Self { pairs }
    }

    #[must_use]
    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Param<'_> {
        let mut values = self
            .pairs
            .iter()
            .filter(|(name, _)| name == key)
            .map(|(_, value)| value.as_str());
        match (values.next(), values.next()) {
            (None, _) => Param::Absent,
            (Some(value), None) => Param::One(value),
            (Some(_), Some(_)) => Param::Many,
        }
    }
}

/// The parts of a request the guard inspects.
#[derive(Clone, Copy, Debug)]
pub struct CsrfRequest<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    pub params: &'a RequestParams,
}

/// Per-call overrides.
#[derive(Clone, Debug, Default)]
pub struct CheckOptions {
    /// Token to validate instead of looking in the header or parameters.
    pub token: Option<String>,
    /// Failure action to use instead of the configured one.
    pub failure: Option<FailureAction>,
}

/// Result of [`CsrfGuard::check`].
#[derive(Debug)]
pub enum CsrfOutcome {
    /// The request may proceed.
    Pass,
    /// Validation failed; the cookie session was cleared and the request may proceed.
    SessionCleared,
    /// Validation failed and the error must be surfaced.
    Fatal(AuthError),
    /// Validation failed and this response replaces the handler's.
    Halt(Response),
}

#[derive(Clone, Debug, Default)]
pub struct CsrfGuard {
    config: Arc<CsrfConfig>,
}

impl CsrfGuard {
    #[must_use]
    pub fn new(config: CsrfConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    #[must_use]
    pub fn field(&self) -> &str {
        self.config.field()
    }

    #[must_use]
    pub fn header(&self) -> &str {
        self.config.header().as_str()
    }

    #[must_use]
    pub fn use_request_specific_tokens(&self) -> bool {
        self.config.require_request_specific_tokens()
    }

    /// Mint a token for `path`/`method`.
    ///
    /// With a path and no method the token is bound to `POST`. Without a path
    /// the token is a blanket token signed over an empty method and path.
    ///
    /// # Errors
    /// Returns an error if the random source fails.
    pub fn generate_token(
        &self,
        session: &mut CookieSession,
        path: Option<&str>,
        method: Option<&Method>,
    ) -> Result<String> {
        let method = match (path, method) {
            (_, Some(method)) => method.as_str(),
            (Some(_), None) => Method::POST.as_str(),
            (None, None) => "",
        };
        let secret = token::csrf_secret(session, self.config.key())?;
        token::mint(&secret, method, path.unwrap_or_default())
    }

    /// Token for a `POST` to `path`.
    ///
    /// # Errors
    /// Returns an error if the random source fails.
    pub fn token_for(&self, session: &mut CookieSession, path: &str) -> Result<String> {
        self.generate_token(session, Some(path), None)
    }

    /// Token valid for any method and path when request-specific tokens are not required.
    ///
    /// # Errors
    /// Returns an error if the random source fails.
    pub fn blanket_token(&self, session: &mut CookieSession) -> Result<String> {
        self.generate_token(session, None, None)
    }

    /// Hidden input carrying a token under the global field.
    ///
    /// # Errors
    /// Returns an error if the random source fails.
    pub fn csrf_tag(
        &self,
        session: &mut CookieSession,
        path: Option<&str>,
        method: Option<&Method>,
    ) -> Result<String> {
        let token = self.generate_token(session, path, method)?;
        Ok(format!(
            "<input type=\"hidden\" name=\"{}\" value=\"{token}\" />",
            escape_html(self.config.field())
        ))
    }

    /// Hidden input carrying a token under the per-path field, for `formaction` buttons.
    ///
    /// # Errors
    /// Returns an error if the random source fails.
    pub fn formaction_tag(
        &self,
        session: &mut CookieSession,
        path: &str,
        method: Option<&Method>,
    ) -> Result<String> {
        let token = self.generate_token(session, Some(path), method)?;
        Ok(format!(
            "<input type=\"hidden\" name=\"{}[{}]\" value=\"{token}\" />",
            escape_html(self.config.formaction_field()),
            escape_html(path)
        ))
    }

    /// Meta tag with a blanket token for scripts.
    ///
    /// # Errors
    /// Returns an error if the random source fails.
    pub fn metatag(&self, session: &mut CookieSession) -> Result<String> {
        let token = self.blanket_token(session)?;
        Ok(format!(
            "<meta name=\"{}\" content=\"{token}\" />",
            escape_html(self.config.field())
        ))
    }

    /// Validate the request; `Ok(())` for exempt methods and valid tokens.
    ///
    /// # Errors
    /// Returns the CSRF error kind describing why the request was rejected, or
    /// `AuthError::Internal` if the CSRF secret could not be created.
    pub fn validate(
        &self,
        request: &CsrfRequest<'_>,
        session: &mut CookieSession,
        options: &CheckOptions,
    ) -> Result<(), AuthError> {
        if !self.config.check_methods().contains(request.method) {
            return Ok(());
        }

        if let Some(token) = options.token.as_deref() {
            return self.verify_encoded(token, request, session);
        }

        match self.config.check_header() {
            HeaderCheck::Params => {
                let token = self.param_token(request)?;
                self.verify_encoded(token, request, session)
            }
            HeaderCheck::Only => {
                let token = self.header_token(request)?;
                self.verify_encoded(token, request, session)
            }
            HeaderCheck::Either => {
                let from_params = self
                    .param_token(request)
                    .and_then(|token| self.verify_encoded(token, request, session));
                if from_params.is_ok() {
                    return Ok(());
                }
                let token = self.header_token(request)?;
                self.verify_encoded(token, request, session)
            }
        }
    }

    #[must_use]
    pub fn valid_csrf(
        &self,
        request: &CsrfRequest<'_>,
        session: &mut CookieSession,
        options: &CheckOptions,
    ) -> bool {
        self.validate(request, session, options).is_ok()
    }

    /// Validate and apply the failure action.
    pub fn check(
        &self,
        request: &CsrfRequest<'_>,
        session: &mut CookieSession,
        options: &CheckOptions,
    ) -> CsrfOutcome {
        let err = match self.validate(request, session, options) {
            Ok(()) => return CsrfOutcome::Pass,
            Err(err) if !err.is_csrf() => return CsrfOutcome::Fatal(err),
            Err(err) => err,
        };

        warn!(
            method = %request.method,
            path = request.path,
            reason = %err,
            "CSRF validation failed"
        );

        match options.failure.as_ref().unwrap_or(self.config.failure()) {
            FailureAction::Raise => CsrfOutcome::Fatal(err),
            FailureAction::Empty403 => CsrfOutcome::Halt(empty_403()),
            FailureAction::ClearSession => {
                session.clear();
                CsrfOutcome::SessionCleared
            }
            FailureAction::Custom(handler) => CsrfOutcome::Halt(handler(&err)),
        }
    }

    fn param_token<'r>(&self, request: &CsrfRequest<'r>) -> Result<&'r str, AuthError> {
        let formaction_key = format!("{}[{}]", self.config.formaction_field(), request.path);
        match request.params.param(&formaction_key) {
            Param::One(token) => return Ok(token),
            Param::Many => {
                return Err(AuthError::TokenMalformed("encoded token is not a string"));
            }
            Param::Absent => {}
        }
        match request.params.param(self.config.field()) {
            Param::One(token) => Ok(token),
            Param::Many => Err(AuthError::TokenMalformed("encoded token is not a string")),
            Param::Absent => Err(AuthError::TokenMissing),
        }
    }

    fn header_token<'r>(&self, request: &CsrfRequest<'r>) -> Result<&'r str, AuthError> {
        let mut values = request.headers.get_all(self.config.header()).iter();
        match (values.next(), values.next()) {
            (None, _) => Err(AuthError::TokenMissing),
            (Some(value), None) => value
                .to_str()
                .map_err(|_| AuthError::TokenMalformed("encoded token is not a string")),
            (Some(_), Some(_)) => Err(AuthError::TokenMalformed("encoded token is not a string")),
        }
    }

    fn verify_encoded(
        &self,
        encoded: &str,
        request: &CsrfRequest<'_>,
        session: &mut CookieSession,
    ) -> Result<(), AuthError> {
        if let Some(key) = self.config.legacy_token_key() {
            if session
                .get(key)
                .is_some_and(|legacy| constant_time_eq(legacy.as_bytes(), encoded.as_bytes()))
            {
                debug!("Accepted legacy CSRF token");
                return Ok(());
            }
        }

        let decoded = token::decode(encoded)?;
        let secret = token::csrf_secret(session, self.config.key())?;
        let method = request.method.as_str();

        if token::verify(&secret, method, request.path, &decoded) {
            return Ok(());
        }

        if self.config.require_request_specific_tokens() {
            return Err(AuthError::TokenInvalid(
                "decoded token is not valid for request method and path",
            ));
        }

        if token::verify(&secret, "", "", &decoded) {
            Ok(())
        } else {
            Err(AuthError::TokenInvalid(
                "decoded token is not valid for either request method and path or for blank method and path",
            ))
        }
    }
}

/// Resolve a form action to the path its token must be bound to.
///
/// Empty, `#...` and `?...` actions post back to `current_path`; absolute URLs
/// and absolute paths keep their path; relative paths are joined to `current_path`.
///
/// # Errors
/// Returns an error if the action cannot be parsed as a URL reference.
pub fn csrf_path(action: &str, current_path: &str) -> Result<String> {
    if action.is_empty() || action.starts_with('#') || action.starts_with('?') {
        return Ok(current_path.to_string());
    }

    let base = Url::parse("http://localhost/")
        .and_then(|root| root.join(current_path))
        .with_context(|| format!("invalid request path: {current_path}"))?;
    let resolved = base
        .join(action)
        .with_context(|| format!("invalid form action: {action}"))?;
    Ok(resolved.path().to_string())
}

fn empty_403() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FORBIDDEN;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    fn guard(config: CsrfConfig) -> CsrfGuard {
        CsrfGuard::new(config)
    }

    fn post_to<'a>(
        path: &'a str,
        headers: &'a HeaderMap,
        params: &'a RequestParams,
    ) -> CsrfRequest<'a> {
        CsrfRequest {
            method: &Method::POST,
            path,
            headers,
            params,
        }
    }

    #[test]
    fn token_validates_for_its_method_and_path_only() -> Result<()> {
        let guard = guard(CsrfConfig::new());
        let mut session = CookieSession::new();
        let headers = HeaderMap::new();
        let pairs = [
            ("/sessions", Method::POST),
            ("/users", Method::POST),
            ("/sessions", Method::DELETE),
            ("/items/42", Method::PATCH),
        ];

        for (path, method) in &pairs {
            let token = guard.generate_token(&mut session, Some(path), Some(method))?;
            let params = RequestParams::from_pairs([("_csrf", token.as_str())]);

            for (other_path, other_method) in &pairs {
                let request = CsrfRequest {
                    method: other_method,
                    path: other_path,
                    headers: &headers,
                    params: &params,
                };
                let result = guard.validate(&request, &mut session, &CheckOptions::default());
                if other_path == path && other_method == method {
                    assert!(result.is_ok(), "{method} {path} should validate");
                } else {
                    assert!(matches!(result, Err(AuthError::TokenInvalid(_))));
                }
            }
        }
        Ok(())
    }

    #[test]
    fn path_without_method_defaults_to_post() -> Result<()> {
        let guard = guard(CsrfConfig::new());
        let mut session = CookieSession::new();
        let token = guard.token_for(&mut session, "/sessions")?;
        let headers = HeaderMap::new();
        let params = RequestParams::from_pairs([("_csrf", token)]);
        let request = post_to("/sessions", &headers, &params);
        assert!(guard.valid_csrf(&request, &mut session, &CheckOptions::default()));
        Ok(())
    }

    #[test]
    fn safe_methods_are_exempt() {
        let guard = guard(CsrfConfig::new());
        let mut session = CookieSession::new();
        let headers = HeaderMap::new();
        let params = RequestParams::default();
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            let request = CsrfRequest {
                method: &method,
                path: "/login",
                headers: &headers,
                params: &params,
            };
            assert!(guard
                .validate(&request, &mut session, &CheckOptions::default())
                .is_ok());
        }
        assert!(session.is_empty());
    }

    #[test]
    fn missing_token_is_reported() {
        let guard = guard(CsrfConfig::new());
        let mut session = CookieSession::new();
        let headers = HeaderMap::new();
        let params = RequestParams::from_pairs([("email", "a@example.com")]);
        let request = post_to("/sessions", &headers, &params);
        assert!(matches!(
            guard.validate(&request, &mut session, &CheckOptions::default()),
            Err(AuthError::TokenMissing)
        ));
    }

    #[test]
    fn repeated_field_is_malformed() -> Result<()> {
        let guard = guard(CsrfConfig::new());
        let mut session = CookieSession::new();
        let token = guard.token_for(&mut session, "/sessions")?;
        let headers = HeaderMap::new();
        let params = RequestParams::from_pairs([("_csrf", token.clone()), ("_csrf", token)]);
        let request = post_to("/sessions", &headers, &params);
        assert!(matches!(
            guard.validate(&request, &mut session, &CheckOptions::default()),
            Err(AuthError::TokenMalformed("encoded token is not a string"))
        ));
        Ok(())
    }

    #[test]
    fn wrong_length_tokens_are_malformed() {
        let guard = guard(CsrfConfig::new());
        let mut session = CookieSession::new();
        let headers = HeaderMap::new();
        for len in [0usize, 1, 43, 83, 85, 120] {
            let params = RequestParams::from_pairs([("_csrf", "A".repeat(len))]);
            let request = post_to("/sessions", &headers, &params);
            assert!(matches!(
                guard.validate(&request, &mut session, &CheckOptions::default()),
                Err(AuthError::TokenMalformed(_))
            ));
        }
    }

    #[test]
    fn token_from_other_session_is_invalid() -> Result<()> {
        let guard = guard(CsrfConfig::new());
        let mut ours = CookieSession::new();
        let mut theirs = CookieSession::new();
        let token = guard.token_for(&mut theirs, "/sessions")?;
        let headers = HeaderMap::new();
        let params = RequestParams::from_pairs([("_csrf", token)]);
        let request = post_to("/sessions", &headers, &params);
        assert!(matches!(
            guard.validate(&request, &mut ours, &CheckOptions::default()),
            Err(AuthError::TokenInvalid(_))
        ));
        Ok(())
    }

    #[test]
    fn formaction_field_wins_over_global_field() -> Result<()> {
        let guard = guard(CsrfConfig::new());
        let mut session = CookieSession::new();
        let good = guard.token_for(&mut session, "/sessions")?;
        let bad = guard.token_for(&mut session, "/elsewhere")?;
        let headers = HeaderMap::new();
        let params = RequestParams::from_pairs([
            ("_csrf", bad.as_str()),
            ("_csrfs[/sessions]", good.as_str()),
        ]);
        let request = post_to("/sessions", &headers, &params);
        assert!(guard.valid_csrf(&request, &mut session, &CheckOptions::default()));
        Ok(())
    }

    #[test]
    fn repeated_formaction_field_is_malformed() -> Result<()> {
        let guard = guard(CsrfConfig::new());
        let mut session = CookieSession::new();
        let good = guard.token_for(&mut session, "/sessions")?;
        let headers = HeaderMap::new();
        let params = RequestParams::from_pairs([
            ("_csrfs[/sessions]", good.as_str()),
            ("_csrfs[/sessions]", good.as_str()),
            ("_csrf", good.as_str()),
        ]);
        let request = post_to("/sessions", &headers, &params);
        assert!(matches!(
            guard.validate(&request, &mut session, &CheckOptions::default()),
            Err(AuthError::TokenMalformed("encoded token is not a string"))
        ));
        Ok(())
    }

    #[test]
    fn formaction_for_other_path_falls_back_to_global_field() -> Result<()> {
        let guard = guard(CsrfConfig::new());
        let mut session = CookieSession::new();
        let good = guard.token_for(&mut session, "/sessions")?;
        let headers = HeaderMap::new();
        let params =
            RequestParams::from_pairs([("_csrfs[/users]", "x"), ("_csrf", good.as_str())]);
        let request = post_to("/sessions", &headers, &params);
        assert!(guard.valid_csrf(&request, &mut session, &CheckOptions::default()));
        Ok(())
    }

    #[test]
    fn blanket_token_needs_relaxed_mode() -> Result<()> {
        let strict = guard(CsrfConfig::new());
        let relaxed = guard(CsrfConfig::new().with_require_request_specific_tokens(false));
        let mut session = CookieSession::new();
        let token = strict.blanket_token(&mut session)?;
        let headers = HeaderMap::new();
        let params = RequestParams::from_pairs([("_csrf", token)]);
        let request = post_to("/anything", &headers, &params);

        assert!(matches!(
            strict.validate(&request, &mut session, &CheckOptions::default()),
            Err(AuthError::TokenInvalid(
                "decoded token is not valid for request method and path"
            ))
        ));
        assert!(relaxed.valid_csrf(&request, &mut session, &CheckOptions::default()));
        Ok(())
    }

    #[test]
    fn relaxed_mode_still_rejects_foreign_path_tokens() -> Result<()> {
        let relaxed = guard(CsrfConfig::new().with_require_request_specific_tokens(false));
        let mut session = CookieSession::new();
        let token = relaxed.token_for(&mut session, "/users")?;
        let headers = HeaderMap::new();
        let params = RequestParams::from_pairs([("_csrf", token)]);
        let request = post_to("/sessions", &headers, &params);
        assert!(matches!(
            relaxed.validate(&request, &mut session, &CheckOptions::default()),
            Err(AuthError::TokenInvalid(
                "decoded token is not valid for either request method and path or for blank method and path"
            ))
        ));
        Ok(())
    }

    #[test]
    fn header_only_ignores_params() -> Result<()> {
        let guard = guard(CsrfConfig::new().with_check_header(HeaderCheck::Only));
        let mut session = CookieSession::new();
        let token = guard.token_for(&mut session, "/sessions")?;

        let params = RequestParams::from_pairs([("_csrf", token.as_str())]);
        let empty = HeaderMap::new();
        let request = post_to("/sessions", &empty, &params);
        assert!(matches!(
            guard.validate(&request, &mut session, &CheckOptions::default()),
            Err(AuthError::TokenMissing)
        ));

        let mut headers = HeaderMap::new();
        headers.insert("x-csrf-token", HeaderValue::from_str(&token)?);
        let no_params = RequestParams::default();
        let request = post_to("/sessions", &headers, &no_params);
        assert!(guard.valid_csrf(&request, &mut session, &CheckOptions::default()));
        Ok(())
    }

    #[test]
    fn either_accepts_header_or_params() -> Result<()> {
        let guard = guard(CsrfConfig::new().with_check_header(HeaderCheck::Either));
        let mut session = CookieSession::new();
        let token = guard.token_for(&mut session, "/sessions")?;

        let empty = HeaderMap::new();
        let params = RequestParams::from_pairs([("_csrf", token.as_str())]);
        assert!(guard.valid_csrf(
            &post_to("/sessions", &empty, &params),
            &mut session,
            &CheckOptions::default()
        ));

        let mut headers = HeaderMap::new();
        headers.insert("x-csrf-token", HeaderValue::from_str(&token)?);
        let junk = RequestParams::from_pairs([("_csrf", "junk")]);
        assert!(guard.valid_csrf(
            &post_to("/sessions", &headers, &junk),
            &mut session,
            &CheckOptions::default()
        ));

        let none = RequestParams::default();
        assert!(matches!(
            guard.validate(
                &post_to("/sessions", &empty, &none),
                &mut session,
                &CheckOptions::default()
            ),
            Err(AuthError::TokenMissing)
        ));
        Ok(())
    }

    #[test]
    fn explicit_token_takes_precedence() -> Result<()> {
        let guard = guard(CsrfConfig::new());
        let mut session = CookieSession::new();
        let token = guard.token_for(&mut session, "/sessions")?;
        let headers = HeaderMap::new();
        let params = RequestParams::from_pairs([("_csrf", "junk")]);
        let request = post_to("/sessions", &headers, &params);
        let options = CheckOptions {
            token: Some(token),
            failure: None,
        };
        assert!(guard.valid_csrf(&request, &mut session, &options));
        Ok(())
    }

    #[test]
    fn legacy_token_is_accepted_when_configured() {
        let guard = guard(CsrfConfig::new().with_legacy_token_key("csrf.token".to_string()));
        let mut session = CookieSession::new();
        session.insert("csrf.token", "legacy-raw-token");
        let headers = HeaderMap::new();
        let params = RequestParams::from_pairs([("_csrf", "legacy-raw-token")]);
        let request = post_to("/sessions", &headers, &params);
        assert!(guard.valid_csrf(&request, &mut session, &CheckOptions::default()));
    }

    #[test]
    fn check_applies_failure_actions() {
        let headers = HeaderMap::new();
        let params = RequestParams::default();
        let request = post_to("/sessions", &headers, &params);

        let raise = guard(CsrfConfig::new());
        let mut session = CookieSession::new();
        assert!(matches!(
            raise.check(&request, &mut session, &CheckOptions::default()),
            CsrfOutcome::Fatal(AuthError::TokenMissing)
        ));

        let empty = guard(CsrfConfig::new().with_failure(FailureAction::Empty403));
        match empty.check(&request, &mut session, &CheckOptions::default()) {
            CsrfOutcome::Halt(response) => {
                assert_eq!(response.status(), StatusCode::FORBIDDEN);
                assert_eq!(
                    response.headers().get(CONTENT_LENGTH),
                    Some(&HeaderValue::from_static("0"))
                );
                assert_eq!(
                    response.headers().get(CONTENT_TYPE),
                    Some(&HeaderValue::from_static("text/html"))
                );
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let clear = guard(CsrfConfig::new().with_failure(FailureAction::ClearSession));
        let mut session = CookieSession::new();
        session.insert("session_token", "abc");
        assert!(matches!(
            clear.check(&request, &mut session, &CheckOptions::default()),
            CsrfOutcome::SessionCleared
        ));
        assert!(session.is_empty());

        let custom = guard(CsrfConfig::new().with_failure(FailureAction::Custom(Arc::new(
            |_err: &AuthError| (StatusCode::IM_A_TEAPOT, "nope").into_response(),
        ))));
        match custom.check(&request, &mut session, &CheckOptions::default()) {
            CsrfOutcome::Halt(response) => assert_eq!(response.status(), StatusCode::IM_A_TEAPOT),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn per_call_failure_override() {
        let guard = guard(CsrfConfig::new());
        let headers = HeaderMap::new();
        let params = RequestParams::default();
        let request = post_to("/sessions", &headers, &params);
        let mut session = CookieSession::new();
        let options = CheckOptions {
            token: None,
            failure: Some(FailureAction::Empty403),
        };
        assert!(matches!(
            guard.check(&request, &mut session, &options),
            CsrfOutcome::Halt(_)
        ));
    }

    #[test]
    fn tags_name_the_configured_fields() -> Result<()> {
        let guard = guard(CsrfConfig::new());
        let mut session = CookieSession::new();

        let tag = guard.csrf_tag(&mut session, Some("/sessions"), None)?;
        assert!(tag.starts_with("<input type=\"hidden\" name=\"_csrf\" value=\""));

        let tag = guard.formaction_tag(&mut session, "/a\"b", None)?;
        assert!(tag.contains("name=\"_csrfs[&#x2F;a&quot;b]\""));

        let meta = guard.metatag(&mut session)?;
        assert!(meta.starts_with("<meta name=\"_csrf\" content=\""));
        Ok(())
    }

    #[test]
    fn csrf_path_resolution() -> Result<()> {
        assert_eq!(csrf_path("", "/users/new")?, "/users/new");
        assert_eq!(csrf_path("#top", "/users/new")?, "/users/new");
        assert_eq!(csrf_path("?page=2", "/users/new")?, "/users/new");
        assert_eq!(csrf_path("/sessions", "/login")?, "/sessions");
        assert_eq!(
            csrf_path("https://example.com/sessions?x=1", "/login")?,
            "/sessions"
        );
        assert_eq!(csrf_path("edit", "/users/new")?, "/users/edit");
        assert_eq!(csrf_path("../items", "/users/new")?, "/items");
        Ok(())
    }

    #[test]
    fn request_params_parse_query_and_form() {
        let params = RequestParams::parse(
            Some("_csrf=abc&x=1"),
            Some(b"email=a%40example.com&_csrfs%5B%2Fsessions%5D=tok".as_slice()),
        );
        assert_eq!(params.param("x"), Param::One("1"));
        assert_eq!(params.param("email"), Param::One("a@example.com"));
        assert_eq!(params.param("_csrfs[/sessions]"), Param::One("tok"));
        assert_eq!(params.param("missing"), Param::Absent);
    }
}
