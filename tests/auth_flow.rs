use anyhow::{anyhow, Result};
use axum::{
    body::Body,
    http::{
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        Method, Request, StatusCode,
    },
    response::Response,
    Router,
};
use gatehouse::{
    auth::{
        csrf::FailureAction,
        memory::{MemorySessionRepository, MemoryUserRepository},
        storage::SessionRepository,
        users::{register, NewUser, RegisterOutcome},
        CookieCodec, CsrfConfig, CsrfGuard, SessionManager,
    },
    gatehouse::{router, AppState},
};
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "integration-secret-integration-secret-integration-secret-0123456789";
const COOKIE_NAME: &str = "_gatehouse.session";

#[derive(Deserialize)]
struct FormTarget {
    action: String,
    field: String,
    token: String,
}

struct App {
    router: Router,
    users: Arc<MemoryUserRepository>,
    sessions: Arc<MemorySessionRepository>,
}

impl App {
    fn new() -> Result<Self> {
        Self::with_csrf(CsrfConfig::new())
    }

    fn with_csrf(config: CsrfConfig) -> Result<Self> {
        let users = Arc::new(MemoryUserRepository::new());
        let sessions = Arc::new(MemorySessionRepository::new());
        let manager = SessionManager::new(users.clone(), sessions.clone());
        let codec = CookieCodec::new(SecretString::from(SECRET))?;
        let state = AppState::new(manager, CsrfGuard::new(config), codec);
        Ok(Self {
            router: router(state),
            users,
            sessions,
        })
    }

    async fn user(&self, email: &str, password: &str) -> Result<()> {
        let outcome = register(
            self.users.as_ref(),
            &NewUser {
                username: email.split('@').next().unwrap_or(email).to_string(),
                email: email.to_string(),
                password: password.to_string(),
            },
        )
        .await?;
        match outcome {
            RegisterOutcome::Created(_) => Ok(()),
            _ => Err(anyhow!("fixture user was not created")),
        }
    }

    fn browser(&self) -> Browser {
        Browser {
            router: self.router.clone(),
            cookie: None,
        }
    }
}

/// Carries the session cookie between requests.
struct Browser {
    router: Router,
    cookie: Option<String>,
}

impl Browser {
    async fn send(&mut self, method: Method, uri: &str, form: Option<&[(&str, &str)]>) -> Result<Response> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(COOKIE, format!("{COOKIE_NAME}={cookie}"));
        }
        let body = match form {
            Some(pairs) => {
                builder = builder.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                Body::from(encoded)
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body)?).await?;
        self.remember(&response);
        Ok(response)
    }

    fn remember(&mut self, response: &Response) {
        for header in response.headers().get_all(SET_COOKIE) {
            let Ok(value) = header.to_str() else {
                continue;
            };
            let Some(pair) = value.split(';').next() else {
                continue;
            };
            if let Some((name, value)) = pair.split_once('=') {
                if name == COOKIE_NAME {
                    self.cookie = (!value.is_empty()).then(|| value.to_string());
                }
            }
        }
    }

    async fn get(&mut self, uri: &str) -> Result<Response> {
        self.send(Method::GET, uri, None).await
    }

    async fn form_target(&mut self, uri: &str) -> Result<FormTarget> {
        let response = self.get(uri).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn login(&mut self, email: &str, password: &str) -> Result<Response> {
        let target = self.form_target("/login").await?;
        assert_eq!(target.action, "/sessions");
        self.send(
            Method::POST,
            &target.action,
            Some(&[
                (target.field.as_str(), target.token.as_str()),
                ("email", email),
                ("password", password),
            ]),
        )
        .await
    }
}

fn location(response: &Response) -> Option<&str> {
    response.headers().get(LOCATION).and_then(|v| v.to_str().ok())
}

#[tokio::test]
async fn login_with_valid_token_creates_session() -> Result<()> {
    let app = App::new()?;
    app.user("alice@example.com", "s3cret").await?;
    let mut browser = app.browser();

    let response = browser.login("alice@example.com", "s3cret").await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/home"));
    assert_eq!(app.sessions.count().await?, 1);

    let response = browser.get("/home").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(SET_COOKIE));
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let home: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(home["email"], "alice@example.com");

    let response = browser.get("/login").await?;
    assert_eq!(location(&response), Some("/home"));
    Ok(())
}

#[tokio::test]
async fn login_returns_to_protected_page() -> Result<()> {
    let app = App::new()?;
    app.user("alice@example.com", "s3cret").await?;
    let mut browser = app.browser();

    let response = browser.get("/home").await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/login"));

    let response = browser.login("alice@example.com", "s3cret").await?;
    assert_eq!(location(&response), Some("/home"));
    Ok(())
}

#[tokio::test]
async fn resumed_session_refreshes_cookie() -> Result<()> {
    let app = App::new()?;
    app.user("alice@example.com", "s3cret").await?;
    let mut browser = app.browser();
    browser.login("alice@example.com", "s3cret").await?;
    let before = browser.cookie.clone();

    let response = browser.get("/home").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(set_cookie.starts_with(&format!("{COOKIE_NAME}=")));
    assert!(!set_cookie.contains("Max-Age=0"));
    assert!(browser.cookie.is_some());
    assert_eq!(browser.cookie, before);

    let response = browser.get("/home").await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn wrong_password_redirects_to_login() -> Result<()> {
    let app = App::new()?;
    app.user("alice@example.com", "s3cret").await?;
    let mut browser = app.browser();

    let response = browser.login("alice@example.com", "nope").await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/login"));
    assert_eq!(app.sessions.count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn login_without_token_is_forbidden() -> Result<()> {
    let app = App::new()?;
    app.user("alice@example.com", "s3cret").await?;
    let mut browser = app.browser();
    browser.form_target("/login").await?;

    let response = browser
        .send(
            Method::POST,
            "/sessions",
            Some(&[("email", "alice@example.com"), ("password", "s3cret")]),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.sessions.count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn token_for_another_path_is_forbidden() -> Result<()> {
    let app = App::new()?;
    app.user("alice@example.com", "s3cret").await?;
    let mut browser = app.browser();
    let signup = browser.form_target("/signup").await?;

    let response = browser
        .send(
            Method::POST,
            "/sessions",
            Some(&[
                (signup.field.as_str(), signup.token.as_str()),
                ("email", "alice@example.com"),
                ("password", "s3cret"),
            ]),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.sessions.count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn token_from_another_browser_is_forbidden() -> Result<()> {
    let app = App::new()?;
    app.user("alice@example.com", "s3cret").await?;
    let mut attacker = app.browser();
    let stolen = attacker.form_target("/login").await?;

    let mut victim = app.browser();
    victim.form_target("/login").await?;
    let response = victim
        .send(
            Method::POST,
            "/sessions",
            Some(&[
                (stolen.field.as_str(), stolen.token.as_str()),
                ("email", "alice@example.com"),
                ("password", "s3cret"),
            ]),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn empty_403_failure_has_no_body() -> Result<()> {
    let app = App::with_csrf(CsrfConfig::new().with_failure(FailureAction::Empty403))?;
    let mut browser = app.browser();

    let response = browser
        .send(Method::POST, "/sessions", Some(&[("email", "a@b.c")]))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert!(body.is_empty());
    Ok(())
}

#[tokio::test]
async fn delete_session_requires_token() -> Result<()> {
    let app = App::new()?;
    app.user("alice@example.com", "s3cret").await?;
    let mut browser = app.browser();
    browser.login("alice@example.com", "s3cret").await?;

    let response = browser.send(Method::DELETE, "/sessions", None).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.sessions.count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn logout_deletes_session() -> Result<()> {
    let app = App::new()?;
    app.user("alice@example.com", "s3cret").await?;
    let mut browser = app.browser();
    browser.login("alice@example.com", "s3cret").await?;
    assert_eq!(app.sessions.count().await?, 1);

    let response = browser.get("/logout").await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/login"));
    assert_eq!(app.sessions.count().await?, 0);

    let response = browser.get("/home").await?;
    assert_eq!(location(&response), Some("/login"));
    Ok(())
}

#[tokio::test]
async fn signup_creates_user_and_session() -> Result<()> {
    let app = App::new()?;
    let mut browser = app.browser();
    let target = browser.form_target("/signup").await?;
    assert_eq!(target.action, "/users");

    let response = browser
        .send(
            Method::POST,
            &target.action,
            Some(&[
                (target.field.as_str(), target.token.as_str()),
                ("username", "bob"),
                ("email", "bob@example.com"),
                ("password", "hunter2"),
            ]),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some("/home"));
    assert_eq!(app.sessions.count().await?, 1);

    let mut other = app.browser();
    let target = other.form_target("/signup").await?;
    let response = other
        .send(
            Method::POST,
            &target.action,
            Some(&[
                (target.field.as_str(), target.token.as_str()),
                ("username", "bobby"),
                ("email", "bob@example.com"),
                ("password", "hunter3"),
            ]),
        )
        .await?;
    assert_eq!(location(&response), Some("/signup"));
    assert_eq!(app.sessions.count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn tampered_cookie_is_ignored() -> Result<()> {
    let app = App::new()?;
    app.user("alice@example.com", "s3cret").await?;
    let mut browser = app.browser();
    browser.login("alice@example.com", "s3cret").await?;

    browser.cookie = browser.cookie.map(|c| format!("x{c}"));
    let response = browser.get("/home").await?;
    assert_eq!(location(&response), Some("/login"));
    Ok(())
}

#[tokio::test]
async fn health_and_security_headers() -> Result<()> {
    let app = App::new()?;
    let mut browser = app.browser();

    let response = browser.get("/health").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers
        .get("x-app")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with(env!("CARGO_PKG_NAME"))));
    assert_eq!(headers.get("x-frame-options").map(|v| v.as_bytes()), Some(&b"deny"[..]));
    assert_eq!(
        headers.get("x-content-type-options").map(|v| v.as_bytes()),
        Some(&b"nosniff"[..])
    );
    assert!(headers.contains_key("content-security-policy"));
    assert!(headers.contains_key("x-request-id"));
    Ok(())
}
