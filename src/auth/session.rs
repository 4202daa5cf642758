//! Server-side sessions tied to the cookie session.
//!
//! The cookie session carries a random token; the `sessions` table stores its
//! SHA-256 hash. [`AuthContext`] is the per-request view handlers use to
//! resume, require, start and terminate sessions.

use anyhow::anyhow;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{
        header::{LOCATION, USER_AGENT},
        request::Parts,
        StatusCode,
    },
    response::{IntoResponse, Response},
};
use std::{fmt, net::SocketAddr, sync::Arc};
use tracing::{debug, error, info, warn};

use super::{
    cookie::SessionHandle,
    error::AuthError,
    storage::{InsertSessionOutcome, NewSession, Session, SessionRepository, User, UserRepository},
    utils::{
        extract_client_ip, generate_session_token, hash_session_token,
        is_well_formed_session_token,
    },
};

/// Cookie session key holding the session token.
pub const SESSION_TOKEN_KEY: &str = "session_token";

/// Cookie session key holding the path to return to after login.
pub const RETURN_TO_KEY: &str = "return_to_after_authenticating";

pub const DEFAULT_LOGIN_PATH: &str = "/login";

const MAX_TOKEN_ATTEMPTS: usize = 3;

/// `302 Found` to `location`.
pub fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// Repositories and settings shared by every [`AuthContext`].
#[derive(Clone)]
pub struct SessionManager {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    login_path: String,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("login_path", &self.login_path)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(users: Arc<dyn UserRepository>, sessions: Arc<dyn SessionRepository>) -> Self {
        Self {
            users,
            sessions,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
        }
    }

    #[must_use]
    pub fn with_login_path(mut self, login_path: String) -> Self {
        self.login_path = login_path;
        self
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserRepository {
        self.users.as_ref()
    }

    #[must_use]
    pub fn sessions(&self) -> &dyn SessionRepository {
        self.sessions.as_ref()
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }
}

/// Request metadata recorded on new sessions.
#[derive(Clone, Debug, Default)]
pub struct RequestInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<std::net::IpAddr>,
    /// Path and query of the current request.
    pub target: String,
}

impl RequestInfo {
    fn from_parts(parts: &Parts) -> Self {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let ip_address = extract_client_ip(&parts.headers).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        });
        let target = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);
        Self {
            user_agent,
            ip_address,
            target,
        }
    }
}

/// Per-request authentication state.
#[derive(Debug)]
pub struct AuthContext {
    manager: SessionManager,
    cookie: SessionHandle,
    request: RequestInfo,
    current_user: Option<User>,
    current_session: Option<Session>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    SessionManager: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let cookie = SessionHandle::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        Ok(Self::new(
            SessionManager::from_ref(state),
            cookie,
            RequestInfo::from_parts(parts),
        ))
    }
}

impl AuthContext {
    #[must_use]
    pub fn new(manager: SessionManager, cookie: SessionHandle, request: RequestInfo) -> Self {
        Self {
            manager,
            cookie,
            request,
            current_user: None,
            current_session: None,
        }
    }

    #[must_use]
    pub fn current_user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }

    #[must_use]
    pub fn current_session(&self) -> Option<&Session> {
        self.current_session.as_ref()
    }

    #[must_use]
    pub fn authenticated(&self) -> bool {
        self.current_session.is_some()
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        self.manager.login_path()
    }

    #[must_use]
    pub fn cookie(&self) -> &SessionHandle {
        &self.cookie
    }

    /// Look up the session named by the cookie token.
    ///
    /// # Errors
    /// `SessionNotFound` when no row matches, `SessionTokenMalformed` when the
    /// cookie value is not a session token, `Internal` on storage failure.
    pub async fn find_session_by_cookie(&self) -> Result<Option<Session>, AuthError> {
        let Some(token) = self
            .cookie
            .lock()
            .await
            .get(SESSION_TOKEN_KEY)
            .map(ToString::to_string)
        else {
            return Ok(None);
        };

        if !is_well_formed_session_token(&token) {
            return Err(AuthError::SessionTokenMalformed);
        }

        self.manager
            .sessions()
            .find_by_token_hash(&hash_session_token(&token))
            .await?
            .map(Some)
            .ok_or(AuthError::SessionNotFound)
    }

    /// Resume the session named by the cookie, if any.
    ///
    /// # Errors
    /// Returns `AuthError::Internal` if storage fails.
    pub async fn resume_session(&mut self) -> Result<Option<Session>, AuthError> {
        if let Some(session) = &self.current_session {
            return Ok(Some(session.clone()));
        }

        let session = match self.find_session_by_cookie().await {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(None),
            Err(AuthError::SessionNotFound) => {
                debug!("Session cookie does not match a stored session");
                return Ok(None);
            }
            Err(AuthError::SessionTokenMalformed) => {
                warn!("Discarding malformed session token from cookie");
                self.cookie.lock().await.remove(SESSION_TOKEN_KEY);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let Some(user) = self.manager.users().find_by_id(session.user_id).await? else {
            debug!(session_id = %session.id, "Session owner no longer exists");
            return Ok(None);
        };

        self.manager.sessions().touch(session.id).await?;
        {
            let mut cookie = self.cookie.lock().await;
            if let Some(token) = cookie.get(SESSION_TOKEN_KEY).map(ToString::to_string) {
                cookie.refresh(SESSION_TOKEN_KEY, token);
            }
        }
        self.current_user = Some(user);
        self.current_session = Some(session.clone());
        Ok(Some(session))
    }

    /// Resume the session or redirect to the login path.
    ///
    /// The requested path is remembered for [`Self::after_authentication_url`].
    ///
    /// # Errors
    /// The redirect response, or a 500 if storage fails.
    pub async fn require_authentication(&mut self) -> Result<Session, Response> {
        match self.resume_session().await {
            Ok(Some(session)) => Ok(session),
            Ok(None) => {
                self.cookie
                    .lock()
                    .await
                    .insert(RETURN_TO_KEY, self.request.target.clone());
                Err(redirect(self.manager.login_path()))
            }
            Err(err) => Err(err.into_response()),
        }
    }

    /// Create a session for `user` and store its token in the cookie.
    ///
    /// # Errors
    /// Returns `AuthError::Internal` if storage or the random source fails.
    pub async fn start_new_session_for(&mut self, user: User) -> Result<Session, AuthError> {
        let user_id = user.id;
        self.current_user = Some(user);

        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = generate_session_token()?;
            let new_session = NewSession {
                user_id,
                token_hash: hash_session_token(&token),
                user_agent: self.request.user_agent.clone(),
                ip_address: self.request.ip_address,
            };

            match self.manager.sessions().insert_session(&new_session).await? {
                InsertSessionOutcome::Inserted(session) => {
                    self.cookie.lock().await.insert(SESSION_TOKEN_KEY, token);
                    info!(%user_id, session_id = %session.id, "Started session");
                    self.current_session = Some(session.clone());
                    return Ok(session);
                }
                InsertSessionOutcome::DuplicateToken => {
                    warn!("Session token collision, retrying");
                }
            }
        }

        error!(%user_id, "Failed to generate a unique session token");
        Err(AuthError::Internal(anyhow!(
            "failed to generate unique session token"
        )))
    }

    /// Delete the current session and drop its token from the cookie.
    ///
    /// # Errors
    /// Returns `AuthError::Internal` if storage fails.
    pub async fn terminate_session(&mut self) -> Result<(), AuthError> {
        let token = self.cookie.lock().await.remove(SESSION_TOKEN_KEY);
        if let Some(token) = token.filter(|token| is_well_formed_session_token(token)) {
            let deleted = self
                .manager
                .sessions()
                .delete_by_token_hash(&hash_session_token(&token))
                .await?;
            if deleted {
                info!("Terminated session");
            }
        }
        self.current_session = None;
        self.current_user = None;
        Ok(())
    }

    /// Pop the stored return path; `/` when absent or not a local path.
    pub async fn after_authentication_url(&mut self) -> String {
        self.take_return_to()
            .await
            .unwrap_or_else(|| "/".to_string())
    }

    /// Pop the path stored by [`Self::require_authentication`]; non-local
    /// values are dropped.
    pub async fn take_return_to(&mut self) -> Option<String> {
        self.cookie
            .lock()
            .await
            .remove(RETURN_TO_KEY)
            .filter(|target| is_local_path(target))
    }
}

fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.contains('\\')
}
