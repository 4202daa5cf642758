use axum::extract::FromRef;
use std::sync::Arc;

use crate::auth::{CookieCodec, CsrfGuard, SessionManager};

/// Shared application state handed to every handler and middleware.
#[derive(Clone, Debug)]
pub struct AppState {
    sessions: SessionManager,
    csrf: CsrfGuard,
    cookies: Arc<CookieCodec>,
}

impl AppState {
    #[must_use]
    pub fn new(sessions: SessionManager, csrf: CsrfGuard, cookies: CookieCodec) -> Self {
        Self {
            sessions,
            csrf,
            cookies: Arc::new(cookies),
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    #[must_use]
    pub fn cookies(&self) -> Arc<CookieCodec> {
        self.cookies.clone()
    }
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for CsrfGuard {
    fn from_ref(state: &AppState) -> Self {
        state.csrf.clone()
    }
}
