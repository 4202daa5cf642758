//! Signed cookie-backed key/value session store.
//!
//! The whole session map travels in one cookie:
//! `base64url(json(map)) "." base64url(hmac_sha256(secret, payload))`.
//! Tampered or truncated cookies decode to an empty session. Handlers reach the
//! store through a [`SessionHandle`] placed in request extensions by
//! [`cookie_session`].

use anyhow::{anyhow, Context, Result};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::Response,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_COOKIE_NAME: &str = "_gatehouse.session";

/// Minimum secret length accepted for signing session cookies.
pub const MIN_SECRET_LEN: usize = 64;

/// Browsers drop cookies larger than this.
const MAX_COOKIE_BYTES: usize = 4096;

/// Request-scoped session values round-tripped through the session cookie.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CookieSession {
    values: BTreeMap<String, String>,
    dirty: bool,
    loaded: bool,
}

impl CookieSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn from_values(values: BTreeMap<String, String>) -> Self {
        Self {
            loaded: !values.is_empty(),
            values,
            dirty: false,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if self.values.get(&key) != Some(&value) {
            self.values.insert(key, value);
            self.dirty = true;
        }
    }

    /// Write `value` and mark the session modified even when it is unchanged,
    /// so the cookie is sent again.
    pub fn refresh(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
        self.dirty = true;
    }

    /// Remove a key and return its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let previous = self.values.remove(key);
        if previous.is_some() {
            self.dirty = true;
        }
        previous
    }

    pub fn clear(&mut self) {
        if !self.values.is_empty() {
            self.values.clear();
            self.dirty = true;
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True once any value was added, changed or removed.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Shared handle to the request's [`CookieSession`].
#[derive(Clone, Debug, Default)]
pub struct SessionHandle(Arc<Mutex<CookieSession>>);

impl SessionHandle {
    #[must_use]
    pub fn new(session: CookieSession) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    pub async fn lock(&self) -> MutexGuard<'_, CookieSession> {
        self.0.lock().await
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionHandle {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "Cookie session layer is not installed",
        ))
    }
}

/// Encodes, signs and verifies session cookies.
pub struct CookieCodec {
    name: String,
    secure: bool,
    secret: SecretString,
}

impl fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieCodec")
            .field("name", &self.name)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl CookieCodec {
    /// # Errors
    /// Returns an error if the secret is shorter than [`MIN_SECRET_LEN`] bytes.
    pub fn new(secret: SecretString) -> Result<Self> {
        let len = secret.expose_secret().len();
        if len < MIN_SECRET_LEN {
            return Err(anyhow!(
                "session secret must be at least {MIN_SECRET_LEN} bytes, got {len}"
            ));
        }
        Ok(Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            secure: false,
            secret,
        })
    }

    #[must_use]
    pub fn with_name(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| anyhow!("invalid cookie signing key"))
    }

    /// Serialize and sign the session values.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn encode(&self, session: &CookieSession) -> Result<String> {
        let json = serde_json::to_vec(&session.values).context("failed to serialize session")?;
        let payload = Base64UrlUnpadded::encode_string(&json);
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let tag = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());
        Ok(format!("{payload}.{tag}"))
    }

    /// Verify and decode a cookie value; `None` when it was not produced by this codec.
    #[must_use]
    pub fn decode(&self, value: &str) -> Option<CookieSession> {
        let (payload, tag) = value.split_once('.')?;
        let tag = Base64UrlUnpadded::decode_vec(tag).ok()?;
        let mut mac = self.mac().ok()?;
        mac.update(payload.as_bytes());
        // verify_slice compares in constant time
        mac.verify_slice(&tag).ok()?;
        let json = Base64UrlUnpadded::decode_vec(payload).ok()?;
        let values: BTreeMap<String, String> = serde_json::from_slice(&json).ok()?;
        Some(CookieSession::from_values(values))
    }

    /// Load the session from the request's `Cookie` headers.
    #[must_use]
    pub fn load(&self, headers: &HeaderMap) -> CookieSession {
        let Some(raw) = find_cookie(headers, &self.name) else {
            return CookieSession::new();
        };
        self.decode(&raw).unwrap_or_else(|| {
            debug!("Discarding session cookie that failed verification");
            CookieSession::new()
        })
    }

    /// Build the `Set-Cookie` value for a modified session, if one is needed.
    ///
    /// # Errors
    /// Returns an error if the session cannot be encoded into a header value.
    pub fn set_cookie(&self, session: &CookieSession) -> Result<Option<HeaderValue>> {
        if !session.is_dirty() {
            return Ok(None);
        }

        let mut cookie = if session.is_empty() {
            if !session.loaded {
                return Ok(None);
            }
            format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", self.name)
        } else {
            let value = self.encode(session)?;
            format!("{}={value}; Path=/; HttpOnly; SameSite=Lax", self.name)
        };
        if self.secure {
            cookie.push_str("; Secure");
        }
        if cookie.len() > MAX_COOKIE_BYTES {
            warn!(
                "Session cookie is {} bytes, browsers may drop it",
                cookie.len()
            );
        }

        HeaderValue::from_str(&cookie)
            .map(Some)
            .context("session cookie is not a valid header value")
    }
}

fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == name {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

/// Middleware: load the cookie session, run the request, write it back.
pub async fn cookie_session(
    State(codec): State<Arc<CookieCodec>>,
    mut request: Request,
    next: Next,
) -> Response {
    let handle = SessionHandle::new(codec.load(request.headers()));
    request.extensions_mut().insert(handle.clone());

    let mut response = next.run(request).await;

    let session = handle.lock().await;
    match codec.set_cookie(&session) {
        Ok(Some(cookie)) => {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        Ok(None) => {}
        Err(err) => error!("Failed to write session cookie: {err:#}"),
    }

    response
}
