//! CSRF guard configuration.

use anyhow::{anyhow, Context, Result};
use axum::{
    http::{HeaderName, Method},
    response::Response,
};
use std::{fmt, str::FromStr, sync::Arc};

use crate::auth::error::AuthError;

pub const DEFAULT_FIELD: &str = "_csrf";
pub const DEFAULT_FORMACTION_FIELD: &str = "_csrfs";
pub const DEFAULT_HEADER: &str = "x-csrf-token";
pub const DEFAULT_SECRET_KEY: &str = "_gatehouse_csrf_secret";

/// Where the guard looks for the submitted token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeaderCheck {
    /// Request parameters only.
    #[default]
    Params,
    /// The configured header only.
    Only,
    /// Valid if either the parameter token or the header token validates.
    Either,
}

impl FromStr for HeaderCheck {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "params" => Ok(Self::Params),
            "header" | "only" => Ok(Self::Only),
            "either" => Ok(Self::Either),
            other => Err(anyhow!("unsupported CSRF header check: {other}")),
        }
    }
}

pub type CsrfFailureHandler = Arc<dyn Fn(&AuthError) -> Response + Send + Sync>;

/// What happens when an unsafe request carries no valid token.
#[derive(Clone, Default)]
pub enum FailureAction {
    /// Surface the error to the caller.
    #[default]
    Raise,
    /// Reply with an empty 403.
    Empty403,
    /// Clear the cookie session and let the request continue.
    ClearSession,
    /// Delegate to an application handler.
    Custom(CsrfFailureHandler),
}

impl fmt::Debug for FailureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raise => write!(f, "Raise"),
            Self::Empty403 => write!(f, "Empty403"),
            Self::ClearSession => write!(f, "ClearSession"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl FromStr for FailureAction {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "raise" => Ok(Self::Raise),
            "empty-403" | "empty_403" => Ok(Self::Empty403),
            "clear-session" | "clear_session" => Ok(Self::ClearSession),
            other => Err(anyhow!("unsupported CSRF failure action: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CsrfConfig {
    field: String,
    formaction_field: String,
    header: HeaderName,
    key: String,
    require_request_specific_tokens: bool,
    check_header: HeaderCheck,
    check_methods: Vec<Method>,
    failure: FailureAction,
    legacy_token_key: Option<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            field: DEFAULT_FIELD.to_string(),
            formaction_field: DEFAULT_FORMACTION_FIELD.to_string(),
            header: HeaderName::from_static(DEFAULT_HEADER),
            key: DEFAULT_SECRET_KEY.to_string(),
            require_request_specific_tokens: true,
            check_header: HeaderCheck::Params,
            check_methods: vec![Method::POST, Method::DELETE, Method::PATCH, Method::PUT],
            failure: FailureAction::Raise,
            legacy_token_key: None,
        }
    }
}

impl CsrfConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_field(mut self, field: String) -> Self {
        self.field = field;
        self
    }

    #[must_use]
    pub fn with_formaction_field(mut self, field: String) -> Self {
        self.formaction_field = field;
        self
    }

    /// # Errors
    /// Returns an error if `header` is not a valid HTTP header name.
    pub fn with_header(mut self, header: &str) -> Result<Self> {
        self.header = HeaderName::from_bytes(header.to_ascii_lowercase().as_bytes())
            .with_context(|| format!("invalid CSRF header name: {header}"))?;
        Ok(self)
    }

    #[must_use]
    pub fn with_key(mut self, key: String) -> Self {
        self.key = key;
        self
    }

    #[must_use]
    pub fn with_require_request_specific_tokens(mut self, required: bool) -> Self {
        self.require_request_specific_tokens = required;
        self
    }

    #[must_use]
    pub fn with_check_header(mut self, check: HeaderCheck) -> Self {
        self.check_header = check;
        self
    }

    #[must_use]
    pub fn with_check_methods(mut self, methods: Vec<Method>) -> Self {
        self.check_methods = methods;
        self
    }

    #[must_use]
    pub fn with_failure(mut self, failure: FailureAction) -> Self {
        self.failure = failure;
        self
    }

    #[must_use]
    pub fn with_legacy_token_key(mut self, key: String) -> Self {
        self.legacy_token_key = Some(key);
        self
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    #[must_use]
    pub fn formaction_field(&self) -> &str {
        &self.formaction_field
    }

    #[must_use]
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn require_request_specific_tokens(&self) -> bool {
        self.require_request_specific_tokens
    }

    #[must_use]
    pub fn check_header(&self) -> HeaderCheck {
        self.check_header
    }

    #[must_use]
    pub fn check_methods(&self) -> &[Method] {
        &self.check_methods
    }

    #[must_use]
    pub fn failure(&self) -> &FailureAction {
        &self.failure
    }

    #[must_use]
    pub fn legacy_token_key(&self) -> Option<&str> {
        self.legacy_token_key.as_deref()
    }
}
