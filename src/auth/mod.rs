//! Cookie sessions, CSRF protection and server-side login sessions.
//!
//! Request flow: [`cookie::cookie_session`] loads the signed cookie,
//! [`csrf::csrf_protect`] validates unsafe requests, and handlers use
//! [`session::AuthContext`] to resolve the current user.

pub mod cookie;
pub mod csrf;
pub mod error;
pub mod memory;
pub mod password;
pub mod session;
pub mod storage;
pub mod users;
pub(crate) mod utils;

pub use cookie::{cookie_session, CookieCodec, CookieSession, SessionHandle};
pub use csrf::{csrf_protect, CsrfConfig, CsrfGuard};
pub use error::AuthError;
pub use session::{AuthContext, SessionManager};
pub use utils::constant_time_eq;
