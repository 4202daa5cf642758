//! # Gatehouse
//!
//! Cookie-session authentication with signed, request-bound CSRF tokens.
//!
//! ## Sessions
//!
//! The browser holds one signed cookie carrying a small key/value map. After a
//! successful login the map stores a random session token whose SHA-256 hash
//! identifies a row in the `sessions` table. Logging out deletes the row and
//! drops the token.
//!
//! ## CSRF
//!
//! Unsafe requests (`POST`, `PUT`, `PATCH`, `DELETE`) must carry a token minted
//! for the same method and path: 31 random bytes followed by an HMAC-SHA256 over
//! `METHOD || PATH || random`, keyed by a per-browser secret kept in the cookie.

pub mod auth;
pub mod cli;
pub mod gatehouse;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
