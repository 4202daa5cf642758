//! Token minting and HMAC verification.
//!
//! A token is `random(31) || HMAC-SHA256(secret, METHOD || PATH || random)`,
//! base64 encoded to 84 characters. The secret is 32 random bytes kept in the
//! cookie session.

use anyhow::{anyhow, Result};
use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::auth::{cookie::CookieSession, error::AuthError, utils::random_bytes};

type HmacSha256 = Hmac<Sha256>;

pub(crate) const RANDOM_BYTES: usize = 31;
pub(crate) const HMAC_BYTES: usize = 32;
pub(crate) const DECODED_TOKEN_LEN: usize = RANDOM_BYTES + HMAC_BYTES;
pub(crate) const ENCODED_TOKEN_LEN: usize = 84;
pub(crate) const SECRET_BYTES: usize = 32;

/// Decoded token halves.
pub(crate) struct DecodedToken {
    pub(crate) random: [u8; RANDOM_BYTES],
    pub(crate) tag: [u8; HMAC_BYTES],
}

/// Read the CSRF secret from the cookie session, creating it on first use.
pub(crate) fn csrf_secret(session: &mut CookieSession, key: &str) -> Result<Vec<u8>> {
    if let Some(secret) = session
        .get(key)
        .and_then(|encoded| Base64::decode_vec(encoded).ok())
        .filter(|secret| secret.len() == SECRET_BYTES)
    {
        return Ok(secret);
    }

    let secret = random_bytes::<SECRET_BYTES>()?;
    session.insert(key, Base64::encode_string(&secret));
    Ok(secret.to_vec())
}

fn keyed(secret: &[u8], method: &str, path: &str, random: &[u8]) -> Result<HmacSha256> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| anyhow!("invalid CSRF secret length"))?;
    mac.update(method.to_ascii_uppercase().as_bytes());
    mac.update(path.as_bytes());
    mac.update(random);
    Ok(mac)
}

/// Mint a token bound to `method` and `path` (both empty for a blanket token).
pub(crate) fn mint(secret: &[u8], method: &str, path: &str) -> Result<String> {
    let random = random_bytes::<RANDOM_BYTES>()?;
    let tag = keyed(secret, method, path, &random)?.finalize().into_bytes();

    let mut raw = Vec::with_capacity(DECODED_TOKEN_LEN);
    raw.extend_from_slice(&random);
    raw.extend_from_slice(&tag);
    Ok(Base64::encode_string(&raw))
}

/// Decode and length-check a submitted token.
pub(crate) fn decode(encoded: &str) -> Result<DecodedToken, AuthError> {
    if encoded.len() != ENCODED_TOKEN_LEN {
        return Err(AuthError::TokenMalformed("encoded token length is not 84"));
    }

    let raw = Base64::decode_vec(encoded)
        .map_err(|_| AuthError::TokenMalformed("encoded token is not valid base64"))?;
    if raw.len() != DECODED_TOKEN_LEN {
        return Err(AuthError::TokenMalformed("decoded token length is not 63"));
    }

    let mut random = [0u8; RANDOM_BYTES];
    let mut tag = [0u8; HMAC_BYTES];
    random.copy_from_slice(&raw[..RANDOM_BYTES]);
    tag.copy_from_slice(&raw[RANDOM_BYTES..]);
    Ok(DecodedToken { random, tag })
}

/// Recompute the HMAC for `method`/`path` and compare it in constant time.
pub(crate) fn verify(secret: &[u8], method: &str, path: &str, token: &DecodedToken) -> bool {
    keyed(secret, method, path, &token.random)
        .map(|mac| mac.verify_slice(&token.tag).is_ok())
        .unwrap_or(false)
}
