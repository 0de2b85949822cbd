//! Double-submit CSRF tokens for the import form.

use base64::Engine;
use rand::RngCore;
use rocket::http::{Cookie, CookieJar, SameSite};

use crate::auth::{AuthConfig, AuthError, AuthResult};

/// Return the current CSRF token, setting a fresh cookie when there is none.
pub fn issue_csrf_token(cookies: &CookieJar<'_>, config: &AuthConfig) -> String {
    if let Some(existing) = cookies
        .get(&config.csrf_cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
    {
        return existing;
    }

    let token = generate_random_token();
    let cookie = Cookie::build((config.csrf_cookie_name.clone(), token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(config.cookie_secure)
        .build();
    cookies.add(cookie);

    token
}

/// Check a submitted form token against the cookie.
pub fn verify_csrf_token(
    cookies: &CookieJar<'_>,
    config: &AuthConfig,
    submitted: Option<&str>,
) -> AuthResult<()> {
    let submitted = submitted
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::CsrfMissing)?;
    let expected = cookies
        .get(&config.csrf_cookie_name)
        .map(|cookie| cookie.value().to_string())
        .ok_or(AuthError::CsrfMissing)?;

    if constant_time_eq(submitted.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(AuthError::CsrfMismatch)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn generate_random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_tokens_differ() {
        let a = generate_random_token();
        let b = generate_random_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn compares_tokens_exactly() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
