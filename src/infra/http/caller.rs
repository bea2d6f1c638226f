//! Caller identity resolved from the `Authorization` header or cookie.

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use axum_extra::extract::cookie::CookieJar;

use crate::domain::types::UserId;

use super::error::ApiError;

const AUTH_COOKIE: &str = "Authorization";

/// Possibly anonymous caller. Invalid credentials resolve to anonymous.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Caller(pub Option<UserId>);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Caller>().copied().unwrap_or_default())
    }
}

/// Authenticated caller; rejects anonymous requests with 401.
#[derive(Debug, Clone, Copy)]
pub struct RequireUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for RequireUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Caller>() {
            Some(Caller(Some(user))) => Ok(RequireUser(*user)),
            _ => Err(ApiError::unauthorized("Valid credentials required")),
        }
    }
}

/// Bearer header wins over the cookie. The cookie may hold the bare token or
/// a `Bearer ` prefixed value.
pub fn presented_token(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(strip_bearer);
    if from_header.is_some() {
        return from_header;
    }

    let jar = CookieJar::from_headers(headers);
    let raw = jar.get(AUTH_COOKIE)?.value().trim();
    strip_bearer(raw).or_else(|| (!raw.is_empty()).then(|| raw.to_string()))
}

fn strip_bearer(raw: &str) -> Option<String> {
    let token = raw.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn header_token_is_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("Authorization=xyz"));
        assert_eq!(presented_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn cookie_token_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; Authorization=xyz"));
        assert_eq!(presented_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn missing_or_blank_credentials_are_none() {
        assert_eq!(presented_token(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(presented_token(&headers), None);
    }
}
