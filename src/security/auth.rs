//! Front-end authentication.
//!
//! The hosting server owns sessions; the proxy only asks whether a request
//! is authenticated.

use axum::http::{header, request::Parts};

/// "Is this request authenticated?"
pub trait Authenticator: Send + Sync {
    fn is_authenticated(&self, request: &Parts) -> bool;
}

/// Treats every request as authenticated.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn is_authenticated(&self, _request: &Parts) -> bool {
        true
    }
}

/// Shared-secret token from the `Authorization` header or `?token=`.
#[derive(Debug, Clone)]
pub struct TokenAuthenticator {
    token: String,
}

impl TokenAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    fn header_token(request: &Parts) -> Option<&str> {
        let value = request.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.split_once(' ')?;
        if scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer") {
            Some(token.trim())
        } else {
            None
        }
    }

    fn query_token(request: &Parts) -> Option<String> {
        let query = request.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
    }
}

impl Authenticator for TokenAuthenticator {
    fn is_authenticated(&self, request: &Parts) -> bool {
        if let Some(token) = Self::header_token(request) {
            return token == self.token;
        }
        Self::query_token(request).is_some_and(|t| t == self.token)
    }
}
