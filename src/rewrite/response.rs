//! Rewritable view over a buffered backend response.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use hyper::ext::ReasonPhrase;

use crate::proxy::headers::strip_framing;

/// Reason used when a status code has no canonical phrase.
const UNKNOWN_REASON: &str = "Unknown";

fn canonical_reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or(UNKNOWN_REASON)
}

/// Immutable snapshot of the response as the backend sent it.
#[derive(Debug)]
pub struct OriginalResponse {
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OriginalResponse {
    pub fn new(status: StatusCode, reason: Option<String>, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            reason: reason.unwrap_or_else(|| canonical_reason(status).to_string()),
            headers,
            body,
        }
    }
}

/// A response that rewrite steps can read and modify.
///
/// Cloning is cheap: headers, body and reason stay shared with the
/// original until a step writes to them.
#[derive(Debug, Clone)]
pub struct RewritableResponse {
    original: Arc<OriginalResponse>,
    status: StatusCode,
    reason: Option<String>,
    headers: Option<HeaderMap>,
    body: Option<Bytes>,
}

impl RewritableResponse {
    pub fn new(original: OriginalResponse) -> Self {
        let status = original.status;
        Self {
            original: Arc::new(original),
            status,
            reason: None,
            headers: None,
            body: None,
        }
    }

    pub fn original(&self) -> &OriginalResponse {
        &self.original
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Set the status code.
    ///
    /// A reason phrase still equal to the old status' canonical phrase
    /// follows the new status; a custom phrase is kept.
    pub fn set_status(&mut self, status: StatusCode) {
        if self.reason() == canonical_reason(self.status) {
            self.reason = Some(canonical_reason(status).to_string());
        }
        self.status = status;
    }

    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or(&self.original.reason)
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }

    pub fn headers(&self) -> &HeaderMap {
        self.headers.as_ref().unwrap_or(&self.original.headers)
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        let original = &self.original;
        self.headers.get_or_insert_with(|| original.headers.clone())
    }

    pub fn body(&self) -> &Bytes {
        self.body.as_ref().unwrap_or(&self.original.body)
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = Some(body.into());
    }

    /// Build the client response. Framing headers are dropped so the
    /// transport recomputes them for the final body.
    pub fn into_response(self) -> Response {
        let reason = self.reason().to_string();
        let status = self.status;
        let body = self.body().clone();
        let mut headers = match self.headers {
            Some(headers) => headers,
            None => self.original.headers.clone(),
        };
        strip_framing(&mut headers);

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;

        if reason != canonical_reason(status) {
            match ReasonPhrase::try_from(reason.into_bytes()) {
                Ok(phrase) => {
                    response.extensions_mut().insert(phrase);
                }
                Err(_) => tracing::debug!(status = %status, "Dropping invalid reason phrase"),
            }
        }

        response
    }
}
