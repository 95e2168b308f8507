//! Response handling at the request boundary.
//!
//! # Responsibilities
//! - Map `ProxyError` to a client-visible status and text body
//! - Log every failure once, with its status
//!
//! # Design Decisions
//! - Backend timeouts are reported as 599 with the timeout description as
//!   the reason phrase, since 599 has no canonical one
//! - Other statuses keep their canonical reason

use axum::{
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use hyper::ext::ReasonPhrase;

use crate::error::ProxyError;

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "Proxy request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %message, "Proxy request rejected");
        }

        let mut response = (status, message.clone()).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        if status.canonical_reason().is_none() {
            if let Ok(reason) = ReasonPhrase::try_from(message.into_bytes()) {
                response.extensions_mut().insert(reason);
            }
        }
        response
    }
}
