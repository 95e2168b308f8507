//! Access control middleware.
//! Rejects unauthenticated requests before any routing or proxying happens.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ProxyError;
use crate::proxy::headers::is_websocket_upgrade;
use crate::security::auth::Authenticator;

/// State required for access control.
#[derive(Clone)]
pub struct AccessControlState {
    pub authenticator: Arc<dyn Authenticator>,
    pub login_url: Option<String>,
}

pub async fn access_control_middleware(
    State(state): State<AccessControlState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();

    if state.authenticator.is_authenticated(&parts) {
        return next.run(Request::from_parts(parts, body)).await;
    }

    // Redirects are meaningless for WebSocket clients.
    if parts.method == Method::GET && is_websocket_upgrade(&parts.headers) {
        tracing::warn!(path = %parts.uri.path(), "Unauthenticated WebSocket upgrade");
        return ProxyError::Unauthenticated.into_response();
    }

    if parts.method == Method::GET || parts.method == Method::HEAD {
        if let Some(login_url) = &state.login_url {
            let next_param = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("next", &parts.uri.to_string())
                .finish();
            let separator = if login_url.contains('?') { '&' } else { '?' };
            let location = format!("{}{}{}", login_url, separator, next_param);
            if let Ok(location) = HeaderValue::try_from(location) {
                return (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
            }
        }
    }

    tracing::debug!(method = %parts.method, path = %parts.uri.path(), "Unauthenticated request");
    ProxyError::Unauthenticated.into_response()
}
