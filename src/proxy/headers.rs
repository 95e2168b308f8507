//! Header filtering between client and backend.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers from forwarded requests
//! - Strip framing headers from re-emitted responses
//! - Inject the `X-Forwarded-*` context headers
//! - Detect WebSocket upgrades and event-stream requests

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

/// Headers that only make sense for a single connection.
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Response headers the client transport recomputes for the final body.
pub const FRAMING: &[&str] = &[
    "content-length",
    "transfer-encoding",
    "content-encoding",
    "connection",
];

/// Headers the WebSocket client library generates for its own handshake.
pub const WS_HANDSHAKE: &[&str] = &[
    "host",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-extensions",
    "sec-websocket-protocol",
    "sec-websocket-accept",
];

/// Context headers set for backends mounted under a path prefix.
pub const CONTEXT_HEADERS: &[&str] = &[
    "x-forwarded-context",
    "x-proxycontextpath",
    "x-forwarded-prefix",
];

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::try_from(token.trim()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

/// Remove framing headers from a backend response.
pub fn strip_framing(headers: &mut HeaderMap) {
    for name in FRAMING {
        headers.remove(*name);
    }
}

/// Build the header map sent to the backend for a plain HTTP request.
///
/// `Host` and `Content-Length` are set by the client from the target URI
/// and the body. `Accept-Encoding` is dropped so the backend answers
/// uncompressed (the response's `Content-Encoding` is stripped on the way
/// back).
pub fn proxy_request_headers(inbound: &HeaderMap, overrides: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::ACCEPT_ENCODING);
    apply_overrides(&mut headers, overrides);
    headers
}

/// Build the header map forwarded with a backend WebSocket handshake.
pub fn websocket_request_headers(inbound: &HeaderMap, overrides: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    for name in WS_HANDSHAKE {
        headers.remove(*name);
    }
    headers.remove(header::CONTENT_LENGTH);
    apply_overrides(&mut headers, overrides);
    headers
}

fn apply_overrides(headers: &mut HeaderMap, overrides: &HeaderMap) {
    for (name, value) in overrides {
        headers.insert(name.clone(), value.clone());
    }
}

/// Set the three context headers to the mount path.
pub fn inject_context_headers(headers: &mut HeaderMap, context_path: &str) {
    match HeaderValue::try_from(context_path) {
        Ok(value) => {
            for name in CONTEXT_HEADERS {
                headers.insert(*name, value.clone());
            }
        }
        Err(_) => tracing::warn!(context_path, "Context path is not a valid header value"),
    }
}

/// `Upgrade: websocket`, case-insensitive.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::UPGRADE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|v| v.trim().eq_ignore_ascii_case("websocket"))
}

/// `Accept: text/event-stream` selects progressive delivery.
pub fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("text/event-stream"))
        .unwrap_or(false)
}

/// Parse `Sec-WebSocket-Protocol` into the ordered list of subprotocols.
pub fn requested_subprotocols(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_hop_by_hop_never_forwarded() {
        let inbound = headers(&[
            ("connection", "keep-alive, x-secret"),
            ("keep-alive", "timeout=5"),
            ("upgrade", "h2c"),
            ("proxy-authorization", "Basic abc"),
            ("te", "trailers"),
            ("x-secret", "1"),
            ("x-kept", "yes"),
            ("content-length", "12"),
            ("accept-encoding", "gzip"),
        ]);
        let out = proxy_request_headers(&inbound, &HeaderMap::new());

        for name in HOP_BY_HOP {
            assert!(!out.contains_key(*name), "{} forwarded", name);
        }
        assert!(!out.contains_key("x-secret"));
        assert!(!out.contains_key("content-length"));
        assert!(!out.contains_key("accept-encoding"));
        assert_eq!(out["x-kept"], "yes");
    }

    #[test]
    fn test_overrides_replace_inbound() {
        let inbound = headers(&[("x-user", "alice")]);
        let overrides = headers(&[("x-user", "proxy")]);
        let out = proxy_request_headers(&inbound, &overrides);
        assert_eq!(out.get_all("x-user").iter().count(), 1);
        assert_eq!(out["x-user"], "proxy");
    }

    #[test]
    fn test_framing_stripped() {
        let mut map = headers(&[
            ("content-length", "3"),
            ("transfer-encoding", "chunked"),
            ("content-encoding", "gzip"),
            ("connection", "close"),
            ("x-custom", "v"),
        ]);
        strip_framing(&mut map);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_detection_helpers() {
        assert!(is_websocket_upgrade(&headers(&[("upgrade", "WebSocket")])));
        assert!(!is_websocket_upgrade(&headers(&[("upgrade", "h2c")])));
        assert!(wants_event_stream(&headers(&[("accept", "Text/Event-Stream ")])));
        assert!(!wants_event_stream(&headers(&[("accept", "text/html")])));
        assert_eq!(
            requested_subprotocols(&headers(&[("sec-websocket-protocol", "a, b,c")])),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn test_websocket_headers_drop_handshake() {
        let inbound = headers(&[
            ("sec-websocket-key", "abc"),
            ("sec-websocket-version", "13"),
            ("host", "front:8888"),
            ("cookie", "c=1"),
        ]);
        let out = websocket_request_headers(&inbound, &HeaderMap::new());
        assert_eq!(out.len(), 1);
        assert_eq!(out["cookie"], "c=1");
    }
}
