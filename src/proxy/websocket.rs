//! WebSocket relay between a client and a backend.
//!
//! The client handshake is accepted with the client's first requested
//! subprotocol; the backend receives the full list and may pick another one.
//! A mismatch is logged, not repaired.
//!
//! Both sides answer pings on their own, so pings are relayed and pongs are
//! dropped. Every frame read from either side counts as activity.

use std::sync::Arc;

use axum::{
    extract::ws::{self, CloseFrame, Message, WebSocket, WebSocketUpgrade},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    protocol::{frame::coding::CloseCode, CloseFrame as BackendCloseFrame},
    Message as BackendMessage,
};

use crate::error::ProxyError;
use crate::net::BackendConnector;
use crate::proxy::forward::ProxyCore;
use crate::proxy::headers::{inject_context_headers, requested_subprotocols, websocket_request_headers};
use crate::proxy::target::ProxyTarget;
use crate::security::ActivitySink;

/// Everything the relay task needs once the client upgrade completed.
struct BackendHandshake {
    route: String,
    host: String,
    port: u16,
    uri: String,
    headers: HeaderMap,
    subprotocols: Vec<String>,
    connector: BackendConnector,
}

impl ProxyCore {
    /// Accept the client upgrade and relay frames to the backend.
    ///
    /// Allowlist failures are reported before the upgrade, so the client
    /// gets a plain 403 and the backend is never contacted.
    pub fn relay_websocket(
        &self,
        target: &ProxyTarget,
        parts: &Parts,
        upgrade: WebSocketUpgrade,
    ) -> Result<Response, ProxyError> {
        self.check_target(target, parts)?;

        let subprotocols = requested_subprotocols(&parts.headers);
        let mut headers = websocket_request_headers(&parts.headers, &target.request_headers);
        if !target.absolute_url {
            inject_context_headers(&mut headers, &target.context_path);
        }

        let handshake = BackendHandshake {
            route: target.route.clone(),
            host: target.host.clone(),
            port: target.port,
            uri: target.backend_uri("ws", parts.uri.query()),
            headers,
            subprotocols: subprotocols.clone(),
            connector: self.connector_for(target, self.timeouts().buffered),
        };
        let activity = self.activity().clone();

        let upgrade = if subprotocols.is_empty() {
            upgrade
        } else {
            upgrade.protocols(subprotocols)
        };

        Ok(upgrade.on_upgrade(move |client| relay(client, handshake, activity)))
    }
}

async fn relay(mut client: WebSocket, handshake: BackendHandshake, activity: Arc<dyn ActivitySink>) {
    let route = handshake.route.clone();
    let client_protocol = client.protocol().cloned();

    let backend = match connect_backend(handshake).await {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!(route = %route, error = %e, "Backend WebSocket connection failed");
            let _ = client
                .send(Message::Close(Some(CloseFrame {
                    code: ws::close_code::ERROR,
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };
    let (backend, backend_protocol) = backend;

    if client_protocol != backend_protocol {
        tracing::warn!(
            route = %route,
            client = ?client_protocol,
            backend = ?backend_protocol,
            "WebSocket subprotocol differs between client and backend"
        );
    }

    tracing::debug!(route = %route, "WebSocket relay established");

    let (mut client_tx, mut client_rx) = client.split();
    let (mut backend_tx, mut backend_rx) = backend.split();

    let client_to_backend = async {
        while let Some(msg) = client_rx.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!(error = %e, "Client WebSocket read failed");
                    break;
                }
            };
            activity.record_activity();
            let closing = matches!(msg, Message::Close(_));
            let Some(msg) = to_backend(msg) else { continue };
            if backend_tx.send(msg).await.is_err() || closing {
                break;
            }
        }
    };

    let backend_to_client = async {
        while let Some(msg) = backend_rx.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!(error = %e, "Backend WebSocket read failed");
                    break;
                }
            };
            activity.record_activity();
            let closing = matches!(msg, BackendMessage::Close(_));
            let Some(msg) = to_client(msg) else { continue };
            if client_tx.send(msg).await.is_err() || closing {
                break;
            }
        }
    };

    tokio::select! {
        _ = client_to_backend => {}
        _ = backend_to_client => {}
    }

    let _ = client_tx.close().await;
    let _ = backend_tx.close().await;
    tracing::debug!(route = %route, "WebSocket relay closed");
}

type BackendSocket = tokio_tungstenite::WebSocketStream<crate::net::BackendStream>;

async fn connect_backend(
    handshake: BackendHandshake,
) -> Result<(BackendSocket, Option<HeaderValue>), tungstenite::Error> {
    let mut request = handshake.uri.as_str().into_client_request()?;
    request.headers_mut().extend(handshake.headers);
    if !handshake.subprotocols.is_empty() {
        if let Ok(value) = HeaderValue::try_from(handshake.subprotocols.join(", ")) {
            request.headers_mut().insert(header::SEC_WEBSOCKET_PROTOCOL, value);
        }
    }

    let stream = handshake.connector.connect(&handshake.host, handshake.port).await?;
    let (socket, response) = tokio_tungstenite::client_async(request, stream).await?;
    let protocol = response.headers().get(header::SEC_WEBSOCKET_PROTOCOL).cloned();
    Ok((socket, protocol))
}

fn to_backend(msg: Message) -> Option<BackendMessage> {
    Some(match msg {
        Message::Text(text) => BackendMessage::Text(text.as_str().to_owned().into()),
        Message::Binary(data) => BackendMessage::Binary(data),
        Message::Ping(data) => BackendMessage::Ping(data),
        Message::Pong(_) => {
            tracing::debug!("Dropping client pong");
            return None;
        }
        Message::Close(frame) => BackendMessage::Close(frame.map(|f| BackendCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        })),
    })
}

fn to_client(msg: BackendMessage) -> Option<Message> {
    Some(match msg {
        BackendMessage::Text(text) => Message::Text(text.as_str().to_owned().into()),
        BackendMessage::Binary(data) => Message::Binary(data),
        BackendMessage::Ping(data) => Message::Ping(data),
        BackendMessage::Pong(_) => {
            tracing::debug!("Dropping backend pong");
            return None;
        }
        BackendMessage::Close(frame) => Message::Close(frame.map(|f| CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        })),
        BackendMessage::Frame(_) => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    #[test]
    fn test_message_conversion_keeps_framing() {
        assert!(matches!(to_backend(Message::Text("hi".into())), Some(BackendMessage::Text(t)) if t.as_str() == "hi"));
        assert!(matches!(
            to_backend(Message::Binary(Bytes::from_static(b"\x01"))),
            Some(BackendMessage::Binary(b)) if b.as_ref() == b"\x01"
        ));
        assert!(matches!(to_client(BackendMessage::Ping(Bytes::from_static(b"p"))), Some(Message::Ping(_))));
        assert!(matches!(to_backend(Message::Ping(Bytes::from_static(b"p"))), Some(BackendMessage::Ping(_))));

        let close = to_client(BackendMessage::Close(Some(BackendCloseFrame {
            code: CloseCode::Away,
            reason: "bye".into(),
        })));
        match close {
            Some(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, 1001);
                assert_eq!(frame.reason.as_str(), "bye");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pongs_are_not_relayed() {
        assert!(to_backend(Message::Pong(Bytes::from_static(b"p"))).is_none());
        assert!(to_client(BackendMessage::Pong(Bytes::from_static(b"p"))).is_none());
    }
}
