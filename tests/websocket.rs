//! WebSocket relay and front-end authentication.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use server_proxy::config::loader::parse_config;
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, Message};

mod common;

#[tokio::test]
async fn test_websocket_echo() {
    let backend = common::start_ws_echo_backend().await;
    let proxy = common::start_proxy(common::config()).await;

    let url = proxy.ws_url(&format!("/proxy/{}/ws", backend.port()));
    let (mut ws, response) = tokio_tungstenite::connect_async(url).await.unwrap();
    assert_eq!(response.status(), 101);

    ws.send(Message::text("hello")).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    assert_eq!(reply.to_text().unwrap(), "hello");

    ws.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    assert_eq!(&reply.into_data()[..], &[1, 2, 3]);

    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_websocket_host_not_allowed_never_connects() {
    let (backend, connections) = common::start_backend(|_, _| async {}).await;

    let mut config = common::config();
    config.proxy.host_allowlist = vec!["localhost".into()];
    let proxy = common::start_proxy(config).await;

    let url = proxy.ws_url(&format!("/proxy/127.0.0.1:{}/ws", backend.port()));
    assert!(tokio_tungstenite::connect_async(url).await.is_err());
    assert_eq!(connections.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreachable_backend_closes_client_socket() {
    let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let proxy = common::start_proxy(common::config()).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(proxy.ws_url(&format!("/proxy/{}/ws", port)))
        .await
        .unwrap();

    match ws.next().await {
        Some(Ok(Message::Close(Some(frame)))) => assert_eq!(u16::from(frame.code), 1011),
        other => panic!("expected close frame, got {other:?}"),
    }
}

fn auth_config() -> server_proxy::ProxyConfig {
    parse_config(
        r#"
        [auth]
        token = "secret"
        login_url = "/login"
        "#,
    )
    .unwrap()
}

#[tokio::test]
async fn test_unauthenticated_upgrade_is_forbidden() {
    let backend = common::start_ws_echo_backend().await;
    let proxy = common::start_proxy(auth_config()).await;

    let res = common::client()
        .get(proxy.url(&format!("/proxy/{}/ws", backend.port())))
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
}

#[tokio::test]
async fn test_unauthenticated_browser_get_redirects_to_login() {
    let proxy = common::start_proxy(auth_config()).await;

    let res = common::client().get(proxy.url("/proxy/1234/x")).send().await.unwrap();
    assert_eq!(res.status(), 302);
    let location = res.headers()["location"].to_str().unwrap();
    assert_eq!(location, "/login?next=%2Fproxy%2F1234%2Fx");
}

#[tokio::test]
async fn test_token_authenticates_http_and_websocket() {
    let backend = common::start_ws_echo_backend().await;
    let (http_backend, _) = common::start_echo_head_backend().await;
    let proxy = common::start_proxy(auth_config()).await;

    let res = common::client()
        .get(proxy.url(&format!("/proxy/{}/?token=secret", http_backend.port())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let mut request = proxy
        .ws_url(&format!("/proxy/{}/ws", backend.port()))
        .into_client_request()
        .unwrap();
    request.headers_mut().insert("authorization", "token secret".parse().unwrap());
    let (mut ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    ws.send(Message::text("ping")).await.unwrap();
    assert_eq!(ws.next().await.unwrap().unwrap().to_text().unwrap(), "ping");
}

#[tokio::test]
async fn test_client_ping_reaches_backend_and_gets_one_pong() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = listener.local_addr().unwrap();
    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Ping(data) = &msg {
                let _ = seen_tx.send(data.to_vec());
            } else if msg.is_text() {
                if ws.send(msg).await.is_err() {
                    break;
                }
            } else if msg.is_close() {
                break;
            }
        }
    });
    let proxy = common::start_proxy(common::config()).await;

    let url = proxy.ws_url(&format!("/proxy/{}/ws", backend.port()));
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws.send(Message::Ping(b"x".to_vec().into())).await.unwrap();
    ws.send(Message::text("after")).await.unwrap();

    let mut pongs = 0;
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Pong(data) => {
                assert_eq!(&data[..], b"x");
                pongs += 1;
            }
            Message::Text(text) => {
                assert_eq!(text.as_str(), "after");
                break;
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(pongs, 1);
    assert_eq!(seen_rx.recv().await.unwrap(), b"x");
}

#[tokio::test]
async fn test_backend_ping_reaches_client() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        ws.send(Message::Ping(b"y".to_vec().into())).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    });
    let proxy = common::start_proxy(common::config()).await;

    let url = proxy.ws_url(&format!("/proxy/{}/ws", backend.port()));
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    match ws.next().await.unwrap().unwrap() {
        Message::Ping(data) => assert_eq!(&data[..], b"y"),
        other => panic!("unexpected {:?}", other),
    }
    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_backend_sees_every_requested_subprotocol() {
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = listener.local_addr().unwrap();
    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let callback = move |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
            let requested = req.headers().get("sec-websocket-protocol").cloned();
            if let Some(value) = &requested {
                let first = value.to_str().unwrap().split(',').next().unwrap().trim().to_string();
                resp.headers_mut().insert("sec-websocket-protocol", first.parse().unwrap());
            }
            let _ = seen_tx.send(requested.map(|v| v.to_str().unwrap().to_string()));
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(socket, callback).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    });
    let proxy = common::start_proxy(common::config()).await;

    let mut request = proxy
        .ws_url(&format!("/proxy/{}/ws", backend.port()))
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", "a, b".parse().unwrap());
    let (mut ws, response) = tokio_tungstenite::connect_async(request).await.unwrap();

    assert_eq!(response.headers()["sec-websocket-protocol"], "a");
    assert_eq!(seen_rx.recv().await.unwrap().as_deref(), Some("a, b"));
    ws.close(None).await.unwrap();
}

#[tokio::test]
async fn test_activity_recorded_per_frame() {
    let backend = common::start_ws_echo_backend().await;
    let sink = Arc::new(common::CountingSink::default());
    let proxy = common::start_proxy_with_activity(common::config(), sink.clone()).await;

    let url = proxy.ws_url(&format!("/proxy/{}/ws", backend.port()));
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    for text in ["one", "two"] {
        ws.send(Message::text(text)).await.unwrap();
        let reply = ws.next().await.unwrap().unwrap();
        assert_eq!(reply.to_text().unwrap(), text);
    }

    // Two frames each way.
    assert!(sink.count() >= 4, "activity count {}", sink.count());
    ws.close(None).await.unwrap();
}
