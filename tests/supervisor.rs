//! Named routes backed by supervised or external processes.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use server_proxy::config::loader::parse_config;
use server_proxy::error::ProxyError;
use server_proxy::routing::NamedServer;
use server_proxy::supervisor::launch::shell_command;
use server_proxy::supervisor::{ProcessSupervisor, RouteStatus};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;

mod common;

fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path).map(|s| s.lines().count()).unwrap_or(0)
}

#[tokio::test]
async fn test_named_route_over_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("backend.sock");
    let listener = UnixListener::bind(&socket).unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let head = common::read_head(&mut stream).await;
                let line = head.lines().next().unwrap_or_default().to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    line.len(),
                    line
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    let config = parse_config(&format!(
        "[[servers]]\nname = \"sock\"\nunix_socket = \"{}\"\n",
        socket.display()
    ))
    .unwrap();
    let proxy = common::start_proxy(config).await;
    let client = common::client();

    let res = client.get(proxy.url("/sock/hello?x=1")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "GET /hello?x=1 HTTP/1.1");

    let res = client.get(proxy.url("/sock")).send().await.unwrap();
    assert_eq!(res.status(), 301);
    assert_eq!(res.headers()["location"], "/sock/");

    let info: serde_json::Value = client
        .get(proxy.url("/server-proxy/servers-info"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entry = &info["server_processes"][0];
    assert_eq!(entry["name"], "sock");
    assert_eq!(entry["status"], "external");
    assert_eq!(entry["unix_socket"], socket.display().to_string());
    assert!(entry["port"].is_null());
}

#[tokio::test]
async fn test_startup_timeout_then_fresh_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawns");
    let supervisor = ProcessSupervisor::new("/", Duration::from_millis(50));
    let server = NamedServer::new("slow")
        .with_command(shell_command(&format!("echo started >> {}; exec sleep 30", marker.display())))
        .with_timeout(Duration::from_millis(300));

    let err = supervisor.ensure_started(&server).await.unwrap_err();
    assert!(matches!(err, ProxyError::StartupTimeout { .. }));
    assert_eq!(err.to_string(), "could not start slow in time");
    assert_eq!(line_count(&marker), 1);

    let state = supervisor.existing("slow").unwrap();
    assert_eq!(state.status(), RouteStatus::Failed);

    supervisor.ensure_started(&server).await.unwrap_err();
    assert_eq!(line_count(&marker), 2);
    assert_eq!(state.spawn_count(), 2);
}

#[tokio::test]
async fn test_startup_timeout_is_500_over_http() {
    let config = parse_config(
        r#"
        [[servers]]
        name = "slow"
        command = ["/bin/sh", "-c", "exec sleep 30"]
        timeout_secs = 0.3
        "#,
    )
    .unwrap();
    let proxy = common::start_proxy(config).await;

    let res = common::client().get(proxy.url("/slow/")).send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert!(res.text().await.unwrap().contains("could not start slow in time"));
}

#[tokio::test]
async fn test_concurrent_first_requests_spawn_once() {
    let (backend, probes) = common::start_fixed_backend("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawns");

    let supervisor = Arc::new(ProcessSupervisor::new("/", Duration::from_millis(50)));
    let server = Arc::new(
        NamedServer::new("shared")
            .with_port(backend.port())
            .with_command(shell_command(&format!("echo started >> {}; exec sleep 30", marker.display())))
            .with_timeout(Duration::from_secs(5)),
    );

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let supervisor = supervisor.clone();
            let server = server.clone();
            tokio::spawn(async move { supervisor.ensure_started(&server).await.map(|s| s.port) })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), backend.port());
    }

    let state = supervisor.existing("shared").unwrap();
    assert_eq!(state.spawn_count(), 1);
    assert_eq!(probes.load(Ordering::SeqCst), 1);
    assert_eq!(state.status(), RouteStatus::Ready);

    supervisor.shutdown().await;
    assert_eq!(state.status(), RouteStatus::NotStarted);
    assert_eq!(line_count(&marker), 1);
}
