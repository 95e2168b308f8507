//! Readiness probe for freshly spawned processes.
//!
//! `GET /` on the allocated address. Any HTTP response means ready; only a
//! failed connection or exchange means not ready.

use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use tokio::time::{sleep_until, timeout_at, Instant};

use crate::net::BackendConnector;

/// Send one probe request.
pub async fn probe_once(client: &Client<BackendConnector, Body>, port: u16) -> bool {
    let request = match Request::get(format!("http://localhost:{}/", port)).body(Body::empty()) {
        Ok(request) => request,
        Err(_) => return false,
    };
    match client.request(request).await {
        Ok(response) => {
            tracing::debug!(port, status = %response.status(), "Readiness probe answered");
            true
        }
        Err(e) => {
            tracing::trace!(port, error = %e, "Readiness probe failed");
            false
        }
    }
}

/// Probe every `interval` until a probe succeeds or `timeout` elapses.
///
/// The last wait is cut short at the deadline and followed by one final
/// probe, so a backend that comes up just before the deadline is seen.
pub async fn wait_until_ready(
    connector: BackendConnector,
    port: u16,
    interval: Duration,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    let client = Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(0)
        .build(connector);

    loop {
        let budget = deadline.max(Instant::now() + interval);
        if let Ok(true) = timeout_at(budget, probe_once(&client, port)).await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep_until((now + interval).min(deadline)).await;
    }
}
