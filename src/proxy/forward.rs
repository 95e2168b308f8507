//! HTTP forwarding in buffered and progressive mode.
//!
//! # Responsibilities
//! - Check the allowlist before any backend I/O
//! - Build the backend request (filtered headers, context headers, body)
//! - Drop hop-by-hop headers from the backend response in both modes
//! - Buffered mode: collect the response, run the rewrite pipeline, emit once
//! - Progressive mode: emit the head as soon as it is parsed, then every
//!   body chunk as it arrives
//!
//! # Design Decisions
//! - Redirects are never followed
//! - Deadlines are absolute: the request timeout covers head and body
//! - Unix socket routes get a client of their own per request

use std::sync::Arc;

use axum::{
    body::Body,
    http::{request::Parts, Request},
    response::Response,
};
use futures_util::StreamExt;
use hyper::ext::ReasonPhrase;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use tokio::time::{sleep_until, timeout_at, Instant};

use crate::error::ProxyError;
use crate::net::{BackendConnector, UnixSocketResolver};
use crate::proxy::headers::{
    inject_context_headers, proxy_request_headers, strip_framing, strip_hop_by_hop, wants_event_stream,
};
use crate::proxy::target::ProxyTarget;
use crate::resilience::timeouts::{classify_client_error, describe, request_timeout};
use crate::resilience::{BackendTimeouts, Deadlines};
use crate::rewrite::{OriginalResponse, RewritableResponse, RewriteContext};
use crate::security::ActivitySink;

type BackendClient = Client<BackendConnector, Body>;

/// Forwards requests to backends.
#[derive(Clone)]
pub struct ProxyCore {
    buffered: BackendClient,
    streaming: BackendClient,
    timeouts: BackendTimeouts,
    activity: Arc<dyn ActivitySink>,
    max_body_size: usize,
}

impl ProxyCore {
    pub fn new(timeouts: BackendTimeouts, activity: Arc<dyn ActivitySink>, max_body_size: usize) -> Self {
        Self {
            buffered: build_client(BackendConnector::tcp(timeouts.buffered.connect)),
            streaming: build_client(BackendConnector::tcp(timeouts.streaming.connect)),
            timeouts,
            activity,
            max_body_size,
        }
    }

    pub fn timeouts(&self) -> &BackendTimeouts {
        &self.timeouts
    }

    pub fn activity(&self) -> &Arc<dyn ActivitySink> {
        &self.activity
    }

    /// Connector reaching `target` with the given connect timeout.
    pub(crate) fn connector_for(&self, target: &ProxyTarget, deadlines: Deadlines) -> BackendConnector {
        match &target.unix_socket {
            Some(socket) => BackendConnector::unix(UnixSocketResolver::new(socket), deadlines.connect),
            None => BackendConnector::tcp(deadlines.connect),
        }
    }

    fn client_for(&self, target: &ProxyTarget, streaming: bool) -> BackendClient {
        let deadlines = if streaming {
            self.timeouts.streaming
        } else {
            self.timeouts.buffered
        };
        match target.unix_socket {
            Some(_) => build_client(self.connector_for(target, deadlines)),
            None if streaming => self.streaming.clone(),
            None => self.buffered.clone(),
        }
    }

    /// Allowlist and Unix socket checks shared by HTTP and WebSocket.
    pub(crate) fn check_target(&self, target: &ProxyTarget, parts: &Parts) -> Result<(), ProxyError> {
        if !target.allowlist.allowed(parts, &target.host) {
            tracing::warn!(route = %target.route, host = %target.host, "Host not in allowlist");
            return Err(ProxyError::HostNotAllowed(target.host.clone()));
        }
        if target.unix_socket.is_some() && target.host != "localhost" {
            return Err(ProxyError::BackendError(format!(
                "Unix socket route '{}' must target localhost, not '{}'",
                target.route, target.host
            )));
        }
        Ok(())
    }

    /// Forward one HTTP request.
    pub async fn forward_http(&self, target: &ProxyTarget, request: Request<Body>) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();
        self.check_target(target, &parts)?;
        self.activity.record_activity();

        let body = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| ProxyError::InvalidRequest(describe(&e)))?;

        let streaming = wants_event_stream(&parts.headers);
        let mut headers = proxy_request_headers(&parts.headers, &target.request_headers);
        if !target.absolute_url {
            inject_context_headers(&mut headers, &target.context_path);
        }

        let uri = target.backend_uri("http", parts.uri.query());
        let mut builder = Request::builder().method(parts.method.clone()).uri(&uri);
        if let Some(h) = builder.headers_mut() {
            *h = headers;
        }
        let backend_request = builder
            .body(if body.is_empty() { Body::empty() } else { Body::from(body) })
            .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;

        tracing::debug!(
            route = %target.route,
            method = %parts.method,
            uri = %uri,
            streaming,
            "Forwarding to backend"
        );

        let client = self.client_for(target, streaming);
        if streaming {
            self.progressive(client, backend_request).await
        } else {
            self.buffered(client, target, &parts, backend_request).await
        }
    }

    async fn buffered(
        &self,
        client: BackendClient,
        target: &ProxyTarget,
        parts: &Parts,
        request: Request<Body>,
    ) -> Result<Response, ProxyError> {
        let deadline = Instant::now() + self.timeouts.buffered.request;

        let response = match timeout_at(deadline, client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(classify_client_error(&e)),
            Err(_) => return Err(request_timeout()),
        };

        let (mut head, incoming) = response.into_parts();
        strip_hop_by_hop(&mut head.headers);
        let body = match timeout_at(deadline, axum::body::to_bytes(Body::new(incoming), usize::MAX)).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => return Err(classify_client_error(&e)),
            Err(_) => return Err(request_timeout()),
        };

        let reason = head
            .extensions
            .get::<ReasonPhrase>()
            .map(|r| String::from_utf8_lossy(r.as_bytes()).into_owned());
        let original = RewritableResponse::new(OriginalResponse::new(head.status, reason, head.headers, body));

        let rewritten = if target.rewrite.is_empty() {
            original
        } else {
            let ctx = RewriteContext {
                request: Some(parts),
                original: &original,
                host: &target.host,
                port: target.port,
                path: &target.proxied_path,
            };
            target.rewrite.apply(&original, &ctx)
        };

        Ok(rewritten.into_response())
    }

    async fn progressive(&self, client: BackendClient, request: Request<Body>) -> Result<Response, ProxyError> {
        let deadline = Instant::now() + self.timeouts.streaming.request;

        let response = match timeout_at(deadline, client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(classify_client_error(&e)),
            Err(_) => return Err(request_timeout()),
        };

        let (mut head, incoming) = response.into_parts();
        strip_hop_by_hop(&mut head.headers);
        strip_framing(&mut head.headers);

        let activity = self.activity.clone();
        let chunks = Body::new(incoming)
            .into_data_stream()
            .take_until(sleep_until(deadline))
            .inspect(move |chunk| match chunk {
                Ok(_) => activity.record_activity(),
                Err(e) => tracing::warn!(error = %e, "Backend stream failed"),
            });

        let mut out = Response::new(Body::from_stream(chunks));
        *out.status_mut() = head.status;
        *out.headers_mut() = head.headers;
        if let Some(reason) = head.extensions.remove::<ReasonPhrase>() {
            out.extensions_mut().insert(reason);
        }
        Ok(out)
    }
}

fn build_client(connector: BackendConnector) -> BackendClient {
    Client::builder(TokioExecutor::new()).build(connector)
}
