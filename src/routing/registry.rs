//! Route registry: from request path to proxied backend.
//!
//! # Responsibilities
//! - Match the path (matcher.rs) and build a `ProxyTarget`
//! - Start named routes through the supervisor
//! - Dispatch plain HTTP to `forward_http` and upgrades to `relay_websocket`
//! - Reject unsupported methods (405) and unknown paths (404)

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, FromRequestParts},
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::proxy::headers::is_websocket_upgrade;
use crate::proxy::uri::{context_path, url_path_join};
use crate::proxy::{ProxyCore, ProxyTarget};
use crate::resilience::BackendTimeouts;
use crate::rewrite::{RewritePipeline, RewriteRule};
use crate::routing::matcher::{PathMatcher, RouteMatch};
use crate::routing::route::{NamedServer, RouteKind};
use crate::security::{ActivitySink, HostAllowlist};
use crate::supervisor::{ProcessSupervisor, RouteSnapshot};

/// Methods delegated to the backend.
pub const PROXIED_METHODS: &[Method] = &[
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::HEAD,
    Method::PATCH,
    Method::OPTIONS,
];

/// Route label used for `/proxy/...` routes in logs and metrics.
const PROXY_ROUTE: &str = "proxy";

/// All routes of one server.
pub struct RouteRegistry {
    base_url: String,
    matcher: PathMatcher,
    servers: Vec<NamedServer>,
    /// Allowlist of remote routes; hot-reloadable.
    allowlist: ArcSwap<HostAllowlist>,
    /// Allowlist of local-port and named routes.
    local_allowlist: Arc<HostAllowlist>,
    proxy_rewrite: Arc<RewritePipeline>,
    core: ProxyCore,
    supervisor: ProcessSupervisor,
}

impl RouteRegistry {
    pub fn new(
        base_url: impl Into<String>,
        servers: Vec<NamedServer>,
        allowlist: HostAllowlist,
        proxy_rewrite: RewritePipeline,
        core: ProxyCore,
        supervisor: ProcessSupervisor,
    ) -> Self {
        let base_url = base_url.into();
        let prefixes = servers.iter().map(|s| s.prefix.clone()).collect();
        Self {
            matcher: PathMatcher::new(base_url.clone(), prefixes),
            base_url,
            servers,
            allowlist: ArcSwap::from_pointee(allowlist),
            local_allowlist: Arc::new(HostAllowlist::default()),
            proxy_rewrite: Arc::new(proxy_rewrite),
            core,
            supervisor,
        }
    }

    pub fn from_config(config: &ProxyConfig, activity: Arc<dyn ActivitySink>) -> Self {
        let core = ProxyCore::new(
            BackendTimeouts::from(&config.timeouts),
            activity,
            config.proxy.max_body_size,
        );
        let supervisor = ProcessSupervisor::new(config.base_url.clone(), config.supervisor.probe_interval());
        let servers = config.servers.iter().map(NamedServer::from_config).collect();

        Self::new(
            config.base_url.clone(),
            servers,
            HostAllowlist::from_hosts(config.proxy.host_allowlist.iter().cloned()),
            RewriteRule::pipeline(&config.proxy.rewrite),
            core,
            supervisor,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn servers(&self) -> &[NamedServer] {
        &self.servers
    }

    pub fn core(&self) -> &ProxyCore {
        &self.core
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Current allowlist of remote routes.
    pub fn host_allowlist(&self) -> Arc<HostAllowlist> {
        self.allowlist.load_full()
    }

    /// Replace the allowlist of remote routes.
    pub fn set_host_allowlist(&self, allowlist: HostAllowlist) {
        tracing::info!(allowlist = ?allowlist, "Host allowlist updated");
        self.allowlist.store(Arc::new(allowlist));
    }

    pub fn snapshot(&self) -> Vec<RouteSnapshot> {
        self.supervisor.snapshot(&self.servers)
    }

    /// Handle one request end to end.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let (route, result) = match self.matcher.match_path(&path) {
            None => {
                tracing::debug!(path = %path, "No route matched");
                (None, Ok(StatusCode::NOT_FOUND.into_response()))
            }
            Some(RouteMatch::AddSlash { index }) => {
                let name = self.servers[index].name.clone();
                (Some(name), Ok(add_slash(&request)))
            }
            Some(_) if !PROXIED_METHODS.contains(&method) => {
                (None, Ok(StatusCode::METHOD_NOT_ALLOWED.into_response()))
            }
            Some(RouteMatch::Proxy { kind, host, port, path }) => {
                let target = self.proxy_target(kind, host, port, path);
                (Some(PROXY_ROUTE.to_string()), self.proxy(target, request).await)
            }
            Some(RouteMatch::Named { index, path }) => {
                let server = &self.servers[index];
                (Some(server.name.clone()), self.named(server, path, request).await)
            }
        };

        let response = result.unwrap_or_else(|e| e.into_response());
        metrics::record_request(
            method.as_str(),
            response.status().as_u16(),
            route.as_deref().unwrap_or("none"),
            start,
        );
        response
    }

    fn proxy_target(&self, kind: RouteKind, host: String, port: u16, path: String) -> ProxyTarget {
        let allowlist = match kind {
            RouteKind::Remote | RouteKind::RemoteAbsolute => self.allowlist.load_full(),
            _ => Arc::clone(&self.local_allowlist),
        };
        ProxyTarget {
            route: PROXY_ROUTE.to_string(),
            context_path: context_path(&self.base_url, &host, port, kind.is_absolute()),
            proxied_path: leading_slash(&path),
            host,
            port,
            unix_socket: None,
            absolute_url: kind.is_absolute(),
            allowlist,
            request_headers: HeaderMap::new(),
            rewrite: Arc::clone(&self.proxy_rewrite),
        }
    }

    async fn named(&self, server: &NamedServer, path: String, request: Request<Body>) -> Result<Response, ProxyError> {
        let path = server.path_rewrite.apply(&leading_slash(&path));
        let state = self.supervisor.ensure_started(server).await?;

        let target = ProxyTarget {
            route: server.name.clone(),
            host: "localhost".to_string(),
            port: state.port,
            unix_socket: state.unix_socket.clone(),
            proxied_path: path,
            context_path: url_path_join(&[&self.base_url, &server.prefix]),
            absolute_url: server.absolute_url,
            allowlist: Arc::clone(&self.local_allowlist),
            request_headers: server.request_headers.clone(),
            rewrite: Arc::clone(&server.rewrite),
        };
        self.proxy(target, request).await
    }

    async fn proxy(&self, target: ProxyTarget, request: Request<Body>) -> Result<Response, ProxyError> {
        if request.method() == Method::GET && is_websocket_upgrade(request.headers()) {
            let (mut parts, _body) = request.into_parts();
            let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
                Ok(upgrade) => upgrade,
                Err(rejection) => return Ok(rejection.into_response()),
            };
            return self.core.relay_websocket(&target, &parts, upgrade);
        }
        self.core.forward_http(&target, request).await
    }
}

fn leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// 301 to the same URL with a trailing slash.
fn add_slash(request: &Request<Body>) -> Response {
    let mut location = format!("{}/", request.uri().path());
    if let Some(query) = request.uri().query() {
        location.push('?');
        location.push_str(query);
    }
    match HeaderValue::try_from(location) {
        Ok(location) => (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::ActivityTracker;

    fn registry(servers: Vec<NamedServer>) -> RouteRegistry {
        let core = ProxyCore::new(BackendTimeouts::default(), Arc::new(ActivityTracker::new()), 1024);
        RouteRegistry::new(
            "/base/",
            servers,
            HostAllowlist::default(),
            RewritePipeline::new(),
            core,
            ProcessSupervisor::new("/base/", std::time::Duration::from_millis(10)),
        )
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let r = registry(vec![]);
        let resp = r.dispatch(Request::get("/base/nothing").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_add_slash_redirect() {
        let r = registry(vec![NamedServer::new("lab")]);
        let resp = r.dispatch(Request::get("/base/lab?x=1").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(resp.headers()["location"], "/base/lab/?x=1");
    }

    #[tokio::test]
    async fn test_unsupported_method_is_405() {
        let r = registry(vec![]);
        let req = Request::builder()
            .method("TRACE")
            .uri("/base/proxy/8080/")
            .body(Body::empty())
            .unwrap();
        assert_eq!(r.dispatch(req).await.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_remote_host_not_allowed() {
        let r = registry(vec![]);
        let resp = r.dispatch(Request::get("/base/proxy/example.com:80/").body(Body::empty()).unwrap()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_targets() {
        let r = registry(vec![]);
        let remote = r.proxy_target(RouteKind::Remote, "127.0.0.1".into(), 9000, "".into());
        assert_eq!(remote.proxied_path, "/");
        assert_eq!(remote.context_path, "/base/proxy/127.0.0.1:9000");

        let local = r.proxy_target(RouteKind::LocalPortAbsolute, "localhost".into(), 9000, "/x".into());
        assert_eq!(local.context_path, "/base/proxy/absolute/9000");
        assert!(local.absolute_url);
    }
}
