//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router: status endpoints plus the proxy fallback
//! - Wire up middleware (request ID, tracing, access control)
//! - Serve until shutdown, applying live config changes
//! - Stop supervised processes once the listener has drained

use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::trace::TraceLayer;

use crate::admin::setup_admin_router;
use crate::config::validation::validate_config;
use crate::config::{ConfigError, ProxyConfig};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::routing::RouteRegistry;
use crate::security::{
    access_control_middleware, AccessControlState, ActivityTracker, AllowAll, Authenticator, HostAllowlist,
    TokenAuthenticator,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RouteRegistry>,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    registry: Arc<RouteRegistry>,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let registry = Arc::new(RouteRegistry::from_config(&config, Arc::new(ActivityTracker::new())));
        let authenticator: Arc<dyn Authenticator> = match &config.auth.token {
            Some(token) => Arc::new(TokenAuthenticator::new(token.clone())),
            None => Arc::new(AllowAll),
        };
        Ok(Self::with_registry(config, registry, authenticator))
    }

    /// Build a server around an existing registry, for embedding hosts that
    /// bring their own routes or session handling.
    pub fn with_registry(
        config: ProxyConfig,
        registry: Arc<RouteRegistry>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        let access = AccessControlState {
            authenticator,
            login_url: config.auth.login_url.clone(),
        };
        let state = AppState {
            registry: Arc::clone(&registry),
        };
        let router = Self::build_router(registry.base_url(), state, access);
        Self {
            router,
            registry,
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(base_url: &str, state: AppState, access: AccessControlState) -> Router {
        Router::new()
            .merge(setup_admin_router(base_url))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(middleware::from_fn_with_state(access, access_control_middleware))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request.request_id().unwrap_or("-"),
                )
            }))
            .layer(set_request_id_layer())
    }

    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configs received on `config_updates` replace the host allowlist; any
    /// other difference is logged and needs a restart.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            base_url = %self.config.base_url,
            servers = self.registry.servers().len(),
            "HTTP server starting"
        );

        let registry = Arc::clone(&self.registry);
        let mut current = self.config.clone();
        let reloader = tokio::spawn(async move {
            while let Some(next) = config_updates.recv().await {
                apply_config(&registry, &current, &next);
                current = next;
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        reloader.abort();
        self.registry.supervisor().shutdown().await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Fallback handler: every path that is not a status endpoint.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.registry.dispatch(request).await
}

fn apply_config(registry: &RouteRegistry, current: &ProxyConfig, next: &ProxyConfig) {
    if current.proxy.host_allowlist != next.proxy.host_allowlist {
        registry.set_host_allowlist(HostAllowlist::from_hosts(next.proxy.host_allowlist.iter().cloned()));
    }

    let mut before = current.clone();
    let mut after = next.clone();
    before.proxy.host_allowlist.clear();
    after.proxy.host_allowlist.clear();
    let changed = match (serde_json::to_value(&before), serde_json::to_value(&after)) {
        (Ok(before), Ok(after)) => before != after,
        _ => true,
    };
    if changed {
        tracing::warn!("Configuration changed beyond the host allowlist; restart to apply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn config(toml: &str) -> ProxyConfig {
        crate::config::loader::parse_config(toml).unwrap()
    }

    #[tokio::test]
    async fn test_servers_info_lists_routes() {
        let server = HttpServer::new(config(
            r#"
            base_url = "/base/"
            [[servers]]
            name = "lab"
            "#,
        ))
        .unwrap();

        let request = Request::get("/base/server-proxy/servers-info").body(Body::empty()).unwrap();
        let response = server.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let info: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(info["server_processes"][0]["name"], "lab");
        assert_eq!(info["server_processes"][0]["status"], "not_started");
    }

    #[tokio::test]
    async fn test_token_required() {
        let server = HttpServer::new(config("[auth]\ntoken = \"secret\"")).unwrap();

        let denied = server
            .router
            .clone()
            .oneshot(Request::get("/server-proxy/servers-info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let allowed = server
            .router
            .oneshot(
                Request::get("/server-proxy/servers-info")
                    .header("authorization", "token secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert!(allowed.headers().contains_key("x-request-id"));
    }

    #[test]
    fn test_reload_swaps_allowlist() {
        let current = ProxyConfig::default();
        let server = HttpServer::new(current.clone()).unwrap();
        let mut next = current.clone();
        next.proxy.host_allowlist.push("10.0.0.5".into());

        apply_config(&server.registry, &current, &next);
        let parts = Request::get("/").body(()).unwrap().into_parts().0;
        assert!(server.registry.host_allowlist().allowed(&parts, "10.0.0.5"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut bad = ProxyConfig::default();
        bad.base_url = "no-slash".into();
        assert!(matches!(HttpServer::new(bad), Err(ConfigError::Validation(_))));
    }
}
