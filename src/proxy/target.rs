//! Per-request description of where and how to proxy.

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::HeaderMap;

use crate::proxy::uri::{backend_uri, url_path_join};
use crate::rewrite::RewritePipeline;
use crate::security::HostAllowlist;

/// Resolved backend target for one request.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    /// Route name for logs and metrics (`proxy` for non-named routes).
    pub route: String,
    pub host: String,
    pub port: u16,
    pub unix_socket: Option<PathBuf>,
    /// Path after the mount point, always starting with `/`.
    pub proxied_path: String,
    /// Mount path on the front-end.
    pub context_path: String,
    /// Forward the full front-end path instead of the suffix.
    pub absolute_url: bool,
    pub allowlist: Arc<HostAllowlist>,
    pub request_headers: HeaderMap,
    pub rewrite: Arc<RewritePipeline>,
}

impl ProxyTarget {
    /// Path sent to the backend.
    pub fn backend_path(&self) -> String {
        let path = if self.absolute_url {
            url_path_join(&[&self.context_path, &self.proxied_path])
        } else {
            self.proxied_path.clone()
        };
        if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        }
    }

    /// Full backend URI for `scheme` (`http` or `ws`).
    pub fn backend_uri(&self, scheme: &str, query: Option<&str>) -> String {
        backend_uri(scheme, &self.host, self.port, &self.backend_path(), query)
    }
}
