//! Status endpoints served next to the proxied routes.
//!
//! Mounted under `{base_url}server-proxy/`, a prefix no named route may use.

pub mod handlers;

use axum::{routing::get, Router};

use crate::http::server::AppState;
use crate::proxy::uri::url_path_join;

use self::handlers::servers_info;

/// Reserved path segment under the base URL.
pub const ADMIN_PREFIX: &str = "server-proxy";

pub fn servers_info_path(base_url: &str) -> String {
    url_path_join(&[base_url, ADMIN_PREFIX, "servers-info"])
}

pub fn setup_admin_router(base_url: &str) -> Router<AppState> {
    Router::new().route(&servers_info_path(base_url), get(servers_info))
}
