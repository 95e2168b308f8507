//! Backend host allowlist.
//!
//! Consulted once per proxied request, before any backend I/O.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use axum::http::request::Parts;

/// Hosts reachable when nothing else is configured.
pub const DEFAULT_HOSTS: &[&str] = &["localhost", "127.0.0.1"];

type HostPredicate = dyn Fn(&Parts, &str) -> bool + Send + Sync;

/// Decides whether a target host may be proxied to.
#[derive(Clone)]
pub enum HostAllowlist {
    /// Literal host names.
    Static(HashSet<String>),
    /// Callback receiving the inbound request and the target host.
    Predicate(Arc<HostPredicate>),
}

impl HostAllowlist {
    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HostAllowlist::Static(hosts.into_iter().map(Into::into).collect())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Parts, &str) -> bool + Send + Sync + 'static,
    {
        HostAllowlist::Predicate(Arc::new(f))
    }

    pub fn allowed(&self, request: &Parts, host: &str) -> bool {
        match self {
            HostAllowlist::Static(hosts) => hosts.contains(host),
            HostAllowlist::Predicate(f) => f(request, host),
        }
    }
}

impl Default for HostAllowlist {
    fn default() -> Self {
        Self::from_hosts(DEFAULT_HOSTS.iter().copied())
    }
}

impl fmt::Debug for HostAllowlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostAllowlist::Static(hosts) => f.debug_tuple("Static").field(hosts).finish(),
            HostAllowlist::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}
