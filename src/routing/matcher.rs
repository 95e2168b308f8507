//! Route matching logic.
//!
//! # Responsibilities
//! - Strip the base URL
//! - Match `/proxy/...` patterns in fixed precedence
//! - Match named prefixes in registration order
//!
//! # Design Decisions
//! - Hosts match `[^/:@]+`, ports match `\d+`
//! - A path suffix is empty or starts with `/`
//! - No regex: patterns are parsed by hand in one pass each
//! - First match wins

use crate::routing::route::RouteKind;

/// Result of matching a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    /// One of the `/proxy/...` routes.
    Proxy {
        kind: RouteKind,
        host: String,
        port: u16,
        path: String,
    },
    /// A named route; `path` is what follows `{prefix}/`.
    Named { index: usize, path: String },
    /// `{base}/{prefix}` without the trailing slash.
    AddSlash { index: usize },
}

/// Matches request paths against the registered patterns.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    base_url: String,
    prefixes: Vec<String>,
}

impl PathMatcher {
    /// `base_url` must start and end with `/`.
    pub fn new(base_url: impl Into<String>, prefixes: Vec<String>) -> Self {
        Self {
            base_url: base_url.into(),
            prefixes,
        }
    }

    pub fn match_path(&self, path: &str) -> Option<RouteMatch> {
        let rest = path.strip_prefix(self.base_url.as_str())?;

        if let Some(after) = rest.strip_prefix("proxy/") {
            let absolute = after.strip_prefix("absolute/");

            let found = parse_host_port(after)
                .map(|m| (RouteKind::Remote, m))
                .or_else(|| absolute.and_then(parse_host_port).map(|m| (RouteKind::RemoteAbsolute, m)))
                .or_else(|| parse_port(after).map(|m| (RouteKind::LocalPort, m)))
                .or_else(|| absolute.and_then(parse_port).map(|m| (RouteKind::LocalPortAbsolute, m)));

            if let Some((kind, (host, port, path))) = found {
                return Some(RouteMatch::Proxy {
                    kind,
                    host: host.to_string(),
                    port,
                    path: path.to_string(),
                });
            }
        }

        for (index, prefix) in self.prefixes.iter().enumerate() {
            if let Some(after) = rest.strip_prefix(prefix.as_str()) {
                if after.is_empty() {
                    return Some(RouteMatch::AddSlash { index });
                }
                if let Some(path) = after.strip_prefix('/') {
                    return Some(RouteMatch::Named {
                        index,
                        path: path.to_string(),
                    });
                }
            }
        }

        None
    }
}

/// `{host}:{port}{suffix}`. Local routes report `localhost` as host.
fn parse_host_port(s: &str) -> Option<(&str, u16, &str)> {
    let end = s.find(|c| matches!(c, '/' | ':' | '@')).unwrap_or(s.len());
    let (host, rest) = s.split_at(end);
    if host.is_empty() {
        return None;
    }
    let rest = rest.strip_prefix(':')?;
    let (port, suffix) = split_port(rest)?;
    Some((host, port, suffix))
}

fn parse_port(s: &str) -> Option<(&str, u16, &str)> {
    let (port, suffix) = split_port(s)?;
    Some(("localhost", port, suffix))
}

fn split_port(s: &str) -> Option<(u16, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let (digits, suffix) = s.split_at(end);
    if !suffix.is_empty() && !suffix.starts_with('/') {
        return None;
    }
    Some((digits.parse().ok()?, suffix))
}
