//! Process supervisor for named routes.
//!
//! # Data Flow
//! ```text
//! First request to a named route
//!     → state() (allocate port / socket once, RouteState arena)
//!     → ensure_started() (start mutex)
//!         → launch.rs (render command and environment)
//!         → spawn (kill_on_drop)
//!         → probe.rs (GET / until ready or timeout)
//!     → Ready | StartupTimeout | SpawnFailure
//! ```
//!
//! # Design Decisions
//! - One start mutex per route: no duplicate spawns, no probe storms
//! - Waiters that queued behind a failed start get that same failure;
//!   the next request after it starts over
//! - Arena entries are `Arc`s; no map guard is held across an await

pub mod launch;
pub mod port;
pub mod probe;
pub mod state;

use std::process::Stdio;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::process::Command;

use crate::error::ProxyError;
use crate::net::{BackendConnector, UnixSocketResolver};
use crate::observability::metrics;
use crate::routing::route::{NamedServer, UnixSocketRequest};

use self::launch::LaunchArgs;
use self::state::{ManagedProcess, ProcessHandle};

pub use self::state::{RouteState, RouteStatus};

/// Status report of one named route.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSnapshot {
    pub name: String,
    pub prefix: String,
    pub port: Option<u16>,
    pub unix_socket: Option<String>,
    pub status: RouteStatus,
    pub spawns: u64,
}

/// Starts and tracks the processes behind named routes.
#[derive(Debug)]
pub struct ProcessSupervisor {
    states: DashMap<String, Arc<RouteState>>,
    base_url: String,
    probe_interval: Duration,
}

impl ProcessSupervisor {
    pub fn new(base_url: impl Into<String>, probe_interval: Duration) -> Self {
        Self {
            states: DashMap::new(),
            base_url: base_url.into(),
            probe_interval,
        }
    }

    /// Route state, allocating its port or socket on first use.
    pub fn state(&self, server: &NamedServer) -> Result<Arc<RouteState>, ProxyError> {
        if let Some(state) = self.states.get(&server.name) {
            return Ok(Arc::clone(&state));
        }

        let entry = self
            .states
            .entry(server.name.clone())
            .or_try_insert_with(|| allocate(server).map(Arc::new))?;
        Ok(Arc::clone(&entry))
    }

    /// Existing route state, without allocating.
    pub fn existing(&self, name: &str) -> Option<Arc<RouteState>> {
        self.states.get(name).map(|s| Arc::clone(&s))
    }

    /// Make sure the route's process is running.
    pub async fn ensure_started(&self, server: &NamedServer) -> Result<Arc<RouteState>, ProxyError> {
        let state = self.state(server)?;
        let seen = state.attempts.load(Ordering::SeqCst);

        let mut slot = state.slot.lock().await;
        if slot.handle.is_some() {
            return Ok(Arc::clone(&state));
        }
        if state.attempts.load(Ordering::SeqCst) != seen {
            if let Some(err) = &slot.last_failure {
                return Err(err.clone());
            }
        }

        let result = self.start(server, &state).await;
        state.attempts.fetch_add(1, Ordering::SeqCst);

        match result {
            Ok(handle) => {
                slot.handle = Some(handle);
                slot.last_failure = None;
                Ok(Arc::clone(&state))
            }
            Err(e) => {
                tracing::error!(route = %server.name, error = %e, "Failed to start process");
                slot.last_failure = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn start(&self, server: &NamedServer, state: &RouteState) -> Result<ProcessHandle, ProxyError> {
        let args = LaunchArgs {
            port: state.port,
            unix_socket: state.unix_socket.clone(),
            base_url: self.base_url.clone(),
        };

        let argv = server.command.resolve(&args);
        let Some((program, rest)) = argv.split_first() else {
            tracing::info!(route = %server.name, "No command, treating process as externally managed");
            return Ok(ProcessHandle::External);
        };

        let mut command = Command::new(program);
        command
            .args(rest)
            .envs(server.environment.resolve(&args))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &server.cwd {
            command.current_dir(cwd);
        }

        let child = command.spawn().map_err(|e| ProxyError::SpawnFailure {
            name: server.name.clone(),
            reason: e.to_string(),
        })?;
        let process = ManagedProcess::new(child);
        state.spawns.fetch_add(1, Ordering::SeqCst);
        metrics::record_process_start(&server.name);

        tracing::info!(
            route = %server.name,
            pid = ?process.pid,
            port = state.port,
            unix_socket = ?state.unix_socket,
            command = ?argv,
            "Spawned process"
        );

        let connector = match &state.unix_socket {
            Some(path) => BackendConnector::unix(UnixSocketResolver::new(path), server.timeout),
            None => BackendConnector::tcp(server.timeout),
        };

        if probe::wait_until_ready(connector, state.port, self.probe_interval, server.timeout).await {
            tracing::info!(route = %server.name, "Process is ready");
            Ok(ProcessHandle::Managed(process))
        } else {
            tracing::warn!(route = %server.name, timeout = ?server.timeout, "Process did not become ready, killing it");
            process.kill().await;
            Err(ProxyError::StartupTimeout {
                name: server.name.clone(),
            })
        }
    }

    /// Kill every managed process and remove the socket directories
    /// created for them.
    pub async fn shutdown(&self) {
        let states: Vec<Arc<RouteState>> = self.states.iter().map(|e| Arc::clone(e.value())).collect();
        for state in states {
            let mut slot = state.slot.lock().await;
            if let Some(ProcessHandle::Managed(process)) = slot.handle.take() {
                tracing::info!(route = %state.name, pid = ?process.pid, "Stopping process");
                process.kill().await;
            }
            if let Some(dir) = &state.owned_dir {
                match std::fs::remove_dir_all(dir) {
                    Ok(()) => tracing::debug!(route = %state.name, dir = %dir.display(), "Removed socket directory"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(route = %state.name, dir = %dir.display(), error = %e, "Failed to remove socket directory")
                    }
                }
            }
        }
    }

    /// Status of every given route, started or not.
    pub fn snapshot<'a>(&self, servers: impl IntoIterator<Item = &'a NamedServer>) -> Vec<RouteSnapshot> {
        servers
            .into_iter()
            .map(|server| {
                let state = self.existing(&server.name);
                RouteSnapshot {
                    name: server.name.clone(),
                    prefix: server.prefix.clone(),
                    port: state.as_ref().map(|s| s.port).filter(|p| *p != 0),
                    unix_socket: state
                        .as_ref()
                        .and_then(|s| s.unix_socket.as_ref())
                        .map(|p| p.display().to_string()),
                    status: state.as_ref().map(|s| s.status()).unwrap_or(RouteStatus::NotStarted),
                    spawns: state.as_ref().map(|s| s.spawn_count()).unwrap_or(0),
                }
            })
            .collect()
    }
}

fn allocate(server: &NamedServer) -> Result<RouteState, ProxyError> {
    let failure = |e: std::io::Error| ProxyError::SpawnFailure {
        name: server.name.clone(),
        reason: e.to_string(),
    };

    let mut owned_dir = None;
    let unix_socket = match &server.unix_socket {
        UnixSocketRequest::None => None,
        UnixSocketRequest::Auto => {
            let socket = port::allocate_unix_socket().map_err(failure)?;
            owned_dir = socket.parent().map(|dir| dir.to_path_buf());
            Some(socket)
        }
        UnixSocketRequest::Path(path) => Some(path.clone()),
    };

    let port = if unix_socket.is_some() {
        0
    } else if server.port != 0 {
        server.port
    } else {
        port::allocate_port().map_err(failure)?
    };

    tracing::debug!(route = %server.name, port, unix_socket = ?unix_socket, "Allocated route address");
    let state = RouteState::new(server.name.clone(), port, unix_socket);
    Ok(match owned_dir {
        Some(dir) => state.with_owned_dir(dir),
        None => state,
    })
}
