//! Per-route process state.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::process::Child;
use tokio::sync::Mutex;

use crate::error::ProxyError;

/// A child process started by the supervisor.
#[derive(Debug)]
pub struct ManagedProcess {
    pub child: Child,
    pub pid: Option<u32>,
}

impl ManagedProcess {
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self { child, pid }
    }

    /// `true` once the child has exited.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    pub async fn kill(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(pid = ?self.pid, error = %e, "Failed to kill process");
        }
    }
}

/// What the route's process slot holds once a start succeeded.
#[derive(Debug)]
pub enum ProcessHandle {
    Managed(ManagedProcess),
    /// No launch command; the process lives elsewhere.
    External,
}

/// State guarded by the route's start mutex.
#[derive(Debug, Default)]
pub struct ProcessSlot {
    pub handle: Option<ProcessHandle>,
    pub last_failure: Option<ProxyError>,
}

/// Observable lifecycle of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    NotStarted,
    Starting,
    Ready,
    External,
    Failed,
    Exited,
}

/// Everything the supervisor keeps about one named route.
#[derive(Debug)]
pub struct RouteState {
    pub name: String,
    /// `0` when the route talks over a Unix socket.
    pub port: u16,
    pub unix_socket: Option<PathBuf>,
    /// Socket directory created for the route, removed on shutdown.
    pub(crate) owned_dir: Option<PathBuf>,
    pub(crate) slot: Mutex<ProcessSlot>,
    /// Finished start attempts, successful or not.
    pub(crate) attempts: AtomicU64,
    /// Processes spawned over the route's lifetime.
    pub(crate) spawns: AtomicU64,
}

impl RouteState {
    pub fn new(name: impl Into<String>, port: u16, unix_socket: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            port,
            unix_socket,
            owned_dir: None,
            slot: Mutex::new(ProcessSlot::default()),
            attempts: AtomicU64::new(0),
            spawns: AtomicU64::new(0),
        }
    }

    pub(crate) fn with_owned_dir(mut self, dir: PathBuf) -> Self {
        self.owned_dir = Some(dir);
        self
    }

    pub fn spawn_count(&self) -> u64 {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn attempt_count(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Current status. A held start mutex reads as `Starting`.
    pub fn status(&self) -> RouteStatus {
        let mut slot = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(_) => return RouteStatus::Starting,
        };
        let failed = slot.last_failure.is_some();
        match slot.handle.as_mut() {
            Some(ProcessHandle::Managed(process)) => {
                if process.has_exited() {
                    RouteStatus::Exited
                } else {
                    RouteStatus::Ready
                }
            }
            Some(ProcessHandle::External) => RouteStatus::External,
            None if failed => RouteStatus::Failed,
            None => RouteStatus::NotStarted,
        }
    }
}
