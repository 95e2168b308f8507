//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Backend connection request (host, port)
//!     → connector.rs (Unix socket resolution, connect timeout)
//!     → BackendStream (TCP or Unix)
//!     → hyper client / WebSocket client / readiness probe
//! ```

pub mod connector;

pub use connector::{BackendConnector, BackendIo, BackendStream, UnixSocketResolver};
