//! Port and Unix socket allocation for supervised processes.
//!
//! A free port is found by binding port 0 and releasing it again. Another
//! process may grab the port before the child binds it; nothing here tries
//! to prevent that.

use std::io;
use std::net::TcpListener;
use std::path::PathBuf;

/// Ask the OS for a currently free TCP port.
pub fn allocate_port() -> io::Result<u16> {
    let listener = TcpListener::bind(("0.0.0.0", 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Create a private temporary directory and return `<dir>/socket`.
pub fn allocate_unix_socket() -> io::Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("server-proxy-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(dir.join("socket"))
}
