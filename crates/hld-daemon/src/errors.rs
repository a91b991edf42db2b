//! Server error type.

use std::path::PathBuf;

/// Failures binding or serving the daemon socket.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Another daemon is accepting on the socket path.
    #[error("daemon already listening on {}", .0.display())]
    AlreadyRunning(PathBuf),

    /// Something other than a socket occupies the socket path.
    #[error("{} exists and is not a socket", .0.display())]
    NotASocket(PathBuf),

    /// Filesystem or socket failure.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ServerError>;
