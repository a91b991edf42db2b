//! `DaemonServer`: Unix socket listener and accept loop.

use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hld_rpc::{MethodRegistry, RpcContext};
use tokio::net::UnixListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{Result, ServerError};
use crate::ipc::run_connection;
use crate::shutdown::ShutdownCoordinator;

/// Pause after a failed `accept` so fd exhaustion does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The daemon's socket server.
pub struct DaemonServer {
    socket_path: PathBuf,
    registry: Arc<MethodRegistry>,
    ctx: Arc<RpcContext>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl DaemonServer {
    /// Create a server for `socket_path`. Nothing is bound until [`listen`](Self::listen).
    pub fn new(socket_path: impl Into<PathBuf>, registry: MethodRegistry, ctx: RpcContext) -> Self {
        Self {
            socket_path: socket_path.into(),
            registry: Arc::new(registry),
            ctx: Arc::new(ctx),
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }

    /// Socket path this server binds.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the method registry.
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    /// Get the handler context.
    pub fn context(&self) -> &Arc<RpcContext> {
        &self.ctx
    }

    /// Bind the socket (owner-only permissions) and spawn the accept loop.
    ///
    /// The returned handle completes after shutdown once every connection
    /// has drained.
    pub fn listen(&self) -> Result<JoinHandle<()>> {
        let listener = bind_socket(&self.socket_path)?;
        info!(path = %self.socket_path.display(), "listening");
        Ok(tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.registry),
            Arc::clone(&self.ctx),
            self.shutdown.token(),
        )))
    }

    /// Remove the socket file. Missing files are ignored.
    pub fn remove_socket(&self) {
        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => debug!(path = %self.socket_path.display(), "socket removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.socket_path.display(), error = %e, "failed to remove socket"),
        }
    }
}

/// Bind `path`, replacing a stale socket left by a dead daemon.
pub fn bind_socket(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if !meta.file_type().is_socket() {
            return Err(ServerError::NotASocket(path.to_path_buf()));
        }
        if std::os::unix::net::UnixStream::connect(path).is_ok() {
            return Err(ServerError::AlreadyRunning(path.to_path_buf()));
        }
        warn!(path = %path.display(), "removing stale socket");
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(listener)
}

async fn accept_loop(
    listener: UnixListener,
    registry: Arc<MethodRegistry>,
    ctx: Arc<RpcContext>,
    shutdown: CancellationToken,
) {
    let mut connections = JoinSet::new();
    let mut next_id: u64 = 0;

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    next_id += 1;
                    let _ = connections.spawn(run_connection(
                        stream,
                        next_id,
                        Arc::clone(&registry),
                        Arc::clone(&ctx),
                        shutdown.child_token(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    drop(listener);
    info!(open_connections = connections.len(), "listener stopped, draining connections");
    while connections.join_next().await.is_some() {}
}
