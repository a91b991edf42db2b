//! # hld-daemon
//!
//! The `hld` daemon: serves the conversation store over a Unix domain socket.
//!
//! - [`server::DaemonServer`] binds the socket and runs the accept loop
//! - [`ipc`] frames one JSON request per line and dispatches each in its own task
//! - [`shutdown::ShutdownCoordinator`] owns the root cancellation token
//! - [`app`] wires settings into the store, registry and server

#![deny(unsafe_code)]

pub mod app;
pub mod errors;
pub mod ipc;
pub mod logging;
pub mod server;
pub mod shutdown;

pub use errors::{Result, ServerError};
pub use server::DaemonServer;
pub use shutdown::ShutdownCoordinator;
