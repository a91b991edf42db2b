//! # hld-session
//!
//! Session lifecycle on top of the conversation store.
//!
//! [`SessionManager`] is the exclusive write path: it creates sessions,
//! records the claude session ID and conversation events reported by the
//! agent runtime, finalizes runs, and continues finished runs. It owns the
//! registry of sessions this daemon is driving.

#![deny(unsafe_code)]

pub mod errors;
pub mod manager;
pub mod types;

pub use errors::{Result, SessionError};
pub use manager::{ActiveSession, ORPHANED_ERROR_MESSAGE, SHUTDOWN_ERROR_MESSAGE, SessionManager};
pub use types::{ContinueConfig, EventInput, SessionConfig, SessionSummary};
