//! Line-delimited JSON over a Unix domain socket.

pub mod connection;
pub mod handler;

pub use connection::{MAX_LINE_BYTES, run_connection};
pub use handler::{encode_response, handle_line};
