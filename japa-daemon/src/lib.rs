//! Long-running japa host: one process owns the local log, drains on
//! reconnect, and serves the CLI over a Unix socket.

mod error;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_connectivity, request_increment, request_reset, request_status, request_stop,
    request_sync, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking};
