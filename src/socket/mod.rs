//! Unix socket server module.
//!
//! Accepts framed requests and runs each through the [`ApiController`](crate::controller::ApiController).

mod connection;
mod listener;

pub use connection::handle_connection;
pub use listener::{ConnectionMetrics, SocketListener};
