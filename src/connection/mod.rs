//! Connection management
//!
//! This module handles:
//! * Transport abstraction (TCP vs Unix socket)
//! * Startup and password authentication
//! * The pipelined session with its reader and writer tasks
//! * State machine enforcement during the handshake

mod cancel;
mod config;
mod extended;
mod handshake;
mod inbound;
mod outbound;
mod properties;
mod session;
mod state;
mod transport;

pub use cancel::CancelToken;
pub use config::{
    ConnectionConfig, ConnectionConfigBuilder, DEFAULT_APPLICATION_NAME,
    DEFAULT_RECEIVE_QUEUE_CAPACITY,
};
pub use extended::ExtendedQuery;
pub use handshake::handshake;
pub use inbound::{Inbound, Pending};
pub use properties::ConnectionProperties;
pub use session::Session;
pub use state::ConnectionState;
pub use transport::Transport;
