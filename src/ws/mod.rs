//! Transport layer: the link state machine and the WebSocket driver that
//! keeps exactly one socket to the server alive.

pub mod connection;
pub mod state;

pub use connection::run_driver;
pub use state::{Link, LinkState};
