//! p2pxfer Library
//!
//! Point-to-point file transfer: a listener serving PUT/GET requests and an
//! initiator that uploads or downloads one file per connection.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logger;
pub mod net;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod server;

pub use error::TransferError;
