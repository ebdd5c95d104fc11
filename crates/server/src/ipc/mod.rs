//! IPC subsystem
//!
//! Local control socket for callers that toggle the token.
//!
//! # Architecture
//!
//! ```text
//! IpcServer
//!   ├─> bind Unix socket (fatal on failure)
//!   └─> spawn Connection per accepted peer
//!         ├─> read framed IpcRequest
//!         ├─> apply via ControllerBridge (waits for the controller)
//!         └─> write IpcReply "OK", then read the next request
//! ```

pub mod connection;
pub mod server;

pub use connection::Connection;
pub use server::IpcServer;
