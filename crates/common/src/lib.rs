//! Common utilities for the yubiswitch helper
//!
//! This crate provides the pieces shared between the helper's async front
//! (socket, signals) and its controller thread: error handling, logging
//! setup, and the async channel bridge that carries commands to the
//! controller's event loop.

pub mod channel;
pub mod error;
pub mod logging;

pub use channel::{ControllerBridge, ControllerCommand, ControllerWorker, create_controller_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
