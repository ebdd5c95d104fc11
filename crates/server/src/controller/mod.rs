//! Device controller
//!
//! The single owner of the hot-plug watch and the exclusive device handle.
//!
//! - `criteria`: what a watched device must look like
//! - `capability`: the seam between the state machine and the OS
//! - `machine`: the Idle / Watching / Seized state machine
//!
//! The controller is not thread-safe by itself; it is driven from exactly
//! one thread (see [`crate::worker`]).

pub mod capability;
pub mod criteria;
pub mod machine;

#[cfg(test)]
pub(crate) mod mock;

pub use capability::{DeviceCapability, DeviceError, DeviceEvent};
pub use criteria::{DeviceIdentity, DeviceLocation, DeviceMatchCriteria, HidUsage};
pub use machine::{ControllerState, DeviceController};
