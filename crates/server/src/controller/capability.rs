//! Device capability interface
//!
//! The controller never talks to libusb directly. It drives a
//! [`DeviceCapability`], which knows how to register for hot-plug
//! notifications, describe a device, and open or close an exclusive handle.
//! Hot-plug notifications are delivered as [`DeviceEvent`] values pumped from
//! the capability by the controller's event loop.

use crate::controller::criteria::{DeviceIdentity, DeviceLocation, DeviceMatchCriteria, HidUsage};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a device capability
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("Device has no interface with HID usage {0}")]
    NoMatchingInterface(HidUsage),

    #[error("Failed to claim interface {interface}: {source}")]
    Claim {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    #[error("Hot-plug notifications unavailable: {0}")]
    HotplugUnsupported(String),
}

/// Hot-plug notification for one device instance
#[derive(Debug, Clone)]
pub enum DeviceEvent<D> {
    Arrived(D),
    Removed(D),
}

/// OS facility for watching and seizing devices
pub trait DeviceCapability {
    /// Reference to one physical device instance
    type Device;
    /// Live hot-plug registration; notifications stop once it is released
    type Watch;
    /// Exclusively seized device
    type Handle;

    /// Start delivering arrival/removal notifications
    fn register(&mut self) -> Result<Self::Watch, DeviceError>;

    /// Stop delivering notifications for `watch`
    fn unregister(&mut self, watch: Self::Watch) {
        drop(watch);
    }

    /// Read what matching needs to know about `device`
    fn identify(&self, device: &Self::Device) -> Result<DeviceIdentity, DeviceError>;

    /// Location of `device`; available even after removal
    fn location(&self, device: &Self::Device) -> DeviceLocation;

    /// Seize the interfaces of `device` that carry the criteria's usage
    fn open_exclusive(
        &mut self,
        device: &Self::Device,
        criteria: &DeviceMatchCriteria,
    ) -> Result<Self::Handle, DeviceError>;

    /// Give a seized device back to the system
    fn close(&mut self, handle: Self::Handle) -> Result<(), DeviceError>;

    /// Devices attached right now
    fn present_devices(&mut self) -> Result<Vec<Self::Device>, DeviceError>;

    /// Wait up to `timeout` for notifications and return those received
    fn poll_events(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<DeviceEvent<Self::Device>>, DeviceError>;
}
