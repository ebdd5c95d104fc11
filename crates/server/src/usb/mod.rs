//! USB subsystem
//!
//! Linux implementation of the device capability on top of libusb:
//! - Hot-plug registration and event pumping (`manager`)
//! - Descriptor inspection and exclusive interface claiming (`device`)

pub mod device;
pub mod manager;

pub use device::SeizedDevice;
pub use manager::UsbCapability;
