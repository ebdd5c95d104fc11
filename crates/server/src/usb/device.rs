//! USB device inspection and exclusive seizing
//!
//! HID usages are derived from interface descriptors: a boot-protocol
//! keyboard interface carries Generic Desktop / Keyboard, a boot-protocol
//! mouse carries Generic Desktop / Mouse. Seizing a device means detaching
//! the kernel driver from every interface carrying the requested usage and
//! claiming it, so no other reader sees the device's input.

use crate::controller::{DeviceError, DeviceIdentity, DeviceLocation, HidUsage};
use rusb::{Context, Device, DeviceHandle};
use tracing::{debug, warn};

/// USB interface class for HID
pub const CLASS_HID: u8 = 0x03;
/// HID interface sub-class for boot devices
pub const SUBCLASS_BOOT: u8 = 0x01;
/// HID boot protocol: keyboard
pub const PROTOCOL_KEYBOARD: u8 = 0x01;
/// HID boot protocol: mouse
pub const PROTOCOL_MOUSE: u8 = 0x02;

/// Map an interface descriptor's class triple to a HID usage
pub fn usage_for_interface(class: u8, sub_class: u8, protocol: u8) -> Option<HidUsage> {
    if class != CLASS_HID || sub_class != SUBCLASS_BOOT {
        return None;
    }
    match protocol {
        PROTOCOL_KEYBOARD => Some(HidUsage::KEYBOARD),
        PROTOCOL_MOUSE => Some(HidUsage::MOUSE),
        _ => None,
    }
}

pub fn location(device: &Device<Context>) -> DeviceLocation {
    DeviceLocation {
        bus: device.bus_number(),
        address: device.address(),
    }
}

/// Interfaces of the active configuration with their HID usage
fn interface_usages(device: &Device<Context>) -> Result<Vec<(u8, HidUsage)>, rusb::Error> {
    let config = device.active_config_descriptor()?;
    let mut usages = Vec::new();

    for interface in config.interfaces() {
        let usage = interface.descriptors().find_map(|d| {
            usage_for_interface(d.class_code(), d.sub_class_code(), d.protocol_code())
        });
        if let Some(usage) = usage {
            usages.push((interface.number(), usage));
        }
    }

    Ok(usages)
}

/// Read vendor, product and HID usages of a device
pub fn describe(device: &Device<Context>) -> Result<DeviceIdentity, rusb::Error> {
    let descriptor = device.device_descriptor()?;

    let mut usages: Vec<HidUsage> = Vec::new();
    for (_, usage) in interface_usages(device)? {
        if !usages.contains(&usage) {
            usages.push(usage);
        }
    }

    Ok(DeviceIdentity {
        location: location(device),
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        usages,
    })
}

/// Read manufacturer and product strings, if the device can be opened
pub fn read_strings(device: &Device<Context>) -> (Option<String>, Option<String>) {
    let Ok(descriptor) = device.device_descriptor() else {
        return (None, None);
    };
    let Ok(handle) = device.open() else {
        return (None, None);
    };

    let manufacturer = descriptor
        .manufacturer_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());
    let product = descriptor
        .product_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    (manufacturer, product)
}

struct ClaimedInterface {
    number: u8,
    /// Kernel driver was bound before we claimed it
    reattach: bool,
}

/// A device whose matching interfaces are held exclusively
pub struct SeizedDevice {
    handle: DeviceHandle<Context>,
    location: DeviceLocation,
    claimed: Vec<ClaimedInterface>,
}

impl SeizedDevice {
    /// Open `device` and claim every interface carrying `usage`
    ///
    /// On failure, interfaces claimed so far are given back before the
    /// error is returned.
    pub fn seize(device: &Device<Context>, usage: HidUsage) -> Result<Self, DeviceError> {
        let interfaces: Vec<u8> = interface_usages(device)?
            .into_iter()
            .filter(|(_, u)| *u == usage)
            .map(|(number, _)| number)
            .collect();

        if interfaces.is_empty() {
            return Err(DeviceError::NoMatchingInterface(usage));
        }

        let handle = device.open()?;
        let mut seized = SeizedDevice {
            handle,
            location: location(device),
            claimed: Vec::with_capacity(interfaces.len()),
        };

        for number in interfaces {
            if let Err(e) = seized.claim(number) {
                let _ = seized.release_all();
                return Err(e);
            }
        }

        Ok(seized)
    }

    fn claim(&mut self, number: u8) -> Result<(), DeviceError> {
        let reattach = match self.handle.kernel_driver_active(number) {
            Ok(true) => {
                debug!(
                    "Detaching kernel driver from interface {} at {}",
                    number, self.location
                );
                self.handle
                    .detach_kernel_driver(number)
                    .map_err(|source| DeviceError::Claim {
                        interface: number,
                        source,
                    })?;
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!(
                    "Could not check kernel driver status for interface {}: {}",
                    number, e
                );
                false
            }
        };

        if let Err(source) = self.handle.claim_interface(number) {
            if reattach && let Err(e) = self.handle.attach_kernel_driver(number) {
                warn!(
                    "Failed to reattach kernel driver to interface {}: {}",
                    number, e
                );
            }
            return Err(DeviceError::Claim {
                interface: number,
                source,
            });
        }

        debug!("Claimed interface {} at {}", number, self.location);
        self.claimed.push(ClaimedInterface { number, reattach });
        Ok(())
    }

    /// Release claimed interfaces and hand them back to the kernel
    ///
    /// Keeps going after a failure; the first error is returned.
    pub fn release(mut self) -> Result<(), DeviceError> {
        self.release_all()
    }

    fn release_all(&mut self) -> Result<(), DeviceError> {
        let mut first_error = None;

        for interface in self.claimed.drain(..) {
            if let Err(e) = self.handle.release_interface(interface.number) {
                debug!("Failed to release interface {}: {}", interface.number, e);
                first_error.get_or_insert(DeviceError::Usb(e));
            }

            if interface.reattach {
                match self.handle.attach_kernel_driver(interface.number) {
                    Ok(()) => debug!(
                        "Reattached kernel driver to interface {} at {}",
                        interface.number, self.location
                    ),
                    Err(e) => {
                        debug!(
                            "Could not reattach kernel driver to interface {}: {}",
                            interface.number, e
                        );
                        first_error.get_or_insert(DeviceError::Usb(e));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for SeizedDevice {
    fn drop(&mut self) {
        if !self.claimed.is_empty() {
            let _ = self.release_all();
        }
    }
}
