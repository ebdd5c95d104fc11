//! libusb-backed device capability
//!
//! Hot-plug callbacks run inside `handle_events` and libusb forbids device
//! I/O from within them, so the callback only forwards the device to a
//! queue. The controller's event loop drains that queue after each
//! `handle_events` call and does the real work on its own stack.

use crate::controller::{
    DeviceCapability, DeviceError, DeviceEvent, DeviceIdentity, DeviceLocation,
    DeviceMatchCriteria,
};
use crate::usb::device::{self, SeizedDevice};
use async_channel::{Receiver, Sender, unbounded};
use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::time::Duration;
use tracing::{debug, warn};

/// USB root hubs (Linux Foundation vendor, hub class) are never candidates
const ROOT_HUB_VENDOR: u16 = 0x1d6b;
const HUB_CLASS: u8 = 0x09;

/// Device capability over a libusb context
pub struct UsbCapability {
    context: Context,
    event_tx: Sender<DeviceEvent<Device<Context>>>,
    event_rx: Receiver<DeviceEvent<Device<Context>>>,
}

impl UsbCapability {
    pub fn new() -> Result<Self, DeviceError> {
        let context = Context::new()?;
        let (event_tx, event_rx) = unbounded();

        Ok(Self {
            context,
            event_tx,
            event_rx,
        })
    }

    /// Describe every attached device that exposes a HID usage
    pub fn list_hid_devices(&self) -> Result<Vec<(Device<Context>, DeviceIdentity)>, DeviceError> {
        let mut found = Vec::new();
        for device in self.context.devices()?.iter() {
            if is_root_hub(&device) {
                continue;
            }
            match device::describe(&device) {
                Ok(identity) if !identity.usages.is_empty() => found.push((device, identity)),
                Ok(_) => {}
                Err(e) => debug!(
                    "Skipping device at {}: {}",
                    device::location(&device),
                    e
                ),
            }
        }
        Ok(found)
    }
}

fn is_root_hub(device: &Device<Context>) -> bool {
    device
        .device_descriptor()
        .map(|d| d.vendor_id() == ROOT_HUB_VENDOR && d.class_code() == HUB_CLASS)
        .unwrap_or(false)
}

impl DeviceCapability for UsbCapability {
    type Device = Device<Context>;
    type Watch = Registration<Context>;
    type Handle = SeizedDevice;

    fn register(&mut self) -> Result<Registration<Context>, DeviceError> {
        if !rusb::has_hotplug() {
            return Err(DeviceError::HotplugUnsupported(
                "libusb was built without hot-plug support".to_string(),
            ));
        }

        let callback = HotplugForwarder {
            event_tx: self.event_tx.clone(),
        };

        // Attached devices are scanned by the controller itself.
        let registration = HotplugBuilder::new()
            .enumerate(false)
            .register(&self.context, Box::new(callback))?;

        debug!("Hot-plug callbacks registered");
        Ok(registration)
    }

    fn unregister(&mut self, watch: Registration<Context>) {
        drop(watch);
        // Notifications queued before deregistration are stale.
        while self.event_rx.try_recv().is_ok() {}
        debug!("Hot-plug callbacks deregistered");
    }

    fn identify(&self, device: &Device<Context>) -> Result<DeviceIdentity, DeviceError> {
        Ok(device::describe(device)?)
    }

    fn location(&self, device: &Device<Context>) -> DeviceLocation {
        device::location(device)
    }

    fn open_exclusive(
        &mut self,
        device: &Device<Context>,
        criteria: &DeviceMatchCriteria,
    ) -> Result<SeizedDevice, DeviceError> {
        SeizedDevice::seize(device, criteria.hid_usage())
    }

    fn close(&mut self, handle: SeizedDevice) -> Result<(), DeviceError> {
        handle.release()
    }

    fn present_devices(&mut self) -> Result<Vec<Device<Context>>, DeviceError> {
        Ok(self
            .context
            .devices()?
            .iter()
            .filter(|d| !is_root_hub(d))
            .collect())
    }

    fn poll_events(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<DeviceEvent<Device<Context>>>, DeviceError> {
        match self.context.handle_events(Some(timeout)) {
            Ok(()) => {}
            Err(rusb::Error::Interrupted) => debug!("USB event handling interrupted"),
            Err(e) => return Err(e.into()),
        }

        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        Ok(events)
    }
}

/// Hot-plug callback handler
///
/// Forwards notifications to the capability's queue; see module docs.
struct HotplugForwarder {
    event_tx: Sender<DeviceEvent<Device<Context>>>,
}

impl Hotplug<Context> for HotplugForwarder {
    fn device_arrived(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        if let Err(e) = self.event_tx.try_send(DeviceEvent::Arrived(device)) {
            warn!("Dropped arrival notification: {}", e);
        }
    }

    fn device_left(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        if let Err(e) = self.event_tx.try_send(DeviceEvent::Removed(device)) {
            warn!("Dropped removal notification: {}", e);
        }
    }
}
