//! Device controller state machine
//!
//! Owns at most one hot-plug watch and at most one exclusive handle:
//!
//! ```text
//!            Disable                 matching arrival (open ok)
//!   Idle ────────────────▶ Watching ───────────────────────────▶ Seized
//!    ▲                        │  ▲                                  │
//!    │        Enable          │  └── criteria no longer match ──────┤
//!    └────────────────────────┴──── Enable / removal / shutdown ────┘
//! ```
//!
//! Every path back to Idle goes through [`DeviceController::release`], so a
//! handle is never left open without a watcher and a watcher never outlives
//! an Enable.

use crate::controller::capability::{DeviceCapability, DeviceEvent};
use crate::controller::criteria::{DeviceIdentity, DeviceMatchCriteria};
use protocol::Action;
use tracing::{debug, error, info, trace, warn};

/// Observable controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No watcher, no handle
    Idle,
    /// Watcher active, waiting for a matching device
    Watching,
    /// Matching device held exclusively
    Seized,
}

struct Watcher<W> {
    registration: W,
    criteria: DeviceMatchCriteria,
}

struct Seized<H> {
    handle: H,
    identity: DeviceIdentity,
}

/// The exclusive-seize state machine
pub struct DeviceController<C: DeviceCapability> {
    capability: C,
    watcher: Option<Watcher<C::Watch>>,
    seized: Option<Seized<C::Handle>>,
}

impl<C: DeviceCapability> DeviceController<C> {
    pub fn new(capability: C) -> Self {
        Self {
            capability,
            watcher: None,
            seized: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        match (&self.watcher, &self.seized) {
            (None, _) => ControllerState::Idle,
            (Some(_), None) => ControllerState::Watching,
            (Some(_), Some(_)) => ControllerState::Seized,
        }
    }

    /// Criteria of the active watcher, if any
    pub fn criteria(&self) -> Option<DeviceMatchCriteria> {
        self.watcher.as_ref().map(|w| w.criteria)
    }

    /// Identity of the device currently held, if any
    pub fn held_device(&self) -> Option<&DeviceIdentity> {
        self.seized.as_ref().map(|s| &s.identity)
    }

    pub fn capability_mut(&mut self) -> &mut C {
        &mut self.capability
    }

    /// Apply a decoded IPC action
    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Enable => self.enable(),
            Action::Disable {
                vendor_id,
                product_id,
            } => self.disable(vendor_id, product_id),
        }
    }

    /// Give the device back and stop watching
    pub fn enable(&mut self) {
        if self.release() {
            info!("Device enabled, watcher removed");
        } else {
            debug!("Enable requested while idle");
        }
    }

    /// Watch for a keyboard-class device and seize it on arrival
    ///
    /// A zero `vendor_id` or `product_id` matches any value; a value beyond
    /// the USB id range matches nothing. Devices already attached are
    /// considered immediately.
    pub fn disable(&mut self, vendor_id: u64, product_id: u64) {
        let criteria = DeviceMatchCriteria::keyboard(vendor_id, product_id);
        if !criteria.is_satisfiable() {
            warn!(
                "idVendor {} / idProduct {} is outside the USB id range, no device will match",
                vendor_id, product_id
            );
        }

        match self.watcher.as_mut() {
            Some(watcher) => {
                watcher.criteria = criteria;
                info!("Updated watch criteria to {}", criteria);
            }
            None => match self.capability.register() {
                Ok(registration) => {
                    self.watcher = Some(Watcher {
                        registration,
                        criteria,
                    });
                    info!("Watching for {}", criteria);
                }
                Err(e) => {
                    error!("Failed to register device watch: {}", e);
                    return;
                }
            },
        }

        if let Some(held) = self.held_device() {
            if criteria.matches(held) {
                debug!("Held device {} still matches {}", held, criteria);
                return;
            }
            info!(
                "Held device {} no longer matches {}, releasing it",
                held, criteria
            );
            self.close_seized();
        }

        self.scan_present();
    }

    /// Dispatch one hot-plug notification
    pub fn handle_event(&mut self, event: DeviceEvent<C::Device>) {
        match event {
            DeviceEvent::Arrived(device) => self.on_arrival(device),
            DeviceEvent::Removed(device) => self.on_removal(device),
        }
    }

    /// A device appeared; make one open attempt if it matches
    pub fn on_arrival(&mut self, device: C::Device) {
        let Some(watcher) = self.watcher.as_ref() else {
            trace!("Arrival ignored, not watching");
            return;
        };
        if self.seized.is_some() {
            debug!("Arrival ignored, a device is already held");
            return;
        }

        let identity = match self.capability.identify(&device) {
            Ok(identity) => identity,
            Err(e) => {
                debug!(
                    "Could not describe arrived device at {}: {}",
                    self.capability.location(&device),
                    e
                );
                return;
            }
        };

        let criteria = watcher.criteria;
        if !criteria.matches(&identity) {
            trace!("Device {} does not match {}", identity, criteria);
            return;
        }

        match self.capability.open_exclusive(&device, &criteria) {
            Ok(handle) => {
                info!("Opened HID device {} exclusively", identity);
                self.seized = Some(Seized { handle, identity });
            }
            Err(e) => {
                error!("Failed to open HID device {}: {}", identity, e);
            }
        }
    }

    /// A device went away; tear everything down if it was ours
    pub fn on_removal(&mut self, device: C::Device) {
        let location = self.capability.location(&device);
        match self.held_device() {
            Some(held) if held.location == location => {
                info!("Held device {} removed", held);
                self.release();
            }
            _ => trace!("Removal of device at {} ignored", location),
        }
    }

    /// Termination path: same teardown as Enable
    pub fn shutdown(&mut self) {
        if self.release() {
            info!("Released device and watcher on shutdown");
        }
    }

    /// Close the handle and drop the watcher. Returns whether anything was held.
    fn release(&mut self) -> bool {
        let held = self.watcher.is_some() || self.seized.is_some();
        self.close_seized();
        if let Some(watcher) = self.watcher.take() {
            self.capability.unregister(watcher.registration);
        }
        held
    }

    fn close_seized(&mut self) {
        if let Some(seized) = self.seized.take()
            && let Err(e) = self.capability.close(seized.handle)
        {
            debug!("Ignoring error closing {}: {}", seized.identity, e);
        }
    }

    fn scan_present(&mut self) {
        let devices = match self.capability.present_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Failed to enumerate attached devices: {}", e);
                return;
            }
        };

        for device in devices {
            if self.seized.is_some() {
                break;
            }
            self.on_arrival(device);
        }
    }
}

impl<C: DeviceCapability> Drop for DeviceController<C> {
    fn drop(&mut self) {
        self.release();
    }
}
