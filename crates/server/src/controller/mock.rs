//! In-memory device capability for tests
//!
//! Clones share state, so a test can hand one clone to the controller and
//! keep another to plug devices, inject failures and inspect what happened.

use crate::controller::capability::{DeviceCapability, DeviceError, DeviceEvent};
use crate::controller::criteria::{DeviceIdentity, DeviceLocation, DeviceMatchCriteria, HidUsage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    pub identity: DeviceIdentity,
}

impl MockDevice {
    pub fn keyboard(bus: u8, address: u8, vendor_id: u16, product_id: u16) -> Self {
        Self {
            identity: DeviceIdentity {
                location: DeviceLocation { bus, address },
                vendor_id,
                product_id,
                usages: vec![HidUsage::KEYBOARD],
            },
        }
    }

    pub fn location(&self) -> DeviceLocation {
        self.identity.location
    }
}

#[derive(Debug)]
pub struct MockWatch(u32);

#[derive(Debug)]
pub struct MockHandle(DeviceLocation);

#[derive(Default)]
struct MockState {
    present: Vec<MockDevice>,
    pending: VecDeque<DeviceEvent<MockDevice>>,
    next_watch: u32,
    registrations: usize,
    active_watches: Vec<u32>,
    open_attempts: Vec<DeviceLocation>,
    open_handles: Vec<DeviceLocation>,
    closes: usize,
    fail_next_opens: usize,
    fail_closes: bool,
    fail_registrations: bool,
}

#[derive(Clone, Default)]
pub struct MockCapability {
    state: Arc<Mutex<MockState>>,
}

impl MockCapability {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Attach a device without notifying anyone
    pub fn plug(&self, device: MockDevice) -> MockDevice {
        self.state().present.push(device.clone());
        device
    }

    /// Attach a device and queue its arrival notification
    pub fn hotplug(&self, device: MockDevice) -> MockDevice {
        let mut state = self.state();
        state.present.push(device.clone());
        if !state.active_watches.is_empty() {
            state.pending.push_back(DeviceEvent::Arrived(device.clone()));
        }
        device
    }

    /// Detach a device without notifying anyone
    pub fn unplug(&self, device: &MockDevice) {
        self.state()
            .present
            .retain(|d| d.location() != device.location());
    }

    /// Detach a device and queue its removal notification
    pub fn hot_unplug(&self, device: &MockDevice) {
        let mut state = self.state();
        state.present.retain(|d| d.location() != device.location());
        if !state.active_watches.is_empty() {
            state.pending.push_back(DeviceEvent::Removed(device.clone()));
        }
    }

    pub fn is_present(&self, address: u8) -> bool {
        self.device_at(address).is_some()
    }

    pub fn device_at(&self, address: u8) -> Option<MockDevice> {
        self.state()
            .present
            .iter()
            .find(|d| d.location().address == address)
            .cloned()
    }

    pub fn fail_next_opens(&self, count: usize) {
        self.state().fail_next_opens = count;
    }

    pub fn fail_closes(&self, fail: bool) {
        self.state().fail_closes = fail;
    }

    pub fn fail_registrations(&self, fail: bool) {
        self.state().fail_registrations = fail;
    }

    pub fn registrations(&self) -> usize {
        self.state().registrations
    }

    pub fn active_watches(&self) -> usize {
        self.state().active_watches.len()
    }

    pub fn open_attempts(&self) -> Vec<DeviceLocation> {
        self.state().open_attempts.clone()
    }

    pub fn open_handles(&self) -> usize {
        self.state().open_handles.len()
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }
}

impl DeviceCapability for MockCapability {
    type Device = MockDevice;
    type Watch = MockWatch;
    type Handle = MockHandle;

    fn register(&mut self) -> Result<MockWatch, DeviceError> {
        let mut state = self.state();
        if state.fail_registrations {
            return Err(DeviceError::HotplugUnsupported("mock".to_string()));
        }
        state.next_watch += 1;
        let id = state.next_watch;
        state.registrations += 1;
        state.active_watches.push(id);
        Ok(MockWatch(id))
    }

    fn unregister(&mut self, watch: MockWatch) {
        let mut state = self.state();
        state.active_watches.retain(|id| *id != watch.0);
        if state.active_watches.is_empty() {
            state.pending.clear();
        }
    }

    fn identify(&self, device: &MockDevice) -> Result<DeviceIdentity, DeviceError> {
        Ok(device.identity.clone())
    }

    fn location(&self, device: &MockDevice) -> DeviceLocation {
        device.location()
    }

    fn open_exclusive(
        &mut self,
        device: &MockDevice,
        criteria: &DeviceMatchCriteria,
    ) -> Result<MockHandle, DeviceError> {
        let mut state = self.state();
        state.open_attempts.push(device.location());
        if state.fail_next_opens > 0 {
            state.fail_next_opens -= 1;
            return Err(DeviceError::Usb(rusb::Error::Busy));
        }
        if !device.identity.usages.contains(&criteria.hid_usage()) {
            return Err(DeviceError::NoMatchingInterface(criteria.hid_usage()));
        }
        state.open_handles.push(device.location());
        Ok(MockHandle(device.location()))
    }

    fn close(&mut self, handle: MockHandle) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.closes += 1;
        state.open_handles.retain(|l| *l != handle.0);
        if state.fail_closes {
            return Err(DeviceError::Usb(rusb::Error::NoDevice));
        }
        Ok(())
    }

    fn present_devices(&mut self) -> Result<Vec<MockDevice>, DeviceError> {
        Ok(self.state().present.clone())
    }

    fn poll_events(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<DeviceEvent<MockDevice>>, DeviceError> {
        let events: Vec<_> = self.state().pending.drain(..).collect();
        if events.is_empty() {
            std::thread::sleep(timeout);
        }
        Ok(events)
    }
}
