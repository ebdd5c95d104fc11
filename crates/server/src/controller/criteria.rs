//! Device matching criteria
//!
//! A watcher only ever reacts to keyboard-class HID interfaces
//! (Generic Desktop page, Keyboard usage). Vendor and product filters are
//! optional: a zero value is a wildcard, never a literal zero. Filters keep
//! the full request width, so a value above `u16::MAX` matches no device.

use std::fmt;

/// HID usage page for Generic Desktop controls
pub const USAGE_PAGE_GENERIC_DESKTOP: u16 = 0x01;
/// HID usage for a keyboard on the Generic Desktop page
pub const USAGE_KEYBOARD: u16 = 0x06;
/// HID usage for a mouse on the Generic Desktop page
pub const USAGE_MOUSE: u16 = 0x02;

/// A HID (usage page, usage) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HidUsage {
    pub page: u16,
    pub usage: u16,
}

impl HidUsage {
    pub const KEYBOARD: HidUsage = HidUsage {
        page: USAGE_PAGE_GENERIC_DESKTOP,
        usage: USAGE_KEYBOARD,
    };

    pub const MOUSE: HidUsage = HidUsage {
        page: USAGE_PAGE_GENERIC_DESKTOP,
        usage: USAGE_MOUSE,
    };
}

impl fmt::Display for HidUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}/{:#04x}", self.page, self.usage)
    }
}

/// Physical location of a device on the host (bus, address)
///
/// Stable for as long as the device stays plugged in, and the only identity
/// still available once a device has been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceLocation {
    pub bus: u8,
    pub address: u8,
}

impl fmt::Display for DeviceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bus {:03} device {:03}", self.bus, self.address)
    }
}

/// What matching needs to know about a device instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub location: DeviceLocation,
    pub vendor_id: u16,
    pub product_id: u16,
    /// HID usages exposed by the device's interfaces
    pub usages: Vec<HidUsage>,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} ({})",
            self.vendor_id, self.product_id, self.location
        )
    }
}

/// Filter describing which devices a watcher seizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMatchCriteria {
    /// 0 = any vendor
    pub vendor_id: u64,
    /// 0 = any product
    pub product_id: u64,
    pub usage_page: u16,
    pub usage: u16,
}

impl DeviceMatchCriteria {
    /// Keyboard-class criteria for the given vendor/product filter
    pub fn keyboard(vendor_id: u64, product_id: u64) -> Self {
        Self {
            vendor_id,
            product_id,
            usage_page: USAGE_PAGE_GENERIC_DESKTOP,
            usage: USAGE_KEYBOARD,
        }
    }

    /// Usage every matching device must expose
    pub fn hid_usage(&self) -> HidUsage {
        HidUsage {
            page: self.usage_page,
            usage: self.usage,
        }
    }

    /// Whether any USB device could satisfy this filter
    pub fn is_satisfiable(&self) -> bool {
        self.vendor_id <= u64::from(u16::MAX) && self.product_id <= u64::from(u16::MAX)
    }

    /// Check whether a device satisfies this filter
    pub fn matches(&self, device: &DeviceIdentity) -> bool {
        if self.vendor_id != 0 && self.vendor_id != u64::from(device.vendor_id) {
            return false;
        }
        if self.product_id != 0 && self.product_id != u64::from(device.product_id) {
            return false;
        }
        device.usages.contains(&self.hid_usage())
    }
}

impl fmt::Display for DeviceMatchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vendor = match self.vendor_id {
            0 => "*".to_string(),
            v => format!("{:04x}", v),
        };
        let product = match self.product_id {
            0 => "*".to_string(),
            p => format!("{:04x}", p),
        };
        write!(f, "{}:{} usage {}", vendor, product, self.hid_usage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyboard(vendor_id: u16, product_id: u16) -> DeviceIdentity {
        DeviceIdentity {
            location: DeviceLocation { bus: 1, address: 4 },
            vendor_id,
            product_id,
            usages: vec![HidUsage::KEYBOARD],
        }
    }

    #[test]
    fn test_keyboard_criteria_fixes_usage() {
        let criteria = DeviceMatchCriteria::keyboard(1050, 407);
        assert_eq!(criteria.usage_page, 1);
        assert_eq!(criteria.usage, 6);
    }

    #[test]
    fn test_exact_match() {
        let criteria = DeviceMatchCriteria::keyboard(1050, 407);
        assert!(criteria.matches(&keyboard(1050, 407)));
        assert!(!criteria.matches(&keyboard(1050, 999)));
        assert!(!criteria.matches(&keyboard(1051, 407)));
    }

    #[test]
    fn test_zero_fields_are_wildcards() {
        assert!(DeviceMatchCriteria::keyboard(0, 407).matches(&keyboard(0x1234, 407)));
        assert!(DeviceMatchCriteria::keyboard(1050, 0).matches(&keyboard(1050, 0xbeef)));
        assert!(DeviceMatchCriteria::keyboard(0, 0).matches(&keyboard(0x0001, 0x0002)));

        // A wildcard does not mean "only devices whose id is zero".
        assert!(!DeviceMatchCriteria::keyboard(0, 407).matches(&keyboard(0, 408)));
    }

    #[test]
    fn test_non_keyboard_never_matches() {
        let mut mouse = keyboard(1050, 407);
        mouse.usages = vec![HidUsage::MOUSE];
        assert!(!DeviceMatchCriteria::keyboard(1050, 407).matches(&mouse));
        assert!(!DeviceMatchCriteria::keyboard(0, 0).matches(&mouse));

        let mut bare = keyboard(1050, 407);
        bare.usages.clear();
        assert!(!DeviceMatchCriteria::keyboard(0, 0).matches(&bare));
    }

    #[test]
    fn test_composite_device_matches_on_keyboard_interface() {
        let mut composite = keyboard(1050, 407);
        composite.usages = vec![HidUsage::MOUSE, HidUsage::KEYBOARD];
        assert!(DeviceMatchCriteria::keyboard(1050, 407).matches(&composite));
    }

    #[test]
    fn test_ids_beyond_usb_range_match_nothing() {
        let criteria = DeviceMatchCriteria::keyboard(0x1_0000 + 1050, 407);
        assert!(!criteria.is_satisfiable());
        assert!(!criteria.matches(&keyboard(1050, 407)));

        // Wildcards stay satisfiable
        assert!(DeviceMatchCriteria::keyboard(0, 0).is_satisfiable());
        assert!(DeviceMatchCriteria::keyboard(0xffff, 0xffff).is_satisfiable());
        assert!(!DeviceMatchCriteria::keyboard(0, u64::MAX).matches(&keyboard(1050, 0xffff)));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            DeviceMatchCriteria::keyboard(0x1050, 0).to_string(),
            "1050:* usage 0x01/0x06"
        );
    }
}
