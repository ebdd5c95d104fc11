//! Helper IPC message definitions
//!
//! The helper understands exactly one request shape and answers every
//! request with the same acknowledgement. The acknowledgement means
//! "request received", never "device state changed".

use serde::{Deserialize, Serialize};

/// Service name the helper is registered under
pub const SERVICE_NAME: &str = "com.pallotron.yubiswitch.helper";

/// Value of [`IpcRequest::request`] that re-enables the device
pub const ENABLE_REQUEST: u64 = 1;

/// Literal carried by every [`IpcReply`]
pub const REPLY_OK: &str = "OK";

/// Request sent by a caller to toggle the token
///
/// All fields are required. `request == 1` means Enable; any other value
/// means Disable with the given vendor/product filter (0 = wildcard).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcRequest {
    /// USB product identifier
    pub id_product: u64,
    /// USB vendor identifier
    pub id_vendor: u64,
    /// 1 = Enable, anything else = Disable
    pub request: u64,
}

impl IpcRequest {
    /// Build an Enable request
    pub fn enable() -> Self {
        Self {
            id_product: 0,
            id_vendor: 0,
            request: ENABLE_REQUEST,
        }
    }

    /// Build a Disable request for the given vendor/product filter
    pub fn disable(id_vendor: u64, id_product: u64) -> Self {
        Self {
            id_product,
            id_vendor,
            request: 0,
        }
    }

    /// Interpret the raw request field
    pub fn action(&self) -> Action {
        if self.request == ENABLE_REQUEST {
            Action::Enable
        } else {
            Action::Disable {
                vendor_id: self.id_vendor,
                product_id: self.id_product,
            }
        }
    }
}

/// Decoded intent of an [`IpcRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Release the device and stop watching
    Enable,
    /// Watch for the device and seize it exclusively
    Disable {
        /// Raw vendor filter from the wire (0 = wildcard)
        vendor_id: u64,
        /// Raw product filter from the wire (0 = wildcard)
        product_id: u64,
    },
}

/// Reply sent for every decoded request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcReply {
    pub reply: String,
}

impl IpcReply {
    /// The only reply the helper ever sends
    pub fn ok() -> Self {
        Self {
            reply: REPLY_OK.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.reply == REPLY_OK
    }
}
