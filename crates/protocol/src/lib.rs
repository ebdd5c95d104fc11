//! Wire protocol for the yubiswitch helper
//!
//! This crate defines the single request/reply exchange spoken on the
//! helper's Unix socket, serialization using postcard, and length-prefixed
//! framing.
//!
//! # Example
//!
//! ```
//! use protocol::{Action, IpcRequest, decode_framed, encode_framed};
//!
//! let framed = encode_framed(&IpcRequest::disable(1050, 407)).unwrap();
//! let decoded: IpcRequest = decode_framed(&framed).unwrap();
//!
//! assert_eq!(
//!     decoded.action(),
//!     Action::Disable { vendor_id: 1050, product_id: 407 }
//! );
//! ```

#[cfg(feature = "async")]
pub mod client;
pub mod codec;
pub mod error;
pub mod messages;

pub use codec::{
    MAX_FRAME_SIZE, decode_framed, decode_message, encode_framed, encode_message, read_framed,
    write_framed,
};

#[cfg(feature = "async")]
pub use client::{IpcClient, send_request};
#[cfg(feature = "async")]
pub use codec::{read_framed_async, write_framed_async};
pub use error::{ProtocolError, Result};
pub use messages::{Action, ENABLE_REQUEST, IpcReply, IpcRequest, REPLY_OK, SERVICE_NAME};
