//! Binary wire codec for the Timeguard UDP protocol.
//!
//! A frame is `header(2) | payload_size(2, LE) | message_id(4, LE) |
//! payload(payload_size) | checksum(2, LE) | footer(2)`, with the checksum
//! computed over the payload bytes only. The payload itself carries a small
//! fixed header followed by a type-dependent `params` body; see
//! [`messages::Payload`].

pub mod bitfields;
pub mod crc;
pub mod frame;
pub mod messages;

pub use frame::Frame;
pub use messages::{MessageFlags, MessageType, Params, Payload};

use thiserror::Error;

/// Failures while decoding bytes off the wire. Nothing in this enum is
/// raised for data the protocol itself marks as vendor-specific/unknown —
/// those are preserved as opaque bytes instead (see [`Params::Unknown`]).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("bad frame header: {0:02x?}")]
    BadHeader([u8; 2]),

    #[error("bad frame footer: {0:02x?}")]
    BadFooter([u8; 2]),

    #[error("checksum mismatch: frame says {expected:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { expected: u16, computed: u16 },

    #[error("reserved high nibble set: {0:#04x}")]
    ReservedNibbleSet(u8),

    #[error("{len} trailing bytes after the framed message")]
    TrailingBytes { len: usize },

    #[error("value {value} out of range for {field}")]
    UnknownEnumValue { field: &'static str, value: u32 },

    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },
}
