//! Outer frame: header, length-prefixed payload, checksum, footer.

use crate::codec::crc::crc16_xmodem;
use crate::codec::messages::Payload;
use crate::codec::ParseError;
use crate::constants::{FRAME_FOOTER, FRAME_HEADER};

/// A complete datagram as it travels the wire, decoded down to its
/// [`Payload`]. `message_id` is the frame-level correlation id; it is
/// distinct from `payload.seq`, which the protocol also uses for request
/// matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_id: u32,
    pub payload: Payload,
}

impl Frame {
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 2 + 2 + 4 + 2 + 2 {
            return Err(ParseError::TooShort {
                expected: 12,
                actual: bytes.len(),
            });
        }

        let header = [bytes[0], bytes[1]];
        if header != FRAME_HEADER {
            return Err(ParseError::BadHeader(header));
        }

        let payload_size = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
        let message_id = u32::from_le_bytes(bytes[4..8].try_into().unwrap());

        let payload_start = 8;
        let payload_end = payload_start + payload_size;
        let tail_start = payload_end + 2;
        let footer_start = tail_start + 2;

        if bytes.len() < footer_start {
            return Err(ParseError::TooShort {
                expected: footer_start,
                actual: bytes.len(),
            });
        }

        let payload_bytes = &bytes[payload_start..payload_end];
        let checksum = u16::from_le_bytes([bytes[payload_end], bytes[payload_end + 1]]);
        let footer = [bytes[tail_start], bytes[tail_start + 1]];

        let computed = crc16_xmodem(payload_bytes);
        if checksum != computed {
            return Err(ParseError::ChecksumMismatch {
                expected: checksum,
                computed,
            });
        }
        if footer != FRAME_FOOTER {
            return Err(ParseError::BadFooter(footer));
        }
        if bytes.len() > footer_start {
            return Err(ParseError::TrailingBytes {
                len: bytes.len() - footer_start,
            });
        }

        let payload = Payload::parse(payload_bytes)?;
        Ok(Frame { message_id, payload })
    }

    pub fn build(&self) -> Vec<u8> {
        let payload_bytes = self.payload.build();
        let mut out = Vec::with_capacity(12 + payload_bytes.len());
        out.extend_from_slice(&FRAME_HEADER);
        out.extend_from_slice(&(payload_bytes.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.message_id.to_le_bytes());
        out.extend_from_slice(&payload_bytes);
        out.extend_from_slice(&crc16_xmodem(&payload_bytes).to_le_bytes());
        out.extend_from_slice(&FRAME_FOOTER);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::messages::{MessageFlags, MessageType, Params};

    fn sample_frame() -> Frame {
        Frame {
            message_id: 0xFFFF_FFFF,
            payload: Payload {
                message_type: MessageType::Ping,
                message_flags: MessageFlags::server(false),
                seq: 0xFF,
                unknown: [0, 0, 0],
                device_id: 0x1234_5678,
                params: Params::PingResponse { now: 1_700_000_000 },
            },
        }
    }

    #[test]
    fn round_trips() {
        let frame = sample_frame();
        let bytes = frame.build();
        assert_eq!(Frame::parse(&bytes).unwrap(), frame);
    }

    #[test]
    fn rejects_bad_header() {
        let mut bytes = sample_frame().build();
        bytes[0] = 0x00;
        assert!(matches!(Frame::parse(&bytes), Err(ParseError::BadHeader(_))));
    }

    #[test]
    fn rejects_checksum_mismatch() {
        let mut bytes = sample_frame().build();
        let last = bytes.len() - 3;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            Frame::parse(&bytes),
            Err(ParseError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = sample_frame().build();
        bytes.push(0);
        assert!(matches!(
            Frame::parse(&bytes),
            Err(ParseError::TrailingBytes { .. })
        ));
    }
}
