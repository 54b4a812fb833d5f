//! Mode-specific policy: what the Relay Engine does with a parsed frame once
//! its direction and destination are known.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::messages::{MessageFlags, MessageType, Params, Payload};
use crate::config::Mode;

/// Which side a parsed frame arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FromDevice,
    FromCloud,
}

/// What the engine should do with an inbound frame, as decided by the
/// active [`Mode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward the original bytes unchanged to the computed destination.
    Forward,
    /// Drop silently; no output for this frame.
    Drop,
    /// Send a locally-synthesized payload back to the originating device.
    /// Never produced for `relay` or `fallback` — only `local` answers on
    /// the cloud's behalf.
    Synthesize(Payload),
}

/// Decides the fate of `payload`, received from `direction`.
pub fn decide(mode: Mode, direction: Direction, payload: &Payload) -> Decision {
    match mode {
        Mode::Relay => Decision::Forward,
        Mode::Fallback => decide_fallback(direction, payload),
        Mode::Local => decide_local(direction, payload),
    }
}

fn decide_fallback(direction: Direction, payload: &Payload) -> Decision {
    match direction {
        Direction::FromDevice => Decision::Forward,
        Direction::FromCloud => {
            if payload.message_type == MessageType::Ping {
                return Decision::Drop;
            }
            let is_successful_code_version_update = payload.message_type == MessageType::CodeVersion
                && payload
                    .message_flags
                    .contains(MessageFlags::IS_UPDATE_REQUEST | MessageFlags::IS_SUCCESS);
            if is_successful_code_version_update {
                Decision::Drop
            } else {
                Decision::Forward
            }
        }
    }
}

fn decide_local(direction: Direction, payload: &Payload) -> Decision {
    match direction {
        // Local mode never contacts the cloud; nothing from it should ever
        // reach this engine, but if it somehow does, drop it.
        Direction::FromCloud => Decision::Drop,
        Direction::FromDevice => {
            if payload.message_type == MessageType::CodeVersion
                && payload.message_flags.contains(MessageFlags::IS_UPDATE_REQUEST)
            {
                return Decision::Synthesize(synthesize_code_version_response(payload));
            }
            if payload.message_type == MessageType::Ping {
                return Decision::Synthesize(synthesize_ping_response(payload));
            }
            Decision::Drop
        }
    }
}

/// Mirrors wire id 178 (`ReportCodeVersionResponse`):
/// `IS_FROM_SERVER | IS_UPDATE_REQUEST | IS_SUCCESS`.
fn synthesize_code_version_response(request: &Payload) -> Payload {
    let code_version = match &request.params {
        Params::ReportCodeVersionRequest { code_version } => code_version.clone(),
        _ => String::new(),
    };
    Payload {
        message_type: MessageType::CodeVersion,
        message_flags: MessageFlags::IS_FROM_SERVER
            | MessageFlags::IS_UPDATE_REQUEST
            | MessageFlags::IS_SUCCESS,
        seq: 0xFF,
        unknown: [0, 0, 0],
        device_id: request.device_id,
        params: Params::ReportCodeVersionResponse { code_version },
    }
}

/// Mirrors wire id 240 (`PingResponse`):
/// `IS_FROM_SERVER | IS_UPDATE_REQUEST | UNKNOWN1 | IS_SUCCESS` — all four
/// defined flag bits set, matching the canonical message-type table even
/// though §8's scenario prose lists only three.
fn synthesize_ping_response(request: &Payload) -> Payload {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);
    Payload {
        message_type: MessageType::Ping,
        message_flags: MessageFlags::IS_FROM_SERVER
            | MessageFlags::IS_UPDATE_REQUEST
            | MessageFlags::UNKNOWN1
            | MessageFlags::IS_SUCCESS,
        seq: 0xFF,
        unknown: [0, 0, 0],
        device_id: request.device_id,
        params: Params::PingResponse { now },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::bitfields::DeviceState;
    use crate::codec::messages::PingRequestBody;

    fn ping_payload(flags: MessageFlags) -> Payload {
        Payload {
            message_type: MessageType::Ping,
            message_flags: flags,
            seq: 0xFF,
            unknown: [0, 0, 0],
            device_id: 0x1234_5678,
            params: Params::PingRequest(PingRequestBody {
                state: DeviceState::from_byte(0).unwrap(),
                unknown2: [0, 0, 0],
                work_mode: crate::codec::bitfields::WorkMode::Auto,
                unknown3: [0, 0, 0],
                uptime: 3600,
                boost: crate::codec::bitfields::Boost::from_bytes([0, 0]),
                unknown4: 0,
            }),
        }
    }

    #[test]
    fn relay_mode_always_forwards() {
        let payload = ping_payload(MessageFlags::empty());
        assert_eq!(
            decide(Mode::Relay, Direction::FromCloud, &payload),
            Decision::Forward
        );
    }

    #[test]
    fn fallback_drops_cloud_ping() {
        let payload = ping_payload(MessageFlags::server(false));
        assert_eq!(
            decide(Mode::Fallback, Direction::FromCloud, &payload),
            Decision::Drop
        );
    }

    #[test]
    fn fallback_forwards_device_traffic() {
        let payload = ping_payload(MessageFlags::empty());
        assert_eq!(
            decide(Mode::Fallback, Direction::FromDevice, &payload),
            Decision::Forward
        );
    }

    #[test]
    fn local_synthesizes_ping_response() {
        let payload = ping_payload(MessageFlags::empty());
        match decide(Mode::Local, Direction::FromDevice, &payload) {
            Decision::Synthesize(response) => {
                assert_eq!(response.message_type, MessageType::Ping);
                assert_eq!(response.seq, 0xFF);
            }
            other => panic!("expected synthesis, got {other:?}"),
        }
    }

    #[test]
    fn local_drops_cloud_traffic() {
        let payload = ping_payload(MessageFlags::empty());
        assert_eq!(
            decide(Mode::Local, Direction::FromCloud, &payload),
            Decision::Drop
        );
    }
}
