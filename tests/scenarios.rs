//! Black-box scenario tests mirroring spec.md's testable properties (S1-S6
//! and invariants 6-8), exercised against the codec/relay public API.

use std::time::{Duration, Instant};

use timeguard_gateway::codec::bitfields::{AdvanceState, Boost, BoostKind, DeviceState as WireDeviceState, SwitchState};
use timeguard_gateway::codec::bitfields::WorkMode;
use timeguard_gateway::codec::messages::{MessageFlags, MessageType, Params, PingRequestBody};
use timeguard_gateway::codec::{Frame, ParseError, Payload};
use timeguard_gateway::config::{Mode, PendingReplyConfig};
use timeguard_gateway::relay::mode::{decide, Decision, Direction};
use timeguard_gateway::relay::{DeviceRegistry, PendingReplyTable};

fn s1_ping_request_frame() -> Frame {
    let boost = Boost {
        boost_type: BoostKind::Off,
        minutes_from_sunday: 0,
        duration_in_minutes: 0,
        expected_finish_time: 0,
    };
    let state = WireDeviceState {
        switch_state: SwitchState::On,
        unknown1: 0,
        load_detected: false,
        advance_mode_state: AdvanceState::Off,
        load_was_detected_previously: false,
        unknown2: 0,
    };
    let ping = PingRequestBody {
        state,
        unknown2: [0, 0, 0],
        work_mode: WorkMode::Auto,
        unknown3: [0, 0, 0],
        uptime: 3600,
        boost,
        unknown4: 0,
    };
    Frame {
        message_id: 1,
        payload: Payload {
            message_type: MessageType::Ping,
            // type_id 96: type nibble 0 (Ping) | flags nibble 6 (UNKNOWN1|IS_UPDATE_REQUEST),
            // the wire id the message-type table assigns to client PingRequest.
            message_flags: MessageFlags::UNKNOWN1 | MessageFlags::IS_UPDATE_REQUEST,
            seq: 0xFF,
            unknown: [0, 0, 0],
            device_id: 0x1234_5678,
            params: Params::PingRequest(ping),
        },
    }
}

/// S1: a canonical PING request round-trips and forwards unchanged in
/// `relay` mode.
#[test]
fn s1_ping_round_trip_and_relay_forwards() {
    let frame = s1_ping_request_frame();
    let bytes = frame.build();
    let parsed = Frame::parse(&bytes).unwrap();
    assert_eq!(parsed, frame);

    let decision = decide(Mode::Relay, Direction::FromDevice, &parsed.payload);
    assert_eq!(decision, Decision::Forward);
}

/// S2: corrupting a payload byte must fail CRC validation.
#[test]
fn s2_corrupted_payload_fails_crc() {
    let mut bytes = s1_ping_request_frame().build();
    // Payload starts right after the 8-byte header (header+len+message_id).
    bytes[8] ^= 0xFF;
    assert!(matches!(
        Frame::parse(&bytes),
        Err(ParseError::ChecksumMismatch { .. })
    ));
}

/// S3: in `local` mode, a device PING synthesizes a PING response with the
/// canonical all-four-flags value and never touches the cloud.
#[test]
fn s3_local_mode_synthesizes_ping_response() {
    let frame = s1_ping_request_frame();
    let decision = decide(Mode::Local, Direction::FromDevice, &frame.payload);
    match decision {
        Decision::Synthesize(payload) => {
            assert_eq!(payload.message_type, MessageType::Ping);
            assert_eq!(
                payload.message_flags,
                MessageFlags::IS_FROM_SERVER
                    | MessageFlags::IS_UPDATE_REQUEST
                    | MessageFlags::UNKNOWN1
                    | MessageFlags::IS_SUCCESS
            );
            assert_eq!(payload.seq, 0xFF);
            assert!(matches!(payload.params, Params::PingResponse { .. }));
        }
        other => panic!("expected Synthesize, got {other:?}"),
    }

    // Invariant 6: local mode never forwards to the cloud in either direction.
    let cloud_decision = decide(Mode::Local, Direction::FromCloud, &frame.payload);
    assert_eq!(cloud_decision, Decision::Drop);
}

/// S4: a server-side command is resent once at t=2s, then acknowledged by a
/// client reply with the matching seq, after which no further resends occur
/// and the table is empty.
#[test]
fn s4_resend_then_ack_clears_entry() {
    let mut table = PendingReplyTable::new(PendingReplyConfig::default());
    let t0 = Instant::now();

    let advance_frame = Frame {
        message_id: 42,
        payload: Payload {
            message_type: MessageType::Advance,
            message_flags: MessageFlags::server(true),
            seq: 7,
            unknown: [0, 0, 0],
            device_id: 0x1234_5678,
            params: Params::AdvanceModeRequest {
                mode: AdvanceState::On,
            },
        },
    };
    let seq = table.enqueue(advance_frame, t0).unwrap();
    assert_eq!(seq, 7);

    let due_at_2s = table.tick(t0 + Duration::from_secs(2));
    assert_eq!(due_at_2s.len(), 1);

    table.on_client_reply(7);
    assert!(table.is_empty());

    let due_later = table.tick(t0 + Duration::from_secs(4));
    assert!(due_later.is_empty());
}

/// Invariant 4: Device Registry is first-write-wins.
#[test]
fn device_registry_first_write_wins() {
    let mut registry = DeviceRegistry::new();
    let first = std::net::SocketAddr::from(([10, 0, 0, 1], 9997));
    let second = std::net::SocketAddr::from(([10, 0, 0, 2], 9997));
    registry.learn(0x1234_5678, first);
    registry.learn(0x1234_5678, second);
    assert_eq!(registry.lookup(0x1234_5678), Some(first));
}

/// Invariant 7: `fallback` mode drops cloud-originated PING and successful
/// CODE_VERSION updates, but forwards everything else.
#[test]
fn fallback_mode_drops_selected_cloud_traffic() {
    let ping = Payload {
        message_type: MessageType::Ping,
        message_flags: MessageFlags::server(false),
        seq: 0xFF,
        unknown: [0, 0, 0],
        device_id: 1,
        params: Params::PingResponse { now: 0 },
    };
    assert_eq!(
        decide(Mode::Fallback, Direction::FromCloud, &ping),
        Decision::Drop
    );

    let code_version_update = Payload {
        message_type: MessageType::CodeVersion,
        message_flags: MessageFlags::IS_FROM_SERVER | MessageFlags::IS_UPDATE_REQUEST | MessageFlags::IS_SUCCESS,
        seq: 0xFF,
        unknown: [0, 0, 0],
        device_id: 1,
        params: Params::ReportCodeVersionResponse {
            code_version: "1.0".to_string(),
        },
    };
    assert_eq!(
        decide(Mode::Fallback, Direction::FromCloud, &code_version_update),
        Decision::Drop
    );

    let boost_response = Payload {
        message_type: MessageType::Boost,
        message_flags: MessageFlags::server(false),
        seq: 0xFF,
        unknown: [0, 0, 0],
        device_id: 1,
        params: Params::BoostResponse {
            expected_finish_time: Boost {
                boost_type: BoostKind::Off,
                minutes_from_sunday: 0,
                duration_in_minutes: 0,
                expected_finish_time: 0,
            },
            boost_start_config: Boost {
                boost_type: BoostKind::Off,
                minutes_from_sunday: 0,
                duration_in_minutes: 0,
                expected_finish_time: 0,
            },
        },
    };
    assert_eq!(
        decide(Mode::Fallback, Direction::FromCloud, &boost_response),
        Decision::Forward
    );
}
